//! Segment configuration descriptors.

/// The four segment types a channel can cycle through.
///
/// | Type | Primary | Secondary |
/// |------|---------|-----------|
/// | Ramp | time | curve (or level when followed by another ramp) |
/// | Step | level | portamento |
/// | Hold | level | time |
/// | Turing | probability | sequence length |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentType {
    #[default]
    Ramp = 0,
    Step = 1,
    Hold = 2,
    Turing = 3,
}

impl SegmentType {
    /// Decode the two type bits of a configuration word.
    #[inline]
    pub fn from_bits(bits: u16) -> Self {
        match bits & 0x3 {
            0 => SegmentType::Ramp,
            1 => SegmentType::Step,
            2 => SegmentType::Hold,
            _ => SegmentType::Turing,
        }
    }
}

/// LFO frequency range for looping ramp segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreqRange {
    #[default]
    Default = 0,
    Slow = 1,
    Fast = 2,
}

impl FreqRange {
    /// Decode the two range bits of a configuration word.
    #[inline]
    pub fn from_bits(bits: u16) -> Self {
        match bits & 0x3 {
            1 => FreqRange::Slow,
            2 => FreqRange::Fast,
            _ => FreqRange::Default,
        }
    }
}

/// High-level description of one segment, as assembled by the chain state
/// from the per-channel configuration words.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Configuration {
    pub segment_type: SegmentType,
    pub looped: bool,
    pub bipolar: bool,
    pub range: FreqRange,
}

impl Configuration {
    /// A step for sequencing purposes: STEP, or a non-looping Turing segment
    /// (looping Turing segments act as holds).
    #[inline]
    pub fn is_step(&self) -> bool {
        self.segment_type == SegmentType::Step
            || (self.segment_type == SegmentType::Turing && !self.looped)
    }
}

/// Per-segment control values, refreshed every block from pots, sliders and
/// CV (locally or through the chain mirror).
///
/// `slider` and `cv` are only populated for segments bound to this module's
/// own channels; remote bindings carry the combined value in `primary`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Parameters {
    pub primary: f32,
    pub secondary: f32,
    pub slider: f32,
    pub cv: f32,
}

/// Module-wide options that alter how a generator interprets its
/// configuration. Refreshed on every reconfiguration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// Advanced mode: the extended dispatch table (rise-and-fall,
    /// attenuverter, Turing, chaotic modes) replaces the basic one.
    pub advanced: bool,
    /// Slow-LFO mode: free-running LFO frequencies are divided by 8.
    pub slow_lfo: bool,
}
