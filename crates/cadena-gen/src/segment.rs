//! Low-level segment state.
//!
//! A [`Segment`] stores where each of its control inputs comes from rather
//! than a value: a [`ParamSource`] names a constant, a parameter slot, or
//! another segment's Turing register, and is resolved against the generator's
//! parameter array on every read. This is what lets a ramp's end level track
//! the next segment's slider in real time without copying values around.

use crate::config::FreqRange;

/// Where a segment control input reads from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamSource {
    /// A fixed value (0.0, 0.5, 1.0 in practice).
    Constant(f32),
    /// The primary parameter (slider + CV) of the given segment slot.
    Primary(usize),
    /// The secondary parameter (pot) of the given segment slot.
    Secondary(usize),
    /// The Turing register value of the given segment slot.
    Register(usize),
}

/// One segment of a multi-segment configuration.
///
/// Successor indices (`if_rising`, `if_falling`, `if_complete`) are segment
/// slots; -1 means "stay here".
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    /// Level to (re)start from on entry. `None` starts from the current
    /// output so transitions are continuous.
    pub start: Option<ParamSource>,
    /// Phase rate control. `None` gives the segment infinite duration.
    pub time: Option<ParamSource>,
    pub curve: ParamSource,
    pub portamento: ParamSource,
    pub end: ParamSource,
    /// Fixed phase override; a segment with one tracks its inputs instead of
    /// ramping (1.0 = track end, 0.0 = freeze at start).
    pub phase: Option<ParamSource>,

    pub if_rising: i8,
    pub if_falling: i8,
    pub if_complete: i8,

    pub bipolar: bool,
    pub retrig: bool,
    pub range: FreqRange,

    /// Advance the shift register when leaving this segment.
    pub advance_tm: bool,
    pub shift_register: u16,
    pub register_value: f32,
}

impl Default for Segment {
    fn default() -> Self {
        Self {
            start: Some(ParamSource::Constant(0.0)),
            time: Some(ParamSource::Constant(0.0)),
            curve: ParamSource::Constant(0.5),
            portamento: ParamSource::Constant(0.0),
            end: ParamSource::Constant(0.0),
            phase: None,
            if_rising: 0,
            if_falling: 0,
            if_complete: 0,
            bipolar: false,
            retrig: true,
            range: FreqRange::Default,
            advance_tm: false,
            shift_register: 0,
            register_value: 0.0,
        }
    }
}
