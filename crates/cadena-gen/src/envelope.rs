//! Six-stage DAHDSR envelope.
//!
//! Used by the six-envelope multimode, where each channel becomes an
//! independent Delay / Attack / Hold / Decay / Sustain / Release generator
//! with the six sliders setting the six stage controls. Interpolation within
//! a stage is linear; a stage whose control sits below the minimum length is
//! skipped outright.

/// Stage length per unit of control value, in samples.
///
/// Tunable: reference firmwares disagree between 4000·10 and 10000; this
/// constant pins the value used here.
pub const TIME_SCALE: f32 = 10_000.0;

/// Controls below this contribute no stage at all.
const MIN_STAGE_LENGTH: f32 = 0.001;

/// The envelope's stages, in traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeStage {
    #[default]
    Idle,
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
}

/// One DAHDSR envelope.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    stage: EnvelopeStage,
    stage_time: u32,
    stage_start_value: f32,

    delay_length: u32,
    attack_length: u32,
    hold_length: u32,
    decay_length: u32,
    sustain_level: f32,
    release_length: u32,

    gate: bool,
    value: f32,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    fn stage_length(control: f32) -> u32 {
        if control >= MIN_STAGE_LENGTH {
            ((control - MIN_STAGE_LENGTH) * TIME_SCALE).max(0.0) as u32
        } else {
            0
        }
    }

    pub fn set_delay_length(&mut self, control: f32) {
        self.delay_length = Self::stage_length(control);
    }

    pub fn set_attack_length(&mut self, control: f32) {
        self.attack_length = Self::stage_length(control);
    }

    pub fn set_hold_length(&mut self, control: f32) {
        self.hold_length = Self::stage_length(control);
    }

    pub fn set_decay_length(&mut self, control: f32) {
        self.decay_length = Self::stage_length(control);
    }

    pub fn set_sustain_level(&mut self, control: f32) {
        self.sustain_level = control - 0.001;
    }

    pub fn set_release_length(&mut self, control: f32) {
        self.release_length = Self::stage_length(control);
    }

    pub fn has_delay(&self) -> bool {
        self.delay_length > 0
    }

    pub fn has_attack(&self) -> bool {
        self.attack_length > 0
    }

    pub fn has_hold(&self) -> bool {
        self.hold_length > 0
    }

    pub fn has_decay(&self) -> bool {
        self.decay_length > 0
    }

    pub fn has_sustain(&self) -> bool {
        self.sustain_level > 0.001
    }

    pub fn has_release(&self) -> bool {
        self.release_length > 0
    }

    pub fn current_stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Feed the gate level; edges move the envelope between stages.
    pub fn gate(&mut self, high: bool) {
        if !self.gate && high {
            self.set_stage(if self.has_delay() {
                EnvelopeStage::Delay
            } else {
                EnvelopeStage::Attack
            });
        }
        if self.gate && !high {
            match self.stage {
                // Nothing sounded yet: back to idle.
                EnvelopeStage::Idle | EnvelopeStage::Delay => self.set_stage(EnvelopeStage::Idle),
                _ => self.set_stage(EnvelopeStage::Release),
            }
        }
        self.gate = high;
    }

    /// Advance one tick and return the envelope value.
    pub fn value(&mut self) -> f32 {
        // Cascading transitions: a zero-length stage falls straight through.
        if self.stage == EnvelopeStage::Delay && self.stage_time >= self.delay_length {
            self.set_stage(EnvelopeStage::Attack);
        }
        if self.stage == EnvelopeStage::Attack && self.stage_time >= self.attack_length {
            self.set_stage(EnvelopeStage::Hold);
        }
        if self.stage == EnvelopeStage::Hold && self.stage_time >= self.hold_length {
            self.set_stage(EnvelopeStage::Decay);
        }
        if self.stage == EnvelopeStage::Decay && self.stage_time >= self.decay_length {
            self.set_stage(EnvelopeStage::Sustain);
        }
        if self.stage == EnvelopeStage::Release && self.stage_time >= self.release_length {
            self.set_stage(EnvelopeStage::Idle);
        }

        if self.stage != EnvelopeStage::Idle {
            self.stage_time += 1;
        }

        self.value = match self.stage {
            EnvelopeStage::Attack => self.interpolate(self.stage_start_value, 1.0, self.attack_length),
            EnvelopeStage::Hold => 1.0,
            EnvelopeStage::Decay => self.interpolate(1.0, self.sustain_level, self.decay_length),
            EnvelopeStage::Sustain => self.sustain_level,
            EnvelopeStage::Release => self.interpolate(self.stage_start_value, 0.0, self.release_length),
            EnvelopeStage::Idle | EnvelopeStage::Delay => 0.0,
        };
        self.value
    }

    fn set_stage(&mut self, stage: EnvelopeStage) {
        if self.stage != stage {
            self.stage = stage;
            self.stage_time = 0;
            self.stage_start_value = self.value;
        }
    }

    fn interpolate(&self, from: f32, to: f32, length: u32) -> f32 {
        let t = self.stage_time as f32 / length.max(1) as f32;
        from + (to - from) * t.min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Envelope {
        let mut e = Envelope::new();
        e.set_delay_length(0.0);
        e.set_attack_length(0.1);
        e.set_hold_length(0.0);
        e.set_decay_length(0.1);
        e.set_sustain_level(0.5);
        e.set_release_length(0.1);
        e
    }

    #[test]
    fn idle_until_gated() {
        let mut e = configured();
        for _ in 0..100 {
            assert_eq!(e.value(), 0.0);
        }
        assert_eq!(e.current_stage(), EnvelopeStage::Idle);
    }

    #[test]
    fn full_cycle_reaches_peak_sustain_and_silence() {
        let mut e = configured();
        e.gate(true);
        let attack_ticks = (0.099 * TIME_SCALE) as usize;
        let mut peak = 0.0f32;
        for _ in 0..attack_ticks + 10 {
            peak = peak.max(e.value());
        }
        assert!(peak > 0.99, "attack never reached peak: {peak}");

        // Let decay complete; should settle at the sustain level.
        for _ in 0..(0.2 * TIME_SCALE) as usize {
            e.value();
        }
        assert_eq!(e.current_stage(), EnvelopeStage::Sustain);
        assert!((e.value() - 0.499).abs() < 0.01);

        e.gate(false);
        for _ in 0..(0.2 * TIME_SCALE) as usize {
            e.value();
        }
        assert_eq!(e.current_stage(), EnvelopeStage::Idle);
        assert_eq!(e.value(), 0.0);
    }

    #[test]
    fn gate_off_during_delay_returns_to_idle() {
        let mut e = configured();
        e.set_delay_length(0.5);
        e.gate(true);
        e.value();
        assert_eq!(e.current_stage(), EnvelopeStage::Delay);
        e.gate(false);
        assert_eq!(e.current_stage(), EnvelopeStage::Idle);
    }

    #[test]
    fn zero_length_stages_are_skipped() {
        let mut e = Envelope::new();
        e.set_attack_length(0.0);
        e.set_sustain_level(0.8);
        e.gate(true);
        // With no delay/attack/hold/decay, the first tick lands on sustain.
        let v = e.value();
        assert_eq!(e.current_stage(), EnvelopeStage::Sustain);
        assert!((v - 0.799).abs() < 0.01);
    }

    #[test]
    fn retrigger_restarts_attack_from_current_value() {
        let mut e = configured();
        e.gate(true);
        for _ in 0..(0.05 * TIME_SCALE) as usize {
            e.value();
        }
        e.gate(false);
        for _ in 0..10 {
            e.value();
        }
        let mid_release = e.value();
        assert!(mid_release > 0.0);
        e.gate(true);
        let after = e.value();
        // Attack resumes from where release left off, not from zero.
        assert!(after >= mid_release - 0.01);
    }
}
