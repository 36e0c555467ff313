//! Hysteresis quantizer for pot-driven discrete selections.
//!
//! Maps a continuous control value in [0, 1] onto one of `n` steps, with a
//! dead band around the current step so that noise on an analog pot sitting
//! near a boundary cannot make the selection chatter.

/// Quantizes [0, 1] to integer steps with hysteresis.
///
/// The same instance must be reused across calls; the stored step is what the
/// hysteresis is measured against.
#[derive(Debug, Clone, Copy, Default)]
pub struct HysteresisQuantizer {
    step: i32,
}

/// Fraction of a step the value must travel past a boundary before the
/// selection changes.
const HYSTERESIS: f32 = 0.25;

impl HysteresisQuantizer {
    pub fn new() -> Self {
        Self { step: 0 }
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// Quantize `value` in [0, 1] to one of `num_steps` steps.
    #[inline]
    pub fn process(&mut self, value: f32, num_steps: usize) -> usize {
        self.process_with_base(0, value, num_steps)
    }

    /// Quantize with an integer offset added before rounding.
    pub fn process_with_base(&mut self, base: i32, value: f32, num_steps: usize) -> usize {
        let scaled = value * (num_steps - 1) as f32 + base as f32;
        let hysteresis = if scaled > self.step as f32 {
            -HYSTERESIS
        } else {
            HYSTERESIS
        };
        let mut q = libm::floorf(scaled + hysteresis + 0.5) as i32;
        q = q.clamp(0, num_steps as i32 - 1);
        self.step = q;
        q as usize
    }

    /// Quantize and index into a lookup table.
    #[inline]
    pub fn lookup<'a, T>(&mut self, table: &'a [T], value: f32) -> &'a T {
        &table[self.process(value, table.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_select_first_and_last() {
        let mut q = HysteresisQuantizer::new();
        assert_eq!(q.process(0.0, 7), 0);
        assert_eq!(q.process(1.0, 7), 6);
    }

    #[test]
    fn jitter_near_boundary_does_not_chatter() {
        let mut q = HysteresisQuantizer::new();
        // Settle just below the 0/1 boundary of a 2-step quantizer.
        let step = q.process(0.45, 2);
        assert_eq!(step, 0);
        // Small excursions above 0.5 stay within the hysteresis band.
        assert_eq!(q.process(0.55, 2), 0);
        assert_eq!(q.process(0.45, 2), 0);
        // A decisive move switches.
        assert_eq!(q.process(0.9, 2), 1);
        // And small excursions back down do not switch back.
        assert_eq!(q.process(0.45, 2), 1);
    }
}
