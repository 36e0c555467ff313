//! Tap-tempo ramp extraction.
//!
//! Locks a 0..1 phase ramp to the tempo of incoming gate pulses, scaled by a
//! rational clock [`Ratio`]. The extractor measures the interval between
//! rising edges, smooths it, and on every pulse re-aligns the ramp to the
//! nearest expected grid position (multiples of `1/q` of a full cycle) so a
//! divided or multiplied ramp stays phase-locked to the clock instead of
//! drifting.
//!
//! Absence of pulses never stalls the ramp: it keeps free-running at the last
//! locked frequency.

use crate::gate::GateFlags;

/// A rational clock ratio: the ramp completes `ratio` cycles per input pulse,
/// and pulses land on multiples of `1/q` of the ramp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ratio {
    pub ratio: f32,
    pub q: i32,
}

impl Ratio {
    pub const fn new(ratio: f32, q: i32) -> Self {
        Self { ratio, q }
    }
}

/// Phase-locked ramp extractor for tap LFOs.
#[derive(Debug, Clone)]
pub struct RampExtractor {
    max_frequency: f32,
    /// Samples since the previous rising edge.
    interval: u32,
    /// Smoothed pulse period, in samples.
    period: f32,
    frequency: f32,
    phase: f32,
    /// Set once a first edge has been seen, so the next edge yields a period.
    armed: bool,
    locked: bool,
}

/// Intervals longer than this (in samples) are treated as "the clock
/// stopped" rather than as a very slow tempo. About 8 s at 31.25 kHz.
const MAX_INTERVAL: u32 = 1 << 18;

impl RampExtractor {
    pub fn new(max_frequency: f32) -> Self {
        Self {
            max_frequency,
            interval: 0,
            period: 0.0,
            frequency: 0.0,
            phase: 0.0,
            armed: false,
            locked: false,
        }
    }

    /// Forget the locked tempo and restart the ramp from zero.
    pub fn reset(&mut self) {
        self.interval = 0;
        self.period = 0.0;
        self.frequency = 0.0;
        self.phase = 0.0;
        self.armed = false;
        self.locked = false;
    }

    /// Process one block of gate flags, writing one phase value per sample.
    pub fn process(&mut self, ratio: Ratio, gate_flags: &[GateFlags], ramp: &mut [f32]) {
        debug_assert_eq!(gate_flags.len(), ramp.len());
        for (gate, out) in gate_flags.iter().zip(ramp.iter_mut()) {
            self.interval = self.interval.saturating_add(1);

            if gate.is_rising() {
                if !self.armed || self.interval >= MAX_INTERVAL {
                    // First edge, or the clock was stopped: no usable period
                    // yet, just start measuring.
                    self.armed = true;
                } else {
                    if self.locked {
                        // Exponential tempo tracking: fast enough to follow a
                        // nudged clock, slow enough to ride through jitter.
                        self.period += 0.5 * (self.interval as f32 - self.period);
                    } else {
                        self.period = self.interval as f32;
                        self.locked = true;
                    }
                    self.frequency = (ratio.ratio / self.period).min(self.max_frequency);

                    // Re-align to the nearest expected grid position so
                    // divisions stay in phase with the clock.
                    let grid = 1.0 / ratio.q.max(1) as f32;
                    let steps = libm::roundf(self.phase / grid);
                    self.phase = steps * grid;
                    if self.phase >= 1.0 {
                        self.phase -= libm::floorf(self.phase);
                    }
                }
                self.interval = 0;
            }

            self.phase += self.frequency;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
            *out = self.phase;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::extract_gate_flags;

    fn pulse_train(period: usize, len: usize) -> Vec<GateFlags> {
        let mut previous = GateFlags::LOW;
        (0..len)
            .map(|i| {
                previous = extract_gate_flags(previous, i % period < period / 2);
                previous
            })
            .collect()
    }

    #[test]
    fn locks_to_pulse_period() {
        let period = 125;
        let gates = pulse_train(period, 1000);
        let mut extractor = RampExtractor::new(0.25);
        let mut ramp = vec![0.0f32; 1000];
        extractor.process(Ratio::new(1.0, 1), &gates, &mut ramp);

        // Late in the train the per-sample increment matches the tempo.
        let f = ramp[801] - ramp[800];
        assert!(
            (f - 1.0 / period as f32).abs() < 0.2 / period as f32,
            "frequency {f} vs expected {}",
            1.0 / period as f32
        );
    }

    #[test]
    fn first_edge_does_not_lock() {
        let mut extractor = RampExtractor::new(0.25);
        let gates = pulse_train(1000, 32);
        let mut ramp = [0.0f32; 32];
        extractor.process(Ratio::new(1.0, 1), &gates, &mut ramp);
        // One edge only: no period yet, ramp still parked.
        assert_eq!(ramp[31], 0.0);
    }

    #[test]
    fn silence_keeps_running() {
        let mut extractor = RampExtractor::new(0.25);
        let gates = pulse_train(32, 80);
        let mut ramp = [0.0f32; 80];
        extractor.process(Ratio::new(1.0, 1), &gates, &mut ramp);

        // No more pulses: the ramp must keep advancing at the locked rate.
        let silent = [GateFlags::LOW; 64];
        let mut ramp2 = [0.0f32; 64];
        extractor.process(Ratio::new(1.0, 1), &silent, &mut ramp2);
        let inc = ramp2[10] - ramp2[9];
        assert!(inc > 0.0, "ramp stalled without a clock");
    }

    #[test]
    fn division_phase_snaps_to_grid() {
        let mut extractor = RampExtractor::new(0.25);
        let gates = pulse_train(100, 1000);
        let mut ramp = vec![0.0f32; 1000];
        // Quarter-speed ramp: pulses land on multiples of 1/4.
        extractor.process(Ratio::new(0.25, 4), &gates, &mut ramp);
        // Find a late rising edge and check the phase right after it sits
        // near a multiple of 0.25.
        for i in 800..900 {
            if gates[i].is_rising() {
                let snapped = ramp[i] / 0.25;
                let distance = (snapped - libm::roundf(snapped)).abs();
                assert!(distance < 0.05, "phase {} off grid", ramp[i]);
                break;
            }
        }
    }
}
