//! Rate and portamento conversion curves.
//!
//! Two control curves are shared by every segment type:
//!
//! - [`rate_to_frequency`] maps a time control in [0, 2) (slider plus CV) to
//!   a per-sample phase increment. The slider span [0, 1] covers roughly 1 ms
//!   to 16 s; CV extends the reachable range to about 19 minutes at 2.0. The
//!   curve interpolates exponentially in the log-time domain with a gamma
//!   warp so the top of the range flattens out instead of exploding.
//! - [`portamento_to_coefficient`] maps a slew control in [0, 1] to a
//!   one-pole coefficient, from transparent (1.0) down to minute-scale glides.

use crate::SAMPLE_RATE;
use libm::powf;

/// Hard ceiling on any per-sample phase increment.
pub const MAX_FREQUENCY: f32 = 0.25;

/// Segment duration at a time control of 0.
pub const MIN_SEGMENT_TIME: f32 = 0.001;

/// Segment duration at the top of the CV-extended control range (2.0),
/// roughly a quarter of an hour.
///
/// Tunable: hardware revisions ship with slightly different top-of-range
/// durations; this constant pins the one used here.
pub const MAX_SEGMENT_TIME: f32 = 884.0;

/// Gamma warp applied to the control before log-domain interpolation. 0.5
/// makes a control of 1.0 (full slider, no CV) land on a 16 s segment.
const TIME_GAMMA: f32 = 0.5;

/// Slowest portamento cutoff, in Hz.
const MIN_PORTAMENTO_FREQUENCY: f32 = 0.06;

/// Convert a time control in [0, 2) to a per-sample phase increment.
#[inline]
pub fn rate_to_frequency(rate: f32) -> f32 {
    let rate = rate.clamp(0.0, 2.0);
    let g = powf(rate * 0.5, TIME_GAMMA);
    // log-domain interpolation: T = Tmin^(1-g) * Tmax^g
    let time = MIN_SEGMENT_TIME * powf(MAX_SEGMENT_TIME / MIN_SEGMENT_TIME, g);
    (1.0 / (time * SAMPLE_RATE)).min(MAX_FREQUENCY)
}

/// Convert a portamento control in [0, 1] to a one-pole coefficient.
///
/// A control of 0 returns exactly 1.0 so un-slewed steps snap with no
/// smearing at all.
#[inline]
pub fn portamento_to_coefficient(rate: f32) -> f32 {
    let rate = rate.clamp(0.0, 1.0);
    if rate < 1.0 / 512.0 {
        return 1.0;
    }
    let cutoff = SAMPLE_RATE * powf(MIN_PORTAMENTO_FREQUENCY / SAMPLE_RATE, rate);
    1.0 - libm::expf(-core::f32::consts::TAU * cutoff / SAMPLE_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_monotonically_decreases_with_rate() {
        let mut previous = f32::INFINITY;
        for i in 0..=40 {
            let f = rate_to_frequency(i as f32 / 20.0);
            assert!(f <= previous, "not monotone at rate {}", i as f32 / 20.0);
            assert!(f > 0.0);
            previous = f;
        }
    }

    #[test]
    fn slider_top_is_sixteen_seconds() {
        let f = rate_to_frequency(1.0);
        let seconds = 1.0 / (f * SAMPLE_RATE);
        assert!((seconds - 16.0).abs() / 16.0 < 0.1, "got {seconds} s");
    }

    #[test]
    fn fastest_segment_is_about_a_millisecond() {
        let f = rate_to_frequency(0.0);
        let seconds = 1.0 / (f * SAMPLE_RATE);
        assert!((seconds - 0.001).abs() < 0.0005, "got {seconds} s");
    }

    #[test]
    fn portamento_extremes() {
        assert_eq!(portamento_to_coefficient(0.0), 1.0);
        let slow = portamento_to_coefficient(1.0);
        assert!(slow > 0.0 && slow < 0.0001);
    }

    #[test]
    fn portamento_monotone() {
        let mut previous = 2.0;
        for i in 0..=32 {
            let c = portamento_to_coefficient(i as f32 / 32.0);
            assert!(c <= previous);
            previous = c;
        }
    }
}
