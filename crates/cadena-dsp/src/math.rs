//! Pitch and interpolation math.
//!
//! All transcendental functions go through `libm` so the crate stays
//! `no_std`-clean.

use libm::expf;

/// Convert a pitch offset in semitones to a frequency ratio.
///
/// `semitones_to_ratio(12.0) == 2.0`, `semitones_to_ratio(-12.0) == 0.5`.
#[inline]
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    // 2^(st/12) = e^(st * ln(2)/12)
    const FACTOR: f32 = core::f32::consts::LN_2 / 12.0;
    expf(semitones * FACTOR)
}

/// Linear crossfade between `a` and `b`.
#[inline]
pub fn crossfade(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Sine of a normalized phase (1.0 = one full cycle).
///
/// The phase may be any finite value; it is wrapped into [0, 1) first.
#[inline]
pub fn sine(phase: f32) -> f32 {
    let mut p = phase - libm::floorf(phase);
    if p < 0.0 {
        p += 1.0;
    }
    libm::sinf(p * core::f32::consts::TAU)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octave_ratios() {
        assert!((semitones_to_ratio(12.0) - 2.0).abs() < 1e-4);
        assert!((semitones_to_ratio(-12.0) - 0.5).abs() < 1e-4);
        assert!((semitones_to_ratio(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn crossfade_endpoints() {
        assert_eq!(crossfade(0.25, 0.75, 0.0), 0.25);
        assert_eq!(crossfade(0.25, 0.75, 1.0), 0.75);
        assert_eq!(crossfade(-1.0, 1.0, 0.5), 0.0);
    }

    #[test]
    fn sine_wraps_negative_phase() {
        assert!((sine(0.25) - 1.0).abs() < 1e-5);
        assert!((sine(-0.75) - 1.0).abs() < 1e-5);
        assert!((sine(1.25) - 1.0).abs() < 1e-5);
    }
}
