//! LFO waveshaper.
//!
//! Maps a single shape control in [0, 1] onto a continuous morph through
//! ramp-ish triangle, sine, and plateaued pulse shapes, applied to a phase
//! already present in the output buffer.

use crate::generator::Output;
use cadena_dsp::math::{crossfade, sine};

/// Shape the `phase` field of each output into its `value` field.
///
/// `shape` in [0, 1]: 0 is a falling-saw-leaning triangle, 0.5 is a sine,
/// 1.0 is a wide plateau (near-square). When `bipolar` the output spans
/// ±10/16, otherwise 0..1.
pub fn shape_lfo(shape: f32, out: &mut [Output], bipolar: bool) {
    let shape = shape - 0.5;
    let shape = 2.0 + 9.999_999 * shape / (1.0 + 3.0 * shape.abs());

    let slope = (shape * 0.5).min(0.5);
    let plateau_width = (shape - 3.0).max(0.0);
    let sine_amount = if shape < 2.0 {
        (shape - 1.0).max(0.0)
    } else {
        (3.0 - shape).max(0.0)
    };

    let slope_up = 1.0 / slope;
    let slope_down = 1.0 / (1.0 - slope);
    let plateau = 0.5 * (1.0 - plateau_width);
    let normalization = 1.0 / plateau;
    let phase_shift = plateau_width * 0.25;

    let amplitude = if bipolar { 10.0 / 16.0 } else { 0.5 };
    let offset = if bipolar { 0.0 } else { 0.5 };

    for o in out.iter_mut() {
        let mut phase = o.phase + phase_shift;
        if phase > 1.0 {
            phase -= 1.0;
        }
        let mut triangle = if phase < slope {
            slope_up * phase
        } else {
            1.0 - (phase - slope) * slope_down
        };
        triangle -= 0.5;
        triangle = triangle.clamp(-plateau, plateau) * normalization;
        let s = sine(phase + 0.75);
        o.value = amplitude * crossfade(triangle, s, sine_amount) + offset;
        o.segment = if phase < 0.5 { 0 } else { 1 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<Output> {
        (0..n)
            .map(|i| Output {
                phase: i as f32 / n as f32,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn unipolar_output_spans_zero_to_one() {
        for shape in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let mut out = ramp(256);
            shape_lfo(shape, &mut out, false);
            let min = out.iter().map(|o| o.value).fold(f32::INFINITY, f32::min);
            let max = out.iter().map(|o| o.value).fold(f32::NEG_INFINITY, f32::max);
            assert!(min >= -0.01, "shape {shape}: min {min}");
            assert!(max <= 1.01, "shape {shape}: max {max}");
            assert!(max - min > 0.8, "shape {shape}: span {}", max - min);
        }
    }

    #[test]
    fn bipolar_output_is_centered() {
        let mut out = ramp(256);
        shape_lfo(0.5, &mut out, true);
        let mean: f32 = out.iter().map(|o| o.value).sum::<f32>() / out.len() as f32;
        assert!(mean.abs() < 0.05, "mean {mean}");
    }

    #[test]
    fn sine_shape_matches_sine() {
        let mut out = ramp(64);
        shape_lfo(0.5, &mut out, true);
        // At shape 0.5 the morph is pure sine with amplitude 10/16.
        for o in &out {
            let expected = (10.0 / 16.0) * sine(o.phase + 0.75);
            assert!((o.value - expected).abs() < 0.02, "phase {}", o.phase);
        }
    }

    #[test]
    fn segment_flag_splits_the_cycle() {
        let mut out = ramp(64);
        shape_lfo(0.5, &mut out, false);
        assert_eq!(out[1].segment, 0);
        assert_eq!(out[40].segment, 1);
    }
}
