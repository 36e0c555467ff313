//! Audio oscillator for the ouroboros multimodes.
//!
//! Each channel runs one of these instead of a segment generator: waveshape
//! from the configuration word's waveshape bits, pitch from the channel's
//! CV + slider (quantized to semitones), level from the pot.

use cadena_dsp::math::{crossfade, sine};
use cadena_dsp::{semitones_to_ratio, SAMPLE_RATE};

/// Reference pitch at a control value of 0: C3.
const BASE_FREQUENCY: f32 = 130.81;

/// The selectable waveshapes, in the order the switch cycles through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveshape {
    #[default]
    Sine = 0,
    Triangle = 1,
    Sawtooth = 2,
    Square = 3,
    /// Triangle-to-sine morph controlled by the slider.
    Morph = 4,
}

impl Waveshape {
    /// Decode the three waveshape bits of a configuration word.
    pub fn from_bits(bits: u16) -> Self {
        match bits & 0x7 {
            0 => Waveshape::Sine,
            1 => Waveshape::Triangle,
            2 => Waveshape::Sawtooth,
            3 => Waveshape::Square,
            _ => Waveshape::Morph,
        }
    }
}

/// Phase-accumulator oscillator, one per channel.
#[derive(Debug, Clone, Default)]
pub struct Oscillator {
    phase: f32,
    shape: Waveshape,
}

impl Oscillator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_shape(&mut self, shape: Waveshape) {
        self.shape = shape;
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Render one block. `pitch` is in semitones relative to the reference,
    /// `morph` shapes the [`Waveshape::Morph`] crossfade, `level` scales the
    /// output. Output is unipolar 0..level.
    pub fn render(&mut self, pitch: f32, morph: f32, level: f32, out: &mut [f32]) {
        let frequency = (BASE_FREQUENCY * semitones_to_ratio(pitch) / SAMPLE_RATE).min(0.25);
        for o in out.iter_mut() {
            self.phase += frequency;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
            let bipolar = match self.shape {
                Waveshape::Sine => sine(self.phase),
                Waveshape::Triangle => triangle(self.phase),
                Waveshape::Sawtooth => 2.0 * self.phase - 1.0,
                Waveshape::Square => {
                    if self.phase < 0.5 {
                        1.0
                    } else {
                        -1.0
                    }
                }
                Waveshape::Morph => crossfade(triangle(self.phase), sine(self.phase), morph),
            };
            *o = level * (0.5 * bipolar + 0.5);
        }
    }
}

#[inline]
fn triangle(phase: f32) -> f32 {
    if phase < 0.5 {
        4.0 * phase - 1.0
    } else {
        3.0 - 4.0 * phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_bounded_by_level() {
        let mut osc = Oscillator::new();
        for shape in [
            Waveshape::Sine,
            Waveshape::Triangle,
            Waveshape::Sawtooth,
            Waveshape::Square,
            Waveshape::Morph,
        ] {
            osc.set_shape(shape);
            osc.reset();
            let mut out = [0.0f32; 512];
            osc.render(0.0, 0.5, 0.8, &mut out);
            for &v in &out {
                assert!((0.0..=0.8001).contains(&v), "{shape:?} emitted {v}");
            }
        }
    }

    #[test]
    fn pitch_doubles_per_octave() {
        let mut osc = Oscillator::new();
        osc.set_shape(Waveshape::Square);
        let count_flips = |osc: &mut Oscillator, pitch: f32| {
            osc.reset();
            let mut out = [0.0f32; 4096];
            osc.render(pitch, 0.0, 1.0, &mut out);
            out.windows(2).filter(|w| w[0] != w[1]).count()
        };
        let base = count_flips(&mut osc, 0.0);
        let octave_up = count_flips(&mut osc, 12.0);
        let ratio = octave_up as f32 / base as f32;
        assert!((ratio - 2.0).abs() < 0.2, "ratio {ratio}");
    }

    #[test]
    fn waveshape_bits_decode() {
        assert_eq!(Waveshape::from_bits(0), Waveshape::Sine);
        assert_eq!(Waveshape::from_bits(3), Waveshape::Square);
        assert_eq!(Waveshape::from_bits(7), Waveshape::Morph);
    }
}
