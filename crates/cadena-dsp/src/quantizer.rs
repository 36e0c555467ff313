//! Pitch quantizer with per-note hysteresis.
//!
//! Quantizes a CV in octaves-per-unit (1.0 = one octave) onto the notes of a
//! configured [`Scale`], with hysteresis around the current note so a CV
//! sitting between two scale degrees does not warble. Scale degrees are
//! expressed in 1/128ths of a semitone so the tables stay integer.

/// A repeating scale: a span (one octave, in 1/128 semitone units) and the
/// degrees inside it.
#[derive(Debug, Clone, Copy)]
pub struct Scale {
    /// Length of the repeating interval, in 1/128 semitone units.
    pub span: i16,
    /// Number of valid entries in `notes`.
    pub num_notes: usize,
    /// Degrees within the span, in 1/128 semitone units, ascending.
    pub notes: [i16; 16],
}

const fn scale(span: i16, num_notes: usize, notes: [i16; 16]) -> Scale {
    Scale {
        span,
        num_notes,
        notes,
    }
}

/// The selectable quantizer scales: off, chromatic, Ionian, pentatonic major.
pub const SCALES: [Scale; 4] = [
    // Off
    scale(0, 0, [0; 16]),
    // Chromatic
    scale(
        12 << 7,
        12,
        [
            0, 128, 256, 384, 512, 640, 768, 896, 1024, 1152, 1280, 1408, 0, 0, 0, 0,
        ],
    ),
    // Ionian
    scale(
        12 << 7,
        7,
        [0, 256, 512, 640, 896, 1152, 1408, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    ),
    // Pentatonic major
    scale(
        12 << 7,
        5,
        [0, 256, 512, 896, 1152, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    ),
];

/// Hysteresis width around the current note, in 1/128 semitone units.
const HYSTERESIS: i32 = 48;

/// Scale-aware pitch quantizer.
#[derive(Debug, Clone, Copy)]
pub struct NoteQuantizer {
    scale: Scale,
    /// Last emitted pitch, in 1/128 semitone units; quantization is sticky
    /// around it.
    last_pitch: i32,
    enabled: bool,
}

impl Default for NoteQuantizer {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteQuantizer {
    pub fn new() -> Self {
        Self {
            scale: SCALES[0],
            last_pitch: 0,
            enabled: false,
        }
    }

    /// Select the active scale. A scale with no notes disables quantization.
    pub fn configure(&mut self, scale: Scale) {
        self.scale = scale;
        self.enabled = scale.num_notes > 0 && scale.span > 0;
        self.last_pitch = 0;
    }

    /// Quantize a value in octaves (1.0 = one octave above the reference).
    ///
    /// Returns the value unchanged when quantization is off.
    pub fn process(&mut self, value: f32) -> f32 {
        if !self.enabled {
            return value;
        }
        let span = self.scale.span as i32;
        let pitch = libm::roundf(value * (12.0 * 128.0)) as i32;

        // Sticky window around the previous output.
        if (pitch - self.last_pitch).abs() <= HYSTERESIS {
            return self.last_pitch as f32 / (12.0 * 128.0);
        }

        let octave = pitch.div_euclid(span);
        let fractional = pitch.rem_euclid(span);

        // Nearest degree, considering the wrap to the next octave's root.
        let mut best = 0i32;
        let mut best_distance = i32::MAX;
        for i in 0..self.scale.num_notes {
            let note = self.scale.notes[i] as i32;
            let d = (fractional - note).abs();
            if d < best_distance {
                best_distance = d;
                best = note;
            }
        }
        let wrap_distance = (span - fractional) + self.scale.notes[0] as i32;
        let quantized = if wrap_distance < best_distance {
            (octave + 1) * span + self.scale.notes[0] as i32
        } else {
            octave * span + best
        };

        self.last_pitch = quantized;
        quantized as f32 / (12.0 * 128.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_scale_passes_through() {
        let mut q = NoteQuantizer::new();
        assert_eq!(q.process(0.123), 0.123);
    }

    #[test]
    fn chromatic_snaps_to_semitones() {
        let mut q = NoteQuantizer::new();
        q.configure(SCALES[1]);
        // 0.51 semitones above the reference snaps to exactly 1 semitone.
        let out = q.process(0.51 / 12.0);
        assert!((out - 1.0 / 12.0).abs() < 1e-4);
    }

    #[test]
    fn negative_values_quantize() {
        let mut q = NoteQuantizer::new();
        q.configure(SCALES[1]);
        let out = q.process(-1.02 / 12.0);
        assert!((out - (-1.0 / 12.0)).abs() < 1e-4);
    }

    #[test]
    fn hysteresis_holds_the_note() {
        let mut q = NoteQuantizer::new();
        q.configure(SCALES[2]);
        let a = q.process(0.5);
        // A nudge smaller than the sticky window keeps the same note.
        let b = q.process(0.5 + 0.1 / (12.0 * 128.0));
        assert_eq!(a, b);
    }

    #[test]
    fn pentatonic_skips_non_scale_degrees() {
        let mut q = NoteQuantizer::new();
        q.configure(SCALES[3]);
        // 3 semitones is not in the pentatonic major scale; nearest degrees
        // are 2 and 4.
        let out = q.process(3.0 / 12.0);
        let semis = out * 12.0;
        assert!(
            (semis - 2.0).abs() < 1e-3 || (semis - 4.0).abs() < 1e-3,
            "got {semis}"
        );
    }
}
