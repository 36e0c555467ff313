//! Top-level block processors.
//!
//! [`App`] owns every subsystem and is the single object the board support
//! layer talks to: the DAC interrupt pulls frames through the IO buffer, the
//! 1 kHz tick calls [`App::poll_ui`], and the main loop calls
//! [`App::process_block`] whenever a block is ready. The persistent
//! `multimode` selects which processor renders the block:
//!
//! | Multimode | Processor |
//! |-----------|-----------|
//! | Segments / Advanced / SlowLfo | segment-generator pipeline |
//! | SixEg | six independent DAHDSR envelopes |
//! | Ouroboros / OuroborosAlternate | oscillator bank |
//!
//! The factory-test processor overrides all of them while active.

use crate::chain::ChainState;
use crate::cv_reader::{AnalogInputs, CvReader};
use crate::io_buffer::Block;
use crate::leds::LedColor;
use crate::link::SerialLink;
use crate::ui::Ui;
use crate::SystemClock;
use cadena_dsp::{GateFlags, BLOCK_SIZE};
use cadena_gen::{Envelope, EnvelopeStage, Oscillator, Output, SegmentGenerator, Waveshape};
use cadena_settings::{MultiMode, Settings, NUM_CHANNELS};
use libm::roundf;

/// Blocks to ignore gates after boot in the six-envelope mode (~1 s), while
/// the normalization probe settles.
const EG_GATE_WARMUP_BLOCKS: u32 = 4000;

/// The assembled firmware core.
pub struct App {
    pub settings: Settings,
    pub clock: SystemClock,
    pub chain: ChainState,
    pub cv_reader: CvReader,
    pub ui: Ui,
    pub generators: [SegmentGenerator; NUM_CHANNELS],
    pub envelopes: [Envelope; NUM_CHANNELS],
    pub oscillators: [Oscillator; NUM_CHANNELS],

    out: [Output; BLOCK_SIZE],
    no_gate: [GateFlags; BLOCK_SIZE],
    eg_warmup: u32,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        let chain = ChainState::new(&settings);
        Self {
            chain,
            settings,
            clock: SystemClock::new(),
            cv_reader: CvReader::new(),
            ui: Ui::new(),
            generators: core::array::from_fn(|i| SegmentGenerator::new(0x9e37_79b9 ^ i as u32)),
            envelopes: core::array::from_fn(|_| Envelope::new()),
            oscillators: core::array::from_fn(|_| Oscillator::new()),
            out: [Output::default(); BLOCK_SIZE],
            no_gate: [GateFlags::LOW; BLOCK_SIZE],
            eg_warmup: EG_GATE_WARMUP_BLOCKS,
        }
    }

    /// The 1 kHz tick: advances the clock and polls the UI with the raw
    /// switch states.
    pub fn poll_ui(&mut self, raw_pressed: [bool; NUM_CHANNELS]) {
        self.clock.tick();
        self.ui.poll(
            &self.clock,
            raw_pressed,
            &mut self.settings,
            &mut self.chain,
            &mut self.cv_reader,
        );
    }

    /// Refresh the per-block analog inputs of `block` (called at the start
    /// of each block by the fill path).
    pub fn read_controls(&mut self, inputs: &AnalogInputs, block: &mut Block) {
        self.cv_reader
            .read(inputs, &self.settings, &self.chain, block);
    }

    /// Render one block.
    pub fn process_block(
        &mut self,
        left: &mut dyn SerialLink,
        right: &mut dyn SerialLink,
        block: &mut Block,
    ) {
        if self.ui.in_factory_test() {
            self.process_test(block);
            return;
        }
        match self.settings.multimode() {
            MultiMode::Segments | MultiMode::Advanced | MultiMode::SlowLfo => {
                self.process_segments(left, right, block);
            }
            MultiMode::SixEg => self.process_six_eg(block),
            MultiMode::Ouroboros | MultiMode::OuroborosAlternate => {
                self.process_ouroboros(block);
            }
        }
    }

    fn process_segments(
        &mut self,
        left: &mut dyn SerialLink,
        right: &mut dyn SerialLink,
        block: &mut Block,
    ) {
        self.chain.update(
            left,
            right,
            block,
            &mut self.settings,
            &mut self.generators,
            &mut self.out,
        );

        // Channels render in order into the shared output buffer: a slave
        // channel reads the progress its left-hand group wrote there.
        for channel in 0..NUM_CHANNELS {
            let gates: &[GateFlags; BLOCK_SIZE] = if block.input_patched[channel] {
                &block.input[channel]
            } else {
                &self.no_gate
            };
            let active = self.generators[channel].process(gates, &mut self.out);
            self.ui.set_slider_led(channel, active, 5);
            for (frame, o) in block.output[channel].iter_mut().zip(self.out.iter()) {
                *frame = self.settings.dac_code(channel, o.value);
            }
        }
    }

    fn process_six_eg(&mut self, block: &mut Block) {
        // The first channel's stage lengths drive the slider LEDs, as a
        // legend for which stages are in play.
        self.ui.set_slider_led(0, self.envelopes[0].has_delay(), 1);
        self.ui.set_slider_led(1, self.envelopes[0].has_attack(), 1);
        self.ui.set_slider_led(2, self.envelopes[0].has_hold(), 1);
        self.ui.set_slider_led(3, self.envelopes[0].has_decay(), 1);
        self.ui.set_slider_led(4, self.envelopes[0].has_sustain(), 1);
        self.ui.set_slider_led(5, self.envelopes[0].has_release(), 1);

        if self.eg_warmup > 0 {
            self.eg_warmup -= 1;
        }

        for channel in 0..NUM_CHANNELS {
            let envelope = &mut self.envelopes[channel];
            envelope.set_delay_length(block.cv_slider[0]);
            envelope.set_attack_length(block.cv_slider[1]);
            envelope.set_hold_length(block.cv_slider[2]);
            envelope.set_decay_length(block.cv_slider[3]);
            envelope.set_sustain_level(block.cv_slider[4]);
            envelope.set_release_length(block.cv_slider[5]);

            let mut gate = self.ui.switches().pressed(channel);
            if !gate && self.eg_warmup == 0 && block.input_patched[channel] {
                gate = block.input[channel].iter().any(|g| g.is_high());
            }
            envelope.gate(gate);

            let value = envelope.value();
            for frame in block.output[channel].iter_mut() {
                *frame = self.settings.dac_code(channel, value);
            }

            self.ui.set_led(
                channel,
                match envelope.current_stage() {
                    EnvelopeStage::Delay
                    | EnvelopeStage::Attack
                    | EnvelopeStage::Hold
                    | EnvelopeStage::Decay => LedColor::Green,
                    EnvelopeStage::Sustain => LedColor::Yellow,
                    EnvelopeStage::Release => LedColor::Red,
                    EnvelopeStage::Idle => LedColor::Off,
                },
            );
        }
    }

    fn process_ouroboros(&mut self, block: &mut Block) {
        let alternate = self.settings.multimode() == MultiMode::OuroborosAlternate;
        for channel in 0..NUM_CHANNELS {
            let word = self.settings.state().word(channel);
            let shape = if alternate {
                Waveshape::Morph
            } else {
                Waveshape::from_bits(word.waveshape_bits())
            };
            self.oscillators[channel].set_shape(shape);

            // Pitch in semitones: the combined CV + slider spans four
            // octaves, dropped by the configured octave setting.
            let pitch = roundf(block.cv_slider[channel] * 48.0)
                - 12.0 * word.octave_bits() as f32;
            let morph = if alternate {
                block.pot[channel]
            } else {
                0.5
            };
            let level = if alternate { 1.0 } else { block.pot[channel] };

            let mut samples = [0.0f32; BLOCK_SIZE];
            self.oscillators[channel].render(pitch, morph, level, &mut samples);
            self.ui
                .set_slider_led(channel, samples[BLOCK_SIZE - 1] > 0.5, 1);
            for (frame, sample) in block.output[channel].iter_mut().zip(samples.iter()) {
                *frame = self.settings.dac_code(channel, *sample);
            }
        }
    }

    /// Diagnostics: LEDs track pots and gates, outputs track sliders.
    fn process_test(&mut self, block: &mut Block) {
        for channel in 0..NUM_CHANNELS {
            self.ui.set_led(
                channel,
                if block.pot[channel] > 0.5 {
                    LedColor::Green
                } else {
                    LedColor::Off
                },
            );

            let mut gate = self.ui.switches().pressed(channel);
            if block.input_patched[channel] {
                gate = gate || block.input[channel].iter().any(|g| g.is_high());
            }
            if gate {
                self.ui.set_led(channel, LedColor::Red);
            }

            let output = if gate { 1.0 } else { block.cv_slider[channel] };
            self.ui.set_slider_led(channel, output > 0.001, 1);
            for frame in block.output[channel].iter_mut() {
                *frame = self.settings.dac_code(channel, output);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::NullLink;

    fn ready_app() -> App {
        let mut app = App::new(Settings::default());
        // Run discovery to completion (solo module).
        let mut left = NullLink;
        let mut right = NullLink;
        let mut block = Block::default();
        for _ in 0..8100 {
            app.process_block(&mut left, &mut right, &mut block);
        }
        app
    }

    #[test]
    fn solo_module_reaches_ready() {
        let app = ready_app();
        assert_eq!(app.chain.status(), crate::chain::ChainStatus::Ready);
        assert_eq!(app.chain.size(), 1);
        assert_eq!(app.chain.index(), 0);
    }

    #[test]
    fn unpatched_channels_produce_output_codes() {
        let mut app = ready_app();
        let mut left = NullLink;
        let mut right = NullLink;
        let mut block = Block::default();
        // Give channel 0 a self-loop (free-running LFO).
        app.settings.mutable_state().segment_configuration[0] = 0b0100;
        block.cv_slider = [0.5; NUM_CHANNELS];

        let mut distinct = std::collections::HashSet::new();
        for _ in 0..20_000 {
            app.process_block(&mut left, &mut right, &mut block);
            distinct.insert(block.output[0][0]);
        }
        // An LFO sweeps through many DAC codes.
        assert!(distinct.len() > 100, "only {} distinct codes", distinct.len());
    }

    #[test]
    fn six_eg_mode_renders_envelopes() {
        let mut app = ready_app();
        app.settings.mutable_state().set_multimode(MultiMode::SixEg);
        let mut left = NullLink;
        let mut right = NullLink;
        let mut block = Block::default();
        block.cv_slider = [0.3; NUM_CHANNELS];

        // Warm up, then gate channel 0 via its input jack.
        for _ in 0..EG_GATE_WARMUP_BLOCKS + 10 {
            app.process_block(&mut left, &mut right, &mut block);
        }
        let idle_code = block.output[0][0];
        block.input_patched[0] = true;
        block.input[0] = [GateFlags::HIGH; BLOCK_SIZE];
        let mut changed = false;
        for _ in 0..5000 {
            app.process_block(&mut left, &mut right, &mut block);
            if block.output[0][0] != idle_code {
                changed = true;
                break;
            }
        }
        assert!(changed, "envelope never moved on gate");
    }

    #[test]
    fn ouroboros_mode_oscillates() {
        let mut app = ready_app();
        app.settings
            .mutable_state()
            .set_multimode(MultiMode::Ouroboros);
        let mut left = NullLink;
        let mut right = NullLink;
        let mut block = Block::default();
        block.cv_slider = [0.5; NUM_CHANNELS];
        block.pot = [1.0; NUM_CHANNELS];

        let mut distinct = std::collections::HashSet::new();
        for _ in 0..2000 {
            app.process_block(&mut left, &mut right, &mut block);
            distinct.insert(block.output[2][0]);
        }
        assert!(distinct.len() > 20, "oscillator not running");
    }
}
