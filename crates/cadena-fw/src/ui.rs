//! User interface: switch interpretation, property edits, LED rendering.
//!
//! Runs at the 1 kHz tick. Presses are forwarded to the chain (which owns
//! type/loop edits chain-wide); holding a switch turns the channel's pot and
//! slider into property editors (bipolar toggle, LFO range or quantizer
//! scale) through the CV reader's lock/limbo machinery; a five-second hold
//! switches the multimode and reinitializes the chain.

use crate::chain::{ChainState, ChainStatus, LoopStatus};
use crate::clock::SystemClock;
use crate::cv_reader::CvReader;
use crate::leds::{LedColor, LedFrame};
use crate::switches::Switches;
use cadena_settings::{MultiMode, Settings, NUM_CHANNELS};

const LONG_PRESS_MS: i32 = 500;
const MULTIMODE_PRESS_MS: i32 = 5000;

/// Control-movement threshold that starts a property edit.
const PROP_EDIT_THRESHOLD: f32 = 0.05;

/// Multimode reached by very-long-pressing each of the six switches.
const MULTIMODES: [MultiMode; NUM_CHANNELS] = [
    MultiMode::Segments,
    MultiMode::Advanced,
    MultiMode::SlowLfo,
    MultiMode::SixEg,
    MultiMode::Ouroboros,
    MultiMode::OuroborosAlternate,
];

/// Segment type to LED color.
const PALETTE: [LedColor; 4] = [
    LedColor::Green,
    LedColor::Yellow,
    LedColor::Red,
    LedColor::Off,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiMode {
    Normal,
    FactoryTest,
}

/// The per-module user interface.
pub struct Ui {
    switches: Switches,
    leds: LedFrame,
    mode: UiMode,

    changing_slider_prop: u8,
    changing_pot_prop: u8,

    /// Channel LED override used by the six-envelope processor.
    led_color: [LedColor; NUM_CHANNELS],
    slider_led_counter: [u8; NUM_CHANNELS],

    press_time: [i32; NUM_CHANNELS],
    press_time_multimode: [i32; NUM_CHANNELS],
}

impl Default for Ui {
    fn default() -> Self {
        Self::new()
    }
}

impl Ui {
    pub fn new() -> Self {
        Self {
            switches: Switches::new(),
            leds: LedFrame::default(),
            mode: UiMode::Normal,
            changing_slider_prop: 0,
            changing_pot_prop: 0,
            led_color: [LedColor::Off; NUM_CHANNELS],
            slider_led_counter: [0; NUM_CHANNELS],
            press_time: [0; NUM_CHANNELS],
            press_time_multimode: [0; NUM_CHANNELS],
        }
    }

    /// Boot-time hook: holding the first switch during power-up toggles the
    /// color-blind palette.
    pub fn init(&mut self, switch0_held: bool, settings: &mut Settings) {
        if switch0_held {
            let state = settings.mutable_state();
            state.color_blind = !state.color_blind;
        }
    }

    #[inline]
    pub fn switches(&self) -> &Switches {
        &self.switches
    }

    #[inline]
    pub fn leds(&self) -> &LedFrame {
        &self.leds
    }

    pub fn set_factory_test(&mut self, on: bool) {
        self.mode = if on { UiMode::FactoryTest } else { UiMode::Normal };
    }

    #[inline]
    pub fn in_factory_test(&self) -> bool {
        self.mode == UiMode::FactoryTest
    }

    /// Channel LED override (used by the six-envelope and test processors).
    #[inline]
    pub fn set_led(&mut self, i: usize, color: LedColor) {
        self.led_color[i] = color;
    }

    /// Light a slider LED for `duration` ticks.
    #[inline]
    pub fn set_slider_led(&mut self, i: usize, on: bool, duration: u8) {
        if on {
            self.slider_led_counter[i] = duration;
        }
    }

    /// The 1 kHz tick: render LEDs, debounce, interpret presses.
    pub fn poll(
        &mut self,
        clock: &SystemClock,
        raw_pressed: [bool; NUM_CHANNELS],
        settings: &mut Settings,
        chain: &mut ChainState,
        cv_reader: &mut CvReader,
    ) {
        self.update_leds(clock, settings, chain, cv_reader);
        self.switches.debounce(raw_pressed);

        // Forward presses to the chain; a later suspend_switches overrides
        // this when a property edit is in progress, so it must come first.
        let mut pressed_mask = 0u8;
        for i in 0..NUM_CHANNELS {
            if self.switches.pressed(i) {
                pressed_mask |= 1 << i;
            }
        }
        chain.set_local_switch_pressed(pressed_mask);

        self.edit_properties(settings, chain, cv_reader);

        let changing_prop = self.changing_pot_prop | self.changing_slider_prop;
        if changing_prop != 0 {
            chain.suspend_switches();
        }

        if settings.in_ouroboros_mode() {
            self.poll_waveshape_presses(changing_prop, settings);
        }

        // Very long presses switch the multimode.
        for i in 0..NUM_CHANNELS {
            if self.switches.pressed(i) && changing_prop == 0 {
                if self.press_time_multimode[i] != -1 {
                    self.press_time_multimode[i] += 1;
                }
                if self.press_time_multimode[i] > MULTIMODE_PRESS_MS {
                    self.multimode_toggle(i, settings, chain);
                    self.press_time_multimode[i] = -1;
                }
            } else {
                self.press_time_multimode[i] = 0;
            }
        }
    }

    /// Pot/slider movements while a switch is held edit channel properties
    /// instead of parameters.
    fn edit_properties(
        &mut self,
        settings: &mut Settings,
        chain: &ChainState,
        cv_reader: &mut CvReader,
    ) {
        for i in 0..NUM_CHANNELS {
            if !self.switches.pressed(i) {
                self.changing_pot_prop &= !(1 << i);
                self.changing_slider_prop &= !(1 << i);
                cv_reader.unlock(i);
                continue;
            }
            cv_reader.lock(i);

            let slider = cv_reader.lp_slider(i).clamp(0.0, 0.9999);
            let pot = cv_reader.lp_pot(i).clamp(0.0, 0.9999);
            let old_word = settings.state().word(i);
            let mut word = old_word;

            let slider_moved =
                (slider - cv_reader.locked_slider(i)).abs() > PROP_EDIT_THRESHOLD;
            if self.changing_slider_prop & (1 << i) != 0 || slider_moved {
                self.changing_slider_prop |= 1 << i;
                if settings.in_segment_mode() {
                    match word.type_bits() {
                        // Ramp: slider picks the LFO / time range.
                        0 => word.set_range_bits(range_from_slider(slider)),
                        // Random/Turing: only the self-looping (random LFO)
                        // form has a range to pick.
                        3 => {
                            if chain.loop_status(i) == LoopStatus::SelfLoop {
                                word.set_range_bits(range_from_slider(slider));
                            }
                        }
                        // Step and hold: slider picks the quantizer scale.
                        _ => word.set_scale_bits((4.0 * slider) as u16),
                    }
                } else if settings.in_ouroboros_mode() {
                    word.set_octave_bits(if slider < 0.25 {
                        2
                    } else if slider < 0.75 {
                        1
                    } else {
                        0
                    });
                }
            }

            let pot_moved = (pot - cv_reader.locked_pot(i)).abs() > PROP_EDIT_THRESHOLD;
            if self.changing_pot_prop & (1 << i) == 0 && pot_moved {
                self.changing_pot_prop |= 1 << i;
                // The pot gesture is a toggle, not a continuous edit.
                if settings.in_segment_mode() {
                    word.toggle_bipolar();
                }
            }

            if word != old_word {
                settings.mutable_state().segment_configuration[i] = word.0;
            }
        }
    }

    /// Ouroboros modes: short press cycles the waveshape, long press toggles
    /// the alternate-bank bit.
    fn poll_waveshape_presses(&mut self, changing_prop: u8, settings: &mut Settings) {
        for i in 0..NUM_CHANNELS {
            if changing_prop != 0 {
                self.press_time[i] = 0;
            } else if self.switches.pressed(i) {
                if self.press_time[i] != -1 {
                    self.press_time[i] += 1;
                }
            } else {
                if self.press_time[i] > LONG_PRESS_MS {
                    if self.press_time[i] < MULTIMODE_PRESS_MS {
                        settings
                            .mutable_state()
                            .update_word(i, |w| w.toggle_waveshape_bank());
                    }
                } else if self.press_time[i] > 0 {
                    settings.mutable_state().update_word(i, |w| {
                        let low = w.waveshape_bits() & 0b011;
                        let bank = w.waveshape_bits() & 0b100;
                        w.set_waveshape_bits(bank | ((low + 1) % 3));
                    });
                }
                self.press_time[i] = 0;
            }
        }
    }

    fn multimode_toggle(&mut self, i: usize, settings: &mut Settings, chain: &mut ChainState) {
        if settings.multimode() == MULTIMODES[i] {
            return;
        }
        // Nothing pressed right now should fire an action on release.
        self.press_time = [-1; NUM_CHANNELS];
        chain.suspend_switches();
        settings.mutable_state().set_multimode(MULTIMODES[i]);
        chain.start_reinit();
        log::debug!("multimode changed to {:?}", MULTIMODES[i]);
    }

    /// Brightness pattern keyed to the millisecond clock: a sawtooth (ramp)
    /// or triangle in 0..15, slowed by `shift`.
    fn fade_pattern(clock: &SystemClock, shift: u8, phase: u8, ramp: bool) -> u8 {
        let x = ((clock.milliseconds() >> shift) as u8).wrapping_add(phase) & 0x1f;
        if ramp {
            if x > 0x0f {
                0x0f
            } else {
                0x0f - x
            }
        } else if x <= 0x10 {
            x
        } else {
            0x1f - x
        }
    }

    fn show_mode(&mut self, settings: &Settings) {
        for i in 0..NUM_CHANNELS {
            if MULTIMODES[i] == settings.multimode() {
                self.leds.set_channel(i, LedColor::Red);
            }
        }
    }

    fn update_leds(
        &mut self,
        clock: &SystemClock,
        settings: &Settings,
        chain: &ChainState,
        cv_reader: &CvReader,
    ) {
        self.leds.clear();
        let ms = clock.milliseconds();

        if self.mode == UiMode::FactoryTest {
            let counter = ((ms >> 8) % 3) as usize;
            for i in 0..NUM_CHANNELS {
                match self.slider_led_counter[i] {
                    0 => {
                        self.leds.set_channel(i, PALETTE[counter]);
                        self.leds.set_slider(
                            i,
                            if counter == 0 {
                                LedColor::Green
                            } else {
                                LedColor::Off
                            },
                        );
                    }
                    1 => self.leds.set_channel(i, LedColor::Green),
                    _ => {
                        self.leds.set_channel(i, LedColor::Green);
                        self.leds.set_slider(i, LedColor::Green);
                    }
                }
            }
        } else if chain.status() == ChainStatus::Reinitializing {
            self.show_mode(settings);
        } else if chain.status() == ChainStatus::Discovering {
            // A light walks back and forth across the whole chain so the
            // user can see how many modules found each other.
            let n = chain.size() * NUM_CHANNELS;
            let mut counter = (ms >> 5) as usize % (2 * n).saturating_sub(2).max(1);
            if counter >= n {
                counter = 2 * n - 2 - counter;
            }
            let first_local = chain.index() * NUM_CHANNELS;
            if counter >= first_local && counter < first_local + NUM_CHANNELS {
                self.leds.set_channel(counter - first_local, LedColor::Yellow);
                self.leds.set_slider(counter - first_local, LedColor::Green);
            }
            self.show_mode(settings);
        } else if settings.in_segment_mode() || settings.in_ouroboros_mode() {
            self.update_normal_leds(clock, settings, chain);
        } else if settings.multimode() == MultiMode::SixEg {
            for i in 0..NUM_CHANNELS {
                self.leds.set_channel(i, self.led_color[i]);
                self.leds.set_slider(
                    i,
                    if self.slider_led_counter[i] > 0 {
                        LedColor::Green
                    } else {
                        LedColor::Off
                    },
                );
            }
        }

        for i in 0..NUM_CHANNELS {
            if self.slider_led_counter[i] > 0 {
                self.slider_led_counter[i] -= 1;
            }
            // Dim the LEDs of controls still in limbo, proportionally to how
            // far the frozen value still is from the live one.
            if cv_reader.slider_in_limbo(i) {
                let dimness = (8.0
                    * (cv_reader.locked_slider(i) - cv_reader.lp_slider(i)).abs())
                    as u32;
                self.leds.set_slider(
                    i,
                    if ms & 0x07 < dimness {
                        LedColor::Off
                    } else {
                        LedColor::Green
                    },
                );
            }
            if cv_reader.pot_in_limbo(i) {
                let dimness =
                    (8.0 * (cv_reader.locked_pot(i) - cv_reader.lp_pot(i)).abs()) as u32;
                if ms & 0x07 < dimness {
                    self.leds.set_channel(i, LedColor::Off);
                }
            }
        }
    }

    fn update_normal_leds(&mut self, clock: &SystemClock, settings: &Settings, chain: &ChainState) {
        let ms = clock.milliseconds();
        let pwm = (ms & 0xf) as u8;

        let fade_patterns = [
            0xf, // none
            Self::fade_pattern(clock, 4, 0x00, false), // loop start
            Self::fade_pattern(clock, 4, 0x0f, false), // loop end
            Self::fade_pattern(clock, 4, 0x08, false), // self loop
        ];
        let lfo_patterns = [
            Self::fade_pattern(clock, 4, 0x08, false), // default
            Self::fade_pattern(clock, 6, 0x08, false), // slow
            Self::fade_pattern(clock, 2, 0x08, false), // fast
        ];
        let ramp_patterns = [
            0xf,
            Self::fade_pattern(clock, 5, 0x08, true), // fast ramp
            Self::fade_pattern(clock, 7, 0x08, true), // slow ramp
        ];

        for i in 0..NUM_CHANNELS {
            let word = settings.state().word(i);
            let segment_type = word.type_bits() as usize;
            let mut color = PALETTE[segment_type];
            let mut brightness: u8 = 0xf;

            if settings.in_ouroboros_mode() {
                brightness = if word.waveshape_bits() & 0b100 != 0 {
                    fade_patterns[3]
                } else {
                    0xf
                };
                color = PALETTE[(word.waveshape_bits() & 0b011) as usize];
            } else {
                match chain.loop_status(i) {
                    LoopStatus::SelfLoop => {
                        brightness = lfo_patterns[word.range_bits() as usize
                            % lfo_patterns.len()];
                    }
                    status => {
                        brightness = fade_patterns[status as usize];
                        if segment_type == 0 {
                            let ramp = ramp_patterns
                                [word.range_bits() as usize % ramp_patterns.len()];
                            brightness = (u16::from(brightness) * (u16::from(ramp) + 1) >> 5)
                                as u8;
                        }
                    }
                }
                if self.changing_slider_prop & (1 << i) != 0
                    && (segment_type == 1 || segment_type == 2)
                {
                    // Editing the quantizer scale: blink the scale index.
                    let scale = 3 - word.scale_bits() as usize;
                    color = if (ms >> 6) % 2 == 0 {
                        PALETTE[scale]
                    } else {
                        LedColor::Off
                    };
                } else if segment_type == 3 {
                    // Turing: shimmer between green and red.
                    let mut proportion = ((ms >> 7) & 15) as u32;
                    if proportion > 7 {
                        proportion = 15 - proportion;
                    }
                    color = if ms & 7 < proportion {
                        LedColor::Green
                    } else {
                        LedColor::Red
                    };
                }

                if settings.state().color_blind {
                    // Encode the type in brightness texture instead of hue.
                    match segment_type {
                        0 => {
                            let modulation =
                                Self::fade_pattern(clock, 6, 13 - 2 * i as u8, false) >> 1;
                            brightness =
                                (u16::from(brightness) * (7 + u16::from(modulation)) >> 4) as u8;
                        }
                        1 => brightness = if brightness >= 0x8 { 0xf } else { 0 },
                        2 => brightness = if brightness >= 0xc { 0x1 } else { 0 },
                        _ => {}
                    }
                }

                if word.bipolar() && (ms >> 8) % 4 == 0 {
                    color = LedColor::Red;
                    brightness = 0x1;
                }
            }

            self.leds.set_channel(
                i,
                if brightness >= pwm && brightness != 0 {
                    color
                } else {
                    LedColor::Off
                },
            );
            self.leds.set_slider(
                i,
                if self.slider_led_counter[i] > 0 {
                    LedColor::Green
                } else {
                    LedColor::Off
                },
            );
        }
    }
}

/// Three-way range selection from the slider position.
fn range_from_slider(slider: f32) -> u16 {
    if slider < 0.25 {
        // Bottom of the throw: slow.
        1
    } else if slider > 0.75 {
        2
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv_reader::AnalogInputs;
    use crate::io_buffer::Block;

    fn poll_n(
        ui: &mut Ui,
        clock: &mut SystemClock,
        raw: [bool; NUM_CHANNELS],
        settings: &mut Settings,
        chain: &mut ChainState,
        cv: &mut CvReader,
        n: usize,
    ) {
        for _ in 0..n {
            clock.tick();
            ui.poll(clock, raw, settings, chain, cv);
        }
    }

    fn settle_controls(cv: &mut CvReader, settings: &Settings, chain: &ChainState, inputs: &AnalogInputs) {
        let mut block = Block::default();
        for _ in 0..1000 {
            cv.read(inputs, settings, chain, &mut block);
        }
    }

    #[test]
    fn very_long_press_switches_multimode() {
        let mut settings = Settings::default();
        let mut chain = ChainState::new(&settings);
        let mut cv = CvReader::new();
        let mut ui = Ui::new();
        let mut clock = SystemClock::new();

        let mut raw = [false; NUM_CHANNELS];
        raw[3] = true;
        poll_n(&mut ui, &mut clock, raw, &mut settings, &mut chain, &mut cv, 5100);
        assert_eq!(settings.multimode(), MultiMode::SixEg);
        assert_eq!(chain.status(), ChainStatus::Reinitializing);
    }

    #[test]
    fn pot_swing_while_held_toggles_bipolar() {
        let mut settings = Settings::default();
        let mut chain = ChainState::new(&settings);
        let mut cv = CvReader::new();
        let mut ui = Ui::new();
        let mut clock = SystemClock::new();

        let mut inputs = AnalogInputs::default();
        inputs.pot[1] = 0.1;
        settle_controls(&mut cv, &settings, &chain, &inputs);

        // Press, then move the pot well past the threshold.
        let mut raw = [false; NUM_CHANNELS];
        raw[1] = true;
        poll_n(&mut ui, &mut clock, raw, &mut settings, &mut chain, &mut cv, 20);
        inputs.pot[1] = 0.6;
        settle_controls(&mut cv, &settings, &chain, &inputs);
        poll_n(&mut ui, &mut clock, raw, &mut settings, &mut chain, &mut cv, 20);

        assert!(settings.state().word(1).bipolar());
        // The toggle fires once per hold, not continuously.
        inputs.pot[1] = 0.9;
        settle_controls(&mut cv, &settings, &chain, &inputs);
        poll_n(&mut ui, &mut clock, raw, &mut settings, &mut chain, &mut cv, 20);
        assert!(settings.state().word(1).bipolar());
    }

    #[test]
    fn slider_while_held_sets_range_bits_on_ramp() {
        let mut settings = Settings::default();
        let mut chain = ChainState::new(&settings);
        let mut cv = CvReader::new();
        let mut ui = Ui::new();
        let mut clock = SystemClock::new();

        let mut inputs = AnalogInputs::default();
        inputs.slider[0] = 0.5;
        settle_controls(&mut cv, &settings, &chain, &inputs);

        let mut raw = [false; NUM_CHANNELS];
        raw[0] = true;
        poll_n(&mut ui, &mut clock, raw, &mut settings, &mut chain, &mut cv, 20);
        inputs.slider[0] = 0.05;
        settle_controls(&mut cv, &settings, &chain, &inputs);
        poll_n(&mut ui, &mut clock, raw, &mut settings, &mut chain, &mut cv, 20);

        // Bottom of the throw selects the slow range.
        assert_eq!(settings.state().word(0).range_bits(), 1);
    }

    #[test]
    fn property_edit_suspends_chain_switches() {
        let mut settings = Settings::default();
        let mut chain = ChainState::new(&settings);
        let mut cv = CvReader::new();
        let mut ui = Ui::new();
        let mut clock = SystemClock::new();

        let mut inputs = AnalogInputs::default();
        inputs.slider[0] = 0.9;
        settle_controls(&mut cv, &settings, &chain, &inputs);

        let mut raw = [false; NUM_CHANNELS];
        raw[0] = true;
        poll_n(&mut ui, &mut clock, raw, &mut settings, &mut chain, &mut cv, 20);
        inputs.slider[0] = 0.2;
        settle_controls(&mut cv, &settings, &chain, &inputs);
        poll_n(&mut ui, &mut clock, raw, &mut settings, &mut chain, &mut cv, 20);

        // The chain sees the "busy editing" marker, not the raw press.
        assert!(ui.changing_slider_prop & 1 != 0);
    }

    #[test]
    fn release_unlocks_the_channel() {
        let mut settings = Settings::default();
        let mut chain = ChainState::new(&settings);
        let mut cv = CvReader::new();
        let mut ui = Ui::new();
        let mut clock = SystemClock::new();

        let mut raw = [false; NUM_CHANNELS];
        raw[4] = true;
        poll_n(&mut ui, &mut clock, raw, &mut settings, &mut chain, &mut cv, 20);
        assert!(cv.is_locked(4));
        raw[4] = false;
        poll_n(&mut ui, &mut clock, raw, &mut settings, &mut chain, &mut cv, 20);
        assert!(!cv.is_locked(4));
    }
}
