//! Sequencer shape of the segment generator.
//!
//! Selected when a group reads as "one clock head plus step-like segments":
//! the head's gate input clocks the active step, the head's parameters set
//! direction (pot, through a seven-way hysteresis quantizer) and reset
//! (slider/CV rising edge). Loop bits inside the group narrow the first/last
//! step span; without any, the whole group plays.

use crate::config::{Configuration, SegmentType};
use crate::generator::{Output, ProcessMode, SegmentGenerator, MAX_NUM_SEGMENTS};
use crate::turing::advance_turing;
use cadena_dsp::{one_pole, portamento_to_coefficient, GateFlags, HysteresisQuantizer};

/// Clock inhibition after a reset edge, in samples (5 ms).
const CLOCK_INHIBIT_DELAY: i32 = 31_250 * 5 / 1000;

/// Reset arms at this level on the head's primary parameter...
const RESET_THRESHOLD: f32 = 0.125;
/// ...and re-arms only after falling below this one.
const RESET_REARM_THRESHOLD: f32 = 0.0625;

/// Step ordering, selected by the head's secondary parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
    UpDown,
    Alternating,
    Random,
    RandomWithoutRepeat,
    Addressable,
}

const DIRECTIONS: [Direction; 7] = [
    Direction::Up,
    Direction::Down,
    Direction::UpDown,
    Direction::Alternating,
    Direction::Random,
    Direction::RandomWithoutRepeat,
    Direction::Addressable,
];

/// Sequencer-only state, split out of the generator so the main struct stays
/// readable.
#[derive(Debug, Clone)]
pub struct SequencerState {
    pub(crate) first_step: i32,
    pub(crate) last_step: i32,
    pub(crate) quantized_output: bool,
    pub(crate) up_down_counter: i32,
    pub(crate) reset: bool,
    pub(crate) inhibit_clock: i32,
    pub(crate) address_quantizer: HysteresisQuantizer,
    pub(crate) step_quantizer: [HysteresisQuantizer; MAX_NUM_SEGMENTS],
}

impl Default for SequencerState {
    fn default() -> Self {
        Self {
            first_step: 1,
            last_step: 1,
            quantized_output: false,
            up_down_counter: 0,
            reset: false,
            inhibit_clock: 0,
            address_quantizer: HysteresisQuantizer::new(),
            step_quantizer: [HysteresisQuantizer::new(); MAX_NUM_SEGMENTS],
        }
    }
}

impl SegmentGenerator {
    pub(crate) fn configure_sequencer(&mut self, configs: &[Configuration]) {
        self.num_segments = configs.len();

        self.seq.first_step = 0;
        for (i, c) in configs.iter().enumerate().skip(1) {
            if c.looped {
                if self.seq.first_step == 0 {
                    self.seq.first_step = i as i32;
                    self.seq.last_step = i as i32;
                } else {
                    self.seq.last_step = i as i32;
                }
            }
            self.segments[i].advance_tm = c.segment_type == SegmentType::Turing;
        }
        if self.seq.first_step == 0 {
            // No loop found: play the whole group.
            self.seq.first_step = 1;
            self.seq.last_step = configs.len() as i32 - 1;
        }

        self.seq.inhibit_clock = 0;
        self.seq.up_down_counter = 0;
        self.seq.quantized_output = configs[0].segment_type == SegmentType::Ramp;
        self.seq.reset = false;
        self.lp = 0.0;
        self.value = 0.0;
        self.active_segment = self.seq.first_step;
        self.mode = ProcessMode::Sequencer;
    }

    pub(crate) fn process_sequencer(&mut self, gate_flags: &[GateFlags], out: &mut [Output]) {
        // Direction comes from the head's pot, once per block.
        let direction =
            DIRECTIONS[self.function_quantizer.process(self.parameters[0].secondary, 7)];

        let mut active = self.active_segment;
        let mut last_active = active;
        let first = self.seq.first_step;
        let last = self.seq.last_step;

        if direction == Direction::Addressable {
            self.seq.reset = false;
            active = first
                + self
                    .seq
                    .address_quantizer
                    .process(self.parameters[0].primary, (last - first + 1) as usize)
                    as i32;
        } else {
            // Rising edge on the slider/CV resets to the first step.
            if self.parameters[0].primary > RESET_THRESHOLD && !self.seq.reset {
                self.seq.reset = true;
                active = if direction == Direction::Down { last } else { first };
                self.seq.up_down_counter = 0;
                self.seq.inhibit_clock = CLOCK_INHIBIT_DELAY;
            }
            if self.seq.reset && self.parameters[0].primary < RESET_REARM_THRESHOLD {
                self.seq.reset = false;
            }
        }

        for (gate, o) in gate_flags.iter().zip(out.iter_mut()) {
            if self.seq.inhibit_clock > 0 {
                self.seq.inhibit_clock -= 1;
            }
            let clockable = self.seq.inhibit_clock == 0
                && !self.seq.reset
                && direction != Direction::Addressable;

            if gate.is_rising() && clockable {
                let n = last - first + 1;
                match direction {
                    Direction::Up => {
                        active += 1;
                        if active > last {
                            active = first;
                        }
                    }
                    Direction::Down => {
                        active -= 1;
                        if active < first {
                            active = last;
                        }
                    }
                    Direction::UpDown => {
                        if n == 1 {
                            active = first;
                        } else {
                            self.seq.up_down_counter = (self.seq.up_down_counter + 1) % (2 * (n - 1));
                            let c = self.seq.up_down_counter;
                            active = first + if c < n { c } else { 2 * (n - 1) - c };
                        }
                    }
                    Direction::Alternating => {
                        if n == 1 {
                            active = first;
                        } else if n == 2 {
                            self.seq.up_down_counter = (self.seq.up_down_counter + 1) % 2;
                            active = first + self.seq.up_down_counter;
                        } else {
                            self.seq.up_down_counter = (self.seq.up_down_counter + 1) % (4 * n - 8);
                            let c = self.seq.up_down_counter;
                            let i = (c - 1) / 2;
                            active = first
                                + if c & 1 == 1 {
                                    1 + if i < n - 1 { i } else { 2 * (n - 2) - i }
                                } else {
                                    0
                                };
                        }
                    }
                    Direction::Random => {
                        active = first + (self.rng.next_float() * n as f32) as i32;
                    }
                    Direction::RandomWithoutRepeat => {
                        let r = (self.rng.next_float() * (n - 1) as f32) as i32;
                        active = first + (active - first + r + 1) % n;
                    }
                    Direction::Addressable => {}
                }
            }

            let mut value = if self.segments[active as usize].advance_tm {
                self.segments[active as usize].register_value
            } else {
                self.parameters[active as usize].primary
            };
            if self.seq.quantized_output {
                let negative = value < 0.0;
                let note =
                    self.seq.step_quantizer[active as usize].process(value.abs(), 13) as i32;
                let note = if negative { -note } else { note };
                value = note as f32 / 96.0;
            }

            if last_active != active && self.segments[last_active as usize].advance_tm {
                let steps_param = self.parameters[last_active as usize].secondary;
                let prob_param = self.parameters[last_active as usize].primary;
                let random = self.rng.next_float();
                let s = &mut self.segments[last_active as usize];
                s.register_value = advance_turing(
                    steps_param,
                    prob_param,
                    &mut s.shift_register,
                    s.bipolar,
                    random,
                );
            }

            // Turing steps snap; everything else slews by its own portamento.
            let portamento = if self.segments[active as usize].advance_tm {
                0.0
            } else {
                self.parameters[active as usize].secondary
            };
            one_pole(&mut self.lp, value, portamento_to_coefficient(portamento));
            self.value = value;

            last_active = active;
            o.value = self.lp;
            o.phase = 0.0;
            o.segment = active;
        }
        self.active_segment = active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, FreqRange};
    use cadena_dsp::extract_gate_flags;

    fn step(looped: bool) -> Configuration {
        Configuration {
            segment_type: SegmentType::Step,
            looped,
            bipolar: false,
            range: FreqRange::Default,
        }
    }

    fn head() -> Configuration {
        Configuration {
            segment_type: SegmentType::Hold,
            looped: false,
            bipolar: false,
            range: FreqRange::Default,
        }
    }

    fn clock_block(tick: bool) -> [GateFlags; 8] {
        let mut flags = [GateFlags::LOW; 8];
        let mut previous = GateFlags::LOW;
        for (i, f) in flags.iter_mut().enumerate() {
            previous = extract_gate_flags(previous, tick && i == 0);
            *f = previous;
        }
        flags
    }

    fn active_after_clocks(g: &mut SegmentGenerator, clocks: usize) -> Vec<i32> {
        let mut visited = Vec::new();
        let mut out = [Output::default(); 8];
        for _ in 0..clocks {
            g.process(&clock_block(true), &mut out);
            visited.push(out[7].segment);
            g.process(&clock_block(false), &mut out);
        }
        visited
    }

    #[test]
    fn four_step_group_selects_sequencer() {
        let mut g = SegmentGenerator::default();
        g.configure(true, &[head(), step(false), step(false), step(false)]);
        assert_eq!(g.mode(), ProcessMode::Sequencer);
    }

    #[test]
    fn up_direction_cycles_through_steps() {
        let mut g = SegmentGenerator::default();
        g.configure(true, &[head(), step(false), step(false), step(false)]);
        // Direction Up = pot at 0.
        g.set_segment_parameters(0, 0.0, 0.0);
        for i in 1..4 {
            g.set_segment_parameters(i, 0.2 * i as f32, 0.0);
        }
        let visited = active_after_clocks(&mut g, 6);
        assert_eq!(visited, vec![2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn loop_bits_narrow_the_span() {
        let mut g = SegmentGenerator::default();
        // Steps 1..=3 exist, loop marks only 2 and 3.
        g.configure(true, &[head(), step(false), step(true), step(true)]);
        g.set_segment_parameters(0, 0.0, 0.0);
        let visited = active_after_clocks(&mut g, 4);
        assert_eq!(visited, vec![3, 2, 3, 2]);
    }

    #[test]
    fn reset_returns_to_first_step_and_inhibits_clock() {
        let mut g = SegmentGenerator::default();
        g.configure(true, &[head(), step(false), step(false), step(false)]);
        g.set_segment_parameters(0, 0.0, 0.0);
        let mut out = [Output::default(); 8];
        g.process(&clock_block(true), &mut out);
        g.process(&clock_block(true), &mut out);
        assert_eq!(out[7].segment, 3);

        // Reset edge on the primary parameter.
        g.set_segment_parameters(0, 0.5, 0.0);
        g.process(&clock_block(false), &mut out);
        assert_eq!(out[7].segment, 1);

        // A clock arriving during the inhibit window is ignored.
        g.set_segment_parameters(0, 0.0, 0.0);
        g.process(&clock_block(true), &mut out);
        assert_eq!(out[7].segment, 1);
    }

    #[test]
    fn ramp_head_quantizes_output() {
        let mut g = SegmentGenerator::default();
        let ramp_head = Configuration {
            segment_type: SegmentType::Ramp,
            looped: false,
            bipolar: false,
            range: FreqRange::Default,
        };
        g.configure(true, &[ramp_head, step(false), step(false), step(false)]);
        g.set_segment_parameters(0, 0.0, 0.0);
        g.set_segment_parameters(1, 0.5, 0.0);
        g.set_segment_parameters(2, 0.5, 0.0);
        g.set_segment_parameters(3, 0.5, 0.0);
        let mut out = [Output::default(); 8];
        for _ in 0..4 {
            g.process(&clock_block(true), &mut out);
            g.process(&clock_block(false), &mut out);
        }
        // Quantized to n/96 for a 13-note semitone window.
        let value = out[7].value;
        let scaled = value * 96.0;
        assert!(
            (scaled - libm::roundf(scaled)).abs() < 1e-3,
            "value {value} is not on the semitone grid"
        );
    }
}
