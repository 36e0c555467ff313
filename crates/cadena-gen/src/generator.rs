//! The per-channel segment generator.
//!
//! A generator is configured in one of four shapes:
//!
//! 1. **Single segment** - the `(trigger, loop, type)` triple of the one
//!    segment selects a specialized process mode from a dispatch table
//!    (two tables: basic and advanced).
//! 2. **Multi segment** - a chain of segments walked by a small state
//!    machine, with per-segment successor slots for gate edges and
//!    completion.
//! 3. **Sequencer** - a clock head followed by step-like segments.
//! 4. **Slave** - renders the progress of a group owned by another channel.
//!
//! Reconfiguration is cheap and happens whenever the chain state notices a
//! flag change; phase is retained across reconfigurations unless the process
//! mode or LFO range actually changed.

use crate::chaos::{double_scroll_step, squash, thomas_step, ChaosState};
use crate::config::{Configuration, FreqRange, GeneratorOptions, Parameters, SegmentType};
use crate::segment::{ParamSource, Segment};
use crate::sequencer::SequencerState;
use crate::shape::shape_lfo;
use crate::turing::advance_turing;
use cadena_dsp::{
    crossfade, one_pole, portamento_to_coefficient, rate_to_frequency, semitones_to_ratio,
    DelayLine, GateFlags, HysteresisQuantizer, ParameterInterpolator, RampExtractor, Ratio, Rng,
    MAX_FREQUENCY, SAMPLE_RATE,
};

/// Upper bound on the number of segments a single generator can run. A full
/// six-module chain can hand all of its channels to one group.
pub const MAX_NUM_SEGMENTS: usize = 36;

/// Capacity of the audio delay line, in samples.
pub const MAX_DELAY: usize = 768;

/// Duration of the low "tooth" emitted when a pulse generator is retriggered
/// while its output is still high.
const RETRIG_DELAY_SAMPLES: i32 = 32;

/// Gate-to-CV latency compensation for sample-and-hold, in samples (2 ms).
const SAMPLE_AND_HOLD_DELAY: usize = 31_250 * 2 / 1000;

/// One output sample: the smoothed value, the raw phase, and which segment is
/// active. Phase and segment are consumed by slave channels and the UI.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub value: f32,
    pub phase: f32,
    pub segment: i32,
}

/// Every way a generator can produce samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    Zero,
    FreeRunningLfo,
    DecayEnvelope,
    TapLfo,
    Portamento,
    AttenuverterOffset,
    SampleAndHold,
    AttSampleAndHold,
    Delay,
    TimedPulse,
    GateGenerator,
    RiseAndFall,
    Random,
    DoubleScroll,
    Thomas,
    Turing,
    Logistic,
    MultiSegment,
    Sequencer,
    Slave,
}

/// Chaotic mode wired into the advanced dispatch table. The Thomas attractor
/// is a drop-in alternative; swap it in here to audition it.
const ADVANCED_CHAOS: ProcessMode = ProcessMode::DoubleScroll;

/// Single-segment dispatch, indexed by `type * 4 + trigger * 2 + loop`.
const BASIC_TABLE: [ProcessMode; 16] = [
    // Ramp
    ProcessMode::Zero,
    ProcessMode::FreeRunningLfo,
    ProcessMode::DecayEnvelope,
    ProcessMode::TapLfo,
    // Step
    ProcessMode::Portamento,
    ProcessMode::Portamento,
    ProcessMode::SampleAndHold,
    ProcessMode::SampleAndHold,
    // Hold
    ProcessMode::Delay,
    ProcessMode::Delay,
    ProcessMode::TimedPulse,
    ProcessMode::GateGenerator,
    // The fourth type is not reachable from the basic UI; a channel that
    // carries it (flashed from the advanced mode) degrades to silence.
    ProcessMode::Zero,
    ProcessMode::Zero,
    ProcessMode::Zero,
    ProcessMode::Zero,
];

const ADVANCED_TABLE: [ProcessMode; 16] = [
    // Ramp
    ProcessMode::RiseAndFall,
    ProcessMode::FreeRunningLfo,
    ProcessMode::DecayEnvelope,
    ProcessMode::TapLfo,
    // Step
    ProcessMode::Portamento,
    ProcessMode::AttenuverterOffset,
    ProcessMode::SampleAndHold,
    ProcessMode::AttSampleAndHold,
    // Hold
    ProcessMode::Delay,
    ProcessMode::Delay,
    ProcessMode::TimedPulse,
    ProcessMode::GateGenerator,
    // Turing
    ProcessMode::Random,
    ADVANCED_CHAOS,
    ProcessMode::Turing,
    ProcessMode::Logistic,
];

/// Tap-LFO clock ratios per frequency range. The tiny negative offset keeps
/// integer multiples from landing exactly on the hysteresis boundary.
const DIVIDER_RATIOS: [Ratio; 7] = [
    Ratio { ratio: 0.249_999, q: 4 },
    Ratio { ratio: 0.333_332_3, q: 3 },
    Ratio { ratio: 0.499_999, q: 2 },
    Ratio { ratio: 0.999_999, q: 1 },
    Ratio { ratio: 1.999_999, q: 1 },
    Ratio { ratio: 2.999_999, q: 1 },
    Ratio { ratio: 3.999_999, q: 1 },
];

const DIVIDER_RATIOS_SLOW: [Ratio; 10] = [
    Ratio { ratio: 0.031_249, q: 32 },
    Ratio { ratio: 0.062_499, q: 16 },
    Ratio { ratio: 0.124_999, q: 8 },
    Ratio { ratio: 0.142_856_1, q: 7 },
    Ratio { ratio: 0.166_665_7, q: 6 },
    Ratio { ratio: 0.199_999, q: 5 },
    Ratio { ratio: 0.249_999, q: 4 },
    Ratio { ratio: 0.333_332_3, q: 3 },
    Ratio { ratio: 0.499_999, q: 2 },
    Ratio { ratio: 0.999_999, q: 1 },
];

const DIVIDER_RATIOS_FAST: [Ratio; 10] = [
    Ratio { ratio: 0.999_999, q: 1 },
    Ratio { ratio: 1.999_999, q: 1 },
    Ratio { ratio: 2.999_999, q: 1 },
    Ratio { ratio: 3.999_999, q: 1 },
    Ratio { ratio: 4.999_999, q: 1 },
    Ratio { ratio: 5.999_999, q: 1 },
    Ratio { ratio: 6.999_999, q: 1 },
    Ratio { ratio: 7.999_999, q: 1 },
    Ratio { ratio: 11.999_999, q: 1 },
    Ratio { ratio: 15.999_999, q: 1 },
];

/// One channel's function generator.
#[derive(Debug, Clone)]
pub struct SegmentGenerator {
    pub(crate) mode: ProcessMode,
    options: GeneratorOptions,

    pub(crate) phase: f32,
    aux: f32,
    start: f32,
    pub(crate) value: f32,
    pub(crate) lp: f32,
    primary: f32,

    previous_segment: i32,
    pub(crate) active_segment: i32,
    monitored_segment: i32,
    retrig_delay: i32,

    pub(crate) num_segments: usize,
    pub(crate) segments: [Segment; MAX_NUM_SEGMENTS + 1],
    pub(crate) parameters: [Parameters; MAX_NUM_SEGMENTS],

    ramp_extractor: RampExtractor,
    reset_ramp_extractor: bool,
    pub(crate) function_quantizer: HysteresisQuantizer,

    delay_line: DelayLine<f32, MAX_DELAY>,
    gate_delay: DelayLine<GateFlags, 128>,

    pub(crate) seq: SequencerState,

    chaos: ChaosState,
    pub(crate) rng: Rng,
}

impl Default for SegmentGenerator {
    fn default() -> Self {
        Self::new(0x517e_21e5)
    }
}

impl SegmentGenerator {
    /// Create a generator. The seed drives every randomized behavior (Turing
    /// registers, random sequencer steps, chaotic initial conditions), so two
    /// generators built from the same seed produce identical output.
    pub fn new(seed: u32) -> Self {
        let mut rng = Rng::new(seed);
        let mut segment = Segment::default();
        segment.shift_register = rng.next_u16();
        segment.register_value = rng.next_float();
        let chaos = ChaosState::new(rng.next_float(), rng.next_float(), rng.next_float());
        Self {
            mode: ProcessMode::MultiSegment,
            options: GeneratorOptions::default(),
            phase: 0.0,
            aux: 0.0,
            start: 0.0,
            value: 0.0,
            lp: 0.0,
            primary: 0.0,
            previous_segment: 0,
            active_segment: 0,
            monitored_segment: 0,
            retrig_delay: 0,
            num_segments: 0,
            segments: [segment; MAX_NUM_SEGMENTS + 1],
            parameters: [Parameters::default(); MAX_NUM_SEGMENTS],
            ramp_extractor: RampExtractor::new(MAX_FREQUENCY),
            reset_ramp_extractor: false,
            function_quantizer: HysteresisQuantizer::new(),
            delay_line: DelayLine::new(),
            gate_delay: DelayLine::new(),
            seq: SequencerState::default(),
            chaos,
            rng,
        }
    }

    pub fn set_options(&mut self, options: GeneratorOptions) {
        self.options = options;
    }

    #[inline]
    pub fn num_segments(&self) -> usize {
        self.num_segments
    }

    #[inline]
    pub fn mode(&self) -> ProcessMode {
        self.mode
    }

    /// Attenuverter-style modes scale their CV input by the pot; the CV
    /// reader needs to know.
    #[inline]
    pub fn needs_attenuation(&self) -> bool {
        matches!(
            self.mode,
            ProcessMode::AttenuverterOffset | ProcessMode::AttSampleAndHold
        )
    }

    /// Refresh one segment's parameters from a remote channel mirror.
    #[inline]
    pub fn set_segment_parameters(&mut self, index: usize, primary: f32, secondary: f32) {
        debug_assert!((-1.0..2.0).contains(&primary));
        debug_assert!((0.0..=1.0).contains(&secondary));
        self.parameters[index].primary = primary;
        self.parameters[index].secondary = secondary;
    }

    /// Refresh one segment's parameters from this module's own channels,
    /// which additionally carry the raw slider and CV for the modes that
    /// need them split apart.
    #[inline]
    pub fn set_local_segment_parameters(
        &mut self,
        index: usize,
        primary: f32,
        secondary: f32,
        slider: f32,
        cv: f32,
    ) {
        self.parameters[index].primary = primary;
        self.parameters[index].secondary = secondary;
        self.parameters[index].slider = slider;
        self.parameters[index].cv = cv;
    }

    // --- Configuration -----------------------------------------------------

    /// Configure as a single specialized segment.
    pub fn configure_single_segment(&mut self, has_trigger: bool, config: Configuration) {
        let index = (config.segment_type as usize) * 4
            + usize::from(has_trigger) * 2
            + usize::from(config.looped);
        let table = if self.options.advanced {
            &ADVANCED_TABLE
        } else {
            &BASIC_TABLE
        };
        let mode = table[index];
        if mode != self.mode || self.segments[0].range != config.range {
            self.reset_ramp_extractor = true;
        }
        self.mode = mode;
        self.segments[0].range = config.range;
        self.segments[0].bipolar = config.bipolar;
        self.segments[0].retrig =
            config.segment_type != SegmentType::Ramp || !config.bipolar;
        self.num_segments = 1;
    }

    /// Configure as a slave rendering segment `segment` of the group this
    /// channel belongs to.
    pub fn configure_slave(&mut self, segment: usize) {
        self.monitored_segment = segment as i32;
        self.mode = ProcessMode::Slave;
        self.num_segments = 0;
    }

    /// Configure from a group of segments. Dispatches to the single-segment,
    /// sequencer or multi-segment shape. `configs` must not be empty.
    pub fn configure(&mut self, has_trigger: bool, configs: &[Configuration]) {
        debug_assert!(!configs.is_empty());
        if configs.len() == 1 {
            self.configure_single_segment(has_trigger, configs[0]);
            return;
        }

        let sequencer_mode = configs[0].segment_type != SegmentType::Step
            && !configs[0].looped
            && configs.len() >= 3
            && configs[1..].iter().all(|c| c.is_step());
        if sequencer_mode {
            self.configure_sequencer(configs);
            return;
        }

        self.num_segments = configs.len();
        self.mode = ProcessMode::MultiSegment;

        // First pass: loop points, step segments, first ramp.
        let last_segment = configs.len() - 1;
        let mut loop_start = -1i32;
        let mut loop_end = -1i32;
        let mut has_step_segments = false;
        let mut first_ramp_segment = -1i32;
        for (i, c) in configs.iter().enumerate() {
            has_step_segments = has_step_segments || c.is_step();
            if c.looped {
                if loop_start == -1 {
                    loop_start = i as i32;
                }
                loop_end = i as i32;
            }
            if c.segment_type == SegmentType::Ramp && first_ramp_segment == -1 {
                first_ramp_segment = i as i32;
            }
        }

        let mut has_step_segments_inside_loop = false;
        if loop_start != -1 {
            for i in loop_start..=loop_end {
                if configs[i as usize].is_step() {
                    has_step_segments_inside_loop = true;
                    break;
                }
            }
        }

        for (i, config) in configs.iter().enumerate() {
            let s = &mut self.segments[i];
            s.bipolar = config.bipolar;
            s.retrig = true;
            s.advance_tm = false;
            match config.segment_type {
                SegmentType::Ramp => {
                    // A bipolar ramp ignores retriggers so slow loops survive
                    // stray edges.
                    s.retrig = !s.bipolar;
                    s.start = None;
                    s.time = Some(ParamSource::Primary(i));
                    s.curve = ParamSource::Secondary(i);
                    s.portamento = ParamSource::Constant(0.0);
                    s.phase = None;

                    if i == last_segment {
                        s.end = ParamSource::Constant(0.0);
                    } else if configs[i + 1].segment_type == SegmentType::Turing {
                        s.end = ParamSource::Register(i + 1);
                    } else if configs[i + 1].segment_type != SegmentType::Ramp {
                        s.end = ParamSource::Primary(i + 1);
                    } else if i as i32 == first_ramp_segment {
                        s.end = ParamSource::Constant(1.0);
                    } else {
                        // Ramp-to-ramp: the secondary doubles as the target
                        // level and the curve defaults to linear.
                        s.end = ParamSource::Secondary(i);
                        s.curve = ParamSource::Constant(0.5);
                    }
                }
                SegmentType::Step => {
                    s.start = Some(ParamSource::Primary(i));
                    s.end = ParamSource::Primary(i);
                    s.curve = ParamSource::Constant(0.5);
                    s.portamento = ParamSource::Secondary(i);
                    s.time = None;
                    // Sample on a self-loop of length 1, track otherwise.
                    s.phase = if i as i32 == loop_start && i as i32 == loop_end {
                        Some(ParamSource::Constant(0.0))
                    } else {
                        Some(ParamSource::Constant(1.0))
                    };
                }
                SegmentType::Turing => {
                    s.start = Some(ParamSource::Register(i));
                    s.end = ParamSource::Register(i);
                    s.curve = ParamSource::Constant(0.5);
                    s.advance_tm = true;
                    s.portamento = ParamSource::Constant(0.0);
                    s.time = None;
                    s.phase = Some(ParamSource::Constant(0.0));
                }
                SegmentType::Hold => {
                    s.start = Some(ParamSource::Primary(i));
                    s.end = ParamSource::Primary(i);
                    s.curve = ParamSource::Constant(0.5);
                    s.portamento = ParamSource::Constant(0.0);
                    // Hold forever on a self-loop of length 1, else use the
                    // programmed time.
                    s.time = if i as i32 == loop_start && i as i32 == loop_end {
                        None
                    } else {
                        Some(ParamSource::Secondary(i))
                    };
                    s.phase = Some(ParamSource::Constant(1.0));
                }
            }

            s.if_complete = if i as i32 == loop_end {
                loop_start as i8
            } else {
                (i + 1) as i8
            };
            s.if_falling = if loop_end == -1 || loop_end == last_segment as i32 || has_step_segments
            {
                -1
            } else {
                (loop_end + 1) as i8
            };
            s.if_rising = 0;

            if has_step_segments {
                if !has_step_segments_inside_loop
                    && (i as i32) >= loop_start
                    && (i as i32) <= loop_end
                {
                    s.if_rising = ((loop_end + 1) % configs.len() as i32) as i8;
                } else {
                    // Find the next step segment, following the loop once.
                    let mut follow_loop = loop_end != -1;
                    let mut next_step = i;
                    while !configs[next_step].is_step() {
                        next_step += 1;
                        if follow_loop && next_step as i32 == loop_end + 1 {
                            next_step = loop_start as usize;
                            follow_loop = false;
                        }
                        if next_step >= configs.len() {
                            next_step = configs.len() - 1;
                            break;
                        }
                    }
                    s.if_rising = if next_step as i32 == loop_end {
                        loop_start as i8
                    } else {
                        ((next_step + 1) % configs.len()) as i8
                    };
                }
            }
        }

        // The sentinel: a parking segment entered after reconfiguration,
        // holding the final level until an edge restarts the group.
        let end_source = self.segments[last_segment].end;
        let sentinel = &mut self.segments[configs.len()];
        sentinel.start = Some(end_source);
        sentinel.end = end_source;
        sentinel.time = Some(ParamSource::Constant(0.0));
        sentinel.curve = ParamSource::Constant(0.5);
        sentinel.portamento = ParamSource::Constant(0.0);
        sentinel.phase = None;
        sentinel.retrig = true;
        sentinel.advance_tm = false;
        sentinel.if_rising = 0;
        sentinel.if_falling = -1;
        sentinel.if_complete = if loop_end == last_segment as i32 { 0 } else { -1 };

        self.previous_segment = configs.len() as i32;
        self.active_segment = configs.len() as i32;
    }

    // --- Processing --------------------------------------------------------

    /// Render one block. `out` must be pre-filled by the caller with the
    /// progress of the left-hand neighbor (slave channels read it).
    ///
    /// Returns true while the first segment is active, which drives the
    /// slider LED.
    pub fn process(&mut self, gate_flags: &[GateFlags], out: &mut [Output]) -> bool {
        debug_assert_eq!(gate_flags.len(), out.len());
        match self.mode {
            ProcessMode::Zero => self.process_zero(out),
            ProcessMode::FreeRunningLfo => self.process_free_running_lfo(out),
            ProcessMode::DecayEnvelope => self.process_decay_envelope(gate_flags, out),
            ProcessMode::TapLfo => self.process_tap_lfo(gate_flags, out),
            ProcessMode::Portamento => self.process_portamento(out),
            ProcessMode::AttenuverterOffset => self.process_att_off(out),
            ProcessMode::SampleAndHold => self.process_sample_and_hold(gate_flags, out),
            ProcessMode::AttSampleAndHold => self.process_att_sample_and_hold(gate_flags, out),
            ProcessMode::Delay => self.process_delay(out),
            ProcessMode::TimedPulse => self.process_timed_pulse(gate_flags, out),
            ProcessMode::GateGenerator => self.process_gate_generator(gate_flags, out),
            ProcessMode::RiseAndFall => self.process_rise_and_fall(out),
            ProcessMode::Random => self.process_random(out),
            ProcessMode::DoubleScroll => self.process_double_scroll(out),
            ProcessMode::Thomas => self.process_thomas(out),
            ProcessMode::Turing => self.process_turing(gate_flags, out),
            ProcessMode::Logistic => self.process_logistic(gate_flags, out),
            ProcessMode::MultiSegment => self.process_multi_segment(gate_flags, out),
            ProcessMode::Sequencer => self.process_sequencer(gate_flags, out),
            ProcessMode::Slave => self.process_slave(out),
        }
        self.active_segment == 0
    }

    #[inline]
    pub(crate) fn source_value(&self, source: ParamSource) -> f32 {
        match source {
            ParamSource::Constant(v) => v,
            ParamSource::Primary(i) => self.parameters[i].primary,
            ParamSource::Secondary(i) => self.parameters[i].secondary,
            ParamSource::Register(i) => self.segments[i].register_value,
        }
    }

    /// Rational phase warp `(1+a)t / (1+at)` with `a = 128 (c-0.5)^2`,
    /// mirrored about 0.5 when the curve control is below center.
    pub fn warp_phase(t: f32, curve: f32) -> f32 {
        let curve = curve - 0.5;
        let flip = curve < 0.0;
        let mut t = if flip { 1.0 - t } else { t };
        let a = 128.0 * curve * curve;
        t = (1.0 + a) * t / (1.0 + a * t);
        if flip {
            1.0 - t
        } else {
            t
        }
    }

    fn process_multi_segment(&mut self, gate_flags: &[GateFlags], out: &mut [Output]) {
        let mut phase = self.phase;
        let mut start = self.start;
        let mut lp = self.lp;
        let mut value = self.value;

        for (gate, o) in gate_flags.iter().zip(out.iter_mut()) {
            let segment = self.segments[self.active_segment as usize];
            let previous = self.segments[self.previous_segment as usize];

            // A segment without an explicit start keeps chasing what the
            // previous (trackable) segment would have output, so cutting a
            // slewed step short does not cause a jump.
            if segment.start.is_none() && previous.phase.is_some() && segment.end != previous.end {
                one_pole(
                    &mut start,
                    self.source_value(previous.end),
                    portamento_to_coefficient(self.source_value(previous.portamento)),
                );
            }

            if let Some(time) = segment.time {
                phase += rate_to_frequency(self.source_value(time));
            }
            let complete = phase >= 1.0;
            if complete {
                phase = 1.0;
            }

            let t = match segment.phase {
                Some(p) => self.source_value(p),
                None => phase,
            };
            value = crossfade(
                start,
                self.source_value(segment.end),
                Self::warp_phase(t, self.source_value(segment.curve)),
            );
            one_pole(
                &mut lp,
                value,
                portamento_to_coefficient(self.source_value(segment.portamento)),
            );

            // Decide what to do next.
            let go_to_segment = if gate.is_rising() && segment.retrig {
                segment.if_rising as i32
            } else if gate.is_falling() {
                segment.if_falling as i32
            } else if complete {
                segment.if_complete as i32
            } else {
                -1
            };

            if go_to_segment != -1 {
                if segment.advance_tm {
                    let active = self.active_segment as usize;
                    let steps_param = self.parameters[active].secondary;
                    let prob_param = self.parameters[active].primary;
                    let random = self.rng.next_float();
                    let s = &mut self.segments[active];
                    s.register_value = advance_turing(
                        steps_param,
                        prob_param,
                        &mut s.shift_register,
                        s.bipolar,
                        random,
                    );
                }
                phase = 0.0;
                let destination = self.segments[go_to_segment as usize];
                start = match destination.start {
                    Some(s) => self.source_value(s),
                    None => {
                        if go_to_segment == self.active_segment {
                            start
                        } else {
                            lp
                        }
                    }
                };
                if go_to_segment != self.active_segment {
                    self.previous_segment = self.active_segment;
                }
                self.active_segment = go_to_segment;
            }

            o.value = lp;
            o.phase = phase;
            o.segment = self.active_segment;
        }

        self.phase = phase;
        self.start = start;
        self.lp = lp;
        self.value = value;
    }

    fn process_zero(&mut self, out: &mut [Output]) {
        self.value = 0.0;
        self.active_segment = 1;
        for o in out.iter_mut() {
            o.value = 0.0;
            o.phase = 0.5;
            o.segment = 1;
        }
    }

    fn process_decay_envelope(&mut self, gate_flags: &[GateFlags], out: &mut [Output]) {
        let frequency = rate_to_frequency(self.parameters[0].primary);
        for (gate, o) in gate_flags.iter().zip(out.iter_mut()) {
            if gate.is_rising() && (self.active_segment != 0 || self.segments[0].retrig) {
                self.phase = 0.0;
                self.active_segment = 0;
            }
            self.phase += frequency;
            if self.phase >= 1.0 {
                self.phase = 1.0;
                self.active_segment = 1;
            }
            self.value = 1.0 - Self::warp_phase(self.phase, self.parameters[0].secondary);
            self.lp = self.value;
            o.value = self.lp;
            o.phase = self.phase;
            o.segment = self.active_segment;
        }
    }

    fn process_timed_pulse(&mut self, gate_flags: &[GateFlags], out: &mut [Output]) {
        let frequency = rate_to_frequency(self.parameters[0].secondary);
        let mut primary =
            ParameterInterpolator::new(&mut self.primary, self.parameters[0].primary, out.len());
        for (gate, o) in gate_flags.iter().zip(out.iter_mut()) {
            if gate.is_rising() && (self.active_segment != 0 || self.segments[0].retrig) {
                self.retrig_delay = if self.active_segment == 0 {
                    RETRIG_DELAY_SAMPLES
                } else {
                    0
                };
                self.phase = 0.0;
                self.active_segment = 0;
            }
            if self.retrig_delay > 0 {
                self.retrig_delay -= 1;
            }
            self.phase += frequency;
            if self.phase >= 1.0 {
                self.phase = 1.0;
                self.active_segment = 1;
            }
            let p = primary.next();
            self.value = if self.active_segment == 0 && self.retrig_delay == 0 {
                p
            } else {
                0.0
            };
            self.lp = self.value;
            o.value = self.lp;
            o.phase = self.phase;
            o.segment = self.active_segment;
        }
    }

    fn process_gate_generator(&mut self, gate_flags: &[GateFlags], out: &mut [Output]) {
        let mut primary =
            ParameterInterpolator::new(&mut self.primary, self.parameters[0].primary, out.len());
        for (gate, o) in gate_flags.iter().zip(out.iter_mut()) {
            if gate.is_rising() {
                self.active_segment = if self.rng.next_float() < self.parameters[0].secondary {
                    0
                } else {
                    1
                };
            }
            self.active_segment = if gate.is_high() && self.active_segment == 0 {
                0
            } else {
                1
            };
            let p = primary.next();
            self.value = if self.active_segment == 0 { p } else { 0.0 };
            self.lp = self.value;
            o.value = self.lp;
            o.phase = 0.5;
            o.segment = self.active_segment;
        }
    }

    fn process_sample_and_hold(&mut self, gate_flags: &[GateFlags], out: &mut [Output]) {
        let coefficient = portamento_to_coefficient(self.parameters[0].secondary);
        let mut primary =
            ParameterInterpolator::new(&mut self.primary, self.parameters[0].primary, out.len());
        for (gate, o) in gate_flags.iter().zip(out.iter_mut()) {
            let p = primary.next();
            self.gate_delay.write(*gate);
            if self.gate_delay.read(SAMPLE_AND_HOLD_DELAY).is_rising() {
                self.value = p;
            }
            self.active_segment = if gate.is_high() { 0 } else { 1 };
            one_pole(&mut self.lp, self.value, coefficient);
            o.value = self.lp;
            o.phase = 0.5;
            o.segment = self.active_segment;
        }
    }

    fn process_att_sample_and_hold(&mut self, gate_flags: &[GateFlags], out: &mut [Output]) {
        let mut primary =
            ParameterInterpolator::new(&mut self.primary, self.parameters[0].primary, out.len());
        for (gate, o) in gate_flags.iter().zip(out.iter_mut()) {
            let p = primary.next();
            self.gate_delay.write(*gate);
            if self.gate_delay.read(SAMPLE_AND_HOLD_DELAY).is_rising() {
                self.value = p;
            }
            self.active_segment = if gate.is_high() { 0 } else { 1 };
            self.lp = self.value;
            o.value = self.value;
            o.phase = 0.5;
            o.segment = self.active_segment;
        }
    }

    fn process_tap_lfo(&mut self, gate_flags: &[GateFlags], out: &mut [Output]) {
        let control = self.parameters[0].primary * 1.03;
        let ratio = match self.segments[0].range {
            FreqRange::Default => *self.function_quantizer.lookup(&DIVIDER_RATIOS, control),
            FreqRange::Slow => *self.function_quantizer.lookup(&DIVIDER_RATIOS_SLOW, control),
            FreqRange::Fast => *self.function_quantizer.lookup(&DIVIDER_RATIOS_FAST, control),
        };
        if self.reset_ramp_extractor {
            self.ramp_extractor.reset();
            self.reset_ramp_extractor = false;
        }
        let mut ramp = [0.0f32; 32];
        let size = out.len().min(32);
        self.ramp_extractor
            .process(ratio, &gate_flags[..size], &mut ramp[..size]);
        for (o, phase) in out.iter_mut().zip(ramp.iter()) {
            o.phase = *phase;
        }
        shape_lfo(self.parameters[0].secondary, out, self.segments[0].bipolar);
        self.active_segment = out[out.len() - 1].segment;
    }

    /// Base frequency shared by the oscillating modes: ±48 semitones around
    /// a period of about half a second.
    fn base_lfo_frequency(&self) -> f32 {
        let f = (96.0 * (self.parameters[0].primary - 0.5)).clamp(-128.0, 127.0);
        semitones_to_ratio(f) * 2.043_949_7 / SAMPLE_RATE
    }

    fn process_free_running_lfo(&mut self, out: &mut [Output]) {
        let mut frequency = self.base_lfo_frequency();
        self.active_segment = 0;
        match self.segments[0].range {
            FreqRange::Slow => frequency /= 16.0,
            FreqRange::Fast => frequency *= 64.0,
            FreqRange::Default => {}
        }
        if self.options.slow_lfo {
            frequency /= 8.0;
        }
        frequency = frequency.clamp(0.0, MAX_FREQUENCY);

        for o in out.iter_mut() {
            self.phase += frequency;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
            o.phase = self.phase;
        }
        shape_lfo(self.parameters[0].secondary, out, self.segments[0].bipolar);
        self.active_segment = out[out.len() - 1].segment;
    }

    fn process_delay(&mut self, out: &mut [Output]) {
        let max_delay = (MAX_DELAY - 1) as f32;
        let mut delay_time = semitones_to_ratio(2.0 * (self.parameters[0].secondary - 0.5) * 36.0)
            * 0.5
            * SAMPLE_RATE;
        let mut clock_frequency = 1.0;
        let delay_frequency = 1.0 / delay_time;
        if delay_time >= max_delay {
            // Longer than the buffer: clock the write head slower so the
            // effective delay still matches the requested time.
            clock_frequency = max_delay * delay_frequency;
            delay_time = max_delay;
        }
        let mut primary =
            ParameterInterpolator::new(&mut self.primary, self.parameters[0].primary, out.len());

        self.active_segment = 0;
        for o in out.iter_mut() {
            self.phase += clock_frequency;
            let p = primary.next();
            one_pole(&mut self.lp, p, clock_frequency);
            if self.phase >= 1.0 {
                self.phase -= 1.0;
                self.delay_line.write(self.lp);
            }

            self.aux += delay_frequency;
            if self.aux >= 1.0 {
                self.aux -= 1.0;
            }
            self.active_segment = if self.aux < 0.5 { 0 } else { 1 };

            let read = self.delay_line.read_fractional(delay_time - self.phase);
            one_pole(&mut self.value, read, clock_frequency);
            o.value = self.value;
            o.phase = self.aux;
            o.segment = self.active_segment;
        }
    }

    fn process_att_off(&mut self, out: &mut [Output]) {
        let mut primary =
            ParameterInterpolator::new(&mut self.primary, self.parameters[0].primary, out.len());
        self.active_segment = 0;
        for o in out.iter_mut() {
            self.value = primary.next();
            self.lp = self.value;
            o.value = self.value;
            o.phase = 0.5;
            o.segment = 0;
        }
    }

    fn process_portamento(&mut self, out: &mut [Output]) {
        let coefficient = portamento_to_coefficient(self.parameters[0].secondary);
        let mut primary =
            ParameterInterpolator::new(&mut self.primary, self.parameters[0].primary, out.len());
        self.active_segment = 0;
        for o in out.iter_mut() {
            self.value = primary.next();
            one_pole(&mut self.lp, self.value, coefficient);
            o.value = self.lp;
            o.phase = 0.5;
            o.segment = 0;
        }
    }

    fn process_rise_and_fall(&mut self, out: &mut [Output]) {
        let fall = portamento_to_coefficient(self.parameters[0].slider);
        let rise = portamento_to_coefficient(self.parameters[0].secondary);
        let mut primary =
            ParameterInterpolator::new(&mut self.primary, self.parameters[0].cv, out.len());
        for o in out.iter_mut() {
            let p = primary.next();
            self.value = if self.segments[0].bipolar { p } else { p.abs() };
            if self.value > self.lp {
                one_pole(&mut self.lp, self.value, rise);
                self.phase = 0.0;
            } else {
                one_pole(&mut self.lp, self.value, fall);
                self.phase = 1.0;
            }
            self.active_segment = if self.lp.abs() > 0.1 { 0 } else { 1 };
            o.value = self.lp;
            o.phase = self.phase;
            o.segment = self.active_segment;
        }
    }

    fn process_random(&mut self, out: &mut [Output]) {
        let coefficient = portamento_to_coefficient(self.parameters[0].secondary);
        let frequency = self.base_lfo_frequency().clamp(0.0, MAX_FREQUENCY);
        self.active_segment = 0;
        for o in out.iter_mut() {
            self.phase += frequency;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
                self.value = self.rng.next_float();
                if self.segments[0].bipolar {
                    self.value = 10.0 / 8.0 * (self.value - 0.5);
                }
            }
            one_pole(&mut self.lp, self.value, coefficient);
            self.active_segment = if self.phase < 0.5 { 0 } else { 1 };
            o.value = self.lp;
            o.phase = self.phase;
            o.segment = self.active_segment;
        }
    }

    fn process_double_scroll(&mut self, out: &mut [Output]) {
        let mut frequency = self.base_lfo_frequency() * 1.4;
        match self.segments[0].range {
            FreqRange::Slow => frequency /= 16.0,
            // A full multiplier would blow up the Euler step.
            FreqRange::Fast => frequency *= 8.0,
            FreqRange::Default => {}
        }
        let frequency = frequency.clamp(0.0, 0.01);

        let b = 5.0 * self.parameters[0].secondary + 1.0;
        let bipolar = self.segments[0].bipolar;
        let offset = if bipolar { -0.5 } else { 0.0 };
        let amplitude = if bipolar { 10.0 / 8.0 } else { 1.0 };

        for o in out.iter_mut() {
            double_scroll_step(&mut self.chaos, b, frequency);
            let output = ((self.chaos.x + 18.0) / 36.0).clamp(0.0, 1.0);
            self.value = amplitude * output + offset;
            self.lp = self.value;
            self.active_segment = if output > 0.5 { 1 } else { 0 };
            o.value = self.value;
            o.phase = output;
            o.segment = self.active_segment;
        }
    }

    fn process_thomas(&mut self, out: &mut [Output]) {
        let mut frequency = self.base_lfo_frequency();
        match self.segments[0].range {
            FreqRange::Slow => frequency /= 16.0,
            FreqRange::Fast => frequency *= 64.0,
            FreqRange::Default => {}
        }
        // The flow itself is slow; rescaled to feel like the LFO ranges.
        let frequency = frequency.clamp(0.0, MAX_FREQUENCY) * 32.0;

        let b = 0.199 * self.parameters[0].secondary + 0.001;
        let bipolar = self.segments[0].bipolar;
        let offset = if bipolar { 0.0 } else { 1.0 };
        let amplitude = if bipolar { 10.0 / 16.0 } else { 0.5 };

        self.active_segment = 0;
        for o in out.iter_mut() {
            thomas_step(&mut self.chaos, b, frequency);
            self.value = amplitude * (offset + squash(self.chaos.x));
            self.lp = self.value;
            o.value = self.value;
            o.phase = 0.5;
            o.segment = 0;
        }
    }

    fn process_turing(&mut self, gate_flags: &[GateFlags], out: &mut [Output]) {
        let steps_param = self.parameters[0].secondary;
        let mut primary =
            ParameterInterpolator::new(&mut self.primary, self.parameters[0].primary, out.len());
        for (gate, o) in gate_flags.iter().zip(out.iter_mut()) {
            let prob_param = primary.next();
            if gate.is_rising() {
                let random = self.rng.next_float();
                let s = &mut self.segments[0];
                s.register_value =
                    advance_turing(steps_param, prob_param, &mut s.shift_register, s.bipolar, random);
                self.value = s.register_value;
            }
            self.active_segment = if gate.is_high() { 0 } else { 1 };
            o.value = self.segments[0].register_value;
            o.phase = 0.5;
            o.segment = self.active_segment;
        }
    }

    fn process_logistic(&mut self, gate_flags: &[GateFlags], out: &mut [Output]) {
        let coefficient = portamento_to_coefficient(self.parameters[0].secondary);
        let r = 0.5 * self.parameters[0].primary + 3.5;
        if self.value <= 0.0 {
            self.value = self.rng.next_float();
        }
        for (gate, o) in gate_flags.iter().zip(out.iter_mut()) {
            if gate.is_rising() {
                self.value *= r * (1.0 - self.value);
            }
            self.active_segment = if gate.is_high() { 0 } else { 1 };
            one_pole(&mut self.lp, self.value, coefficient);
            o.value = if self.segments[0].bipolar {
                10.0 / 8.0 * (self.lp - 0.5)
            } else {
                self.lp
            };
            o.phase = 0.5;
            o.segment = self.active_segment;
        }
    }

    fn process_slave(&mut self, out: &mut [Output]) {
        for o in out.iter_mut() {
            self.active_segment = if o.segment == self.monitored_segment {
                0
            } else {
                1
            };
            o.value = if self.active_segment == 0 {
                1.0 - o.phase
            } else {
                0.0
            };
        }
    }
}
