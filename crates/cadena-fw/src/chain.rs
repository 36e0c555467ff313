//! Chain state machine.
//!
//! Up to six adjacent modules cooperate as one instrument over their
//! left/right serial links. Each module:
//!
//! - discovers its position and the chain size at startup,
//! - mirrors every channel's state (one [`ChannelStateWire`] per channel in
//!   the chain), refreshed by a round-robin of leftward transmissions,
//! - derives its six generators' configurations from the patched/unpatched
//!   pattern ([`ChainState::configure`], the segment-linking policy),
//! - forwards switch presses rightward and edit requests leftward.
//!
//! The update runs one of four phases per block (~250 us each, so a full
//! chain cycle per millisecond):
//!
//! | Phase | Action |
//! |-------|--------|
//! | 0 | poll switches (last module only), refresh local flags, transmit right |
//! | 1 | receive right, apply any pending request |
//! | 2 | refresh local pot/CV/slider mirrors, transmit left |
//! | 3 | receive left, rebuild segment linkage, bind remote parameters |
//!
//! Between updates every output sample is pre-filled with the last sample
//! reported by the left neighbor, which keeps slave channels continuous
//! across the (slow) chain cycle.

use crate::io_buffer::Block;
use crate::link::SerialLink;
use crate::packet::{
    decode_leftward, ChannelStateWire, DiscoveryPacket, LeftToRightPacket, LeftwardMessage, Loop,
    RequestPacket, Request, RightToLeftPacket, MAX_CHAIN_SIZE, REINIT_COUNTER, REINIT_KEY,
};
use cadena_dsp::{NoteQuantizer, BLOCK_SIZE, SCALES};
use cadena_gen::{Configuration, FreqRange, GeneratorOptions, Output, SegmentGenerator};
use cadena_settings::{ConfigWord, MultiMode, Settings, NUM_CHANNELS};

/// Channels across a full chain.
pub const MAX_NUM_CHANNELS: usize = MAX_CHAIN_SIZE * NUM_CHANNELS;

/// Blocks an input must stay unpatched before the chain re-links (~64 ms).
const UNPATCHED_INPUT_DELAY: u16 = 2000;

/// Press durations, in 1 ms chain cycles.
const LONG_PRESS_DURATION: i16 = 500;
const MULTIMODE_PRESS_DURATION: i16 = 5000;

/// Discovery keys, one pair per mode family so mismatched modes don't bind.
const BASIC_LEFT_KEY: u32 = u32::from_le_bytes(*b"cdbl");
const BASIC_RIGHT_KEY: u32 = u32::from_le_bytes(*b"cdbr");
const ADVANCED_LEFT_KEY: u32 = u32::from_le_bytes(*b"cdal");
const ADVANCED_RIGHT_KEY: u32 = u32::from_le_bytes(*b"cdar");

/// Lifecycle of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    /// Broadcasting the reinit wave before re-running discovery.
    Reinitializing,
    /// Pinging neighbors to learn position and size.
    Discovering,
    /// Normal operation.
    Ready,
}

/// UI-facing refinement of a channel's loop bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopStatus {
    #[default]
    None,
    Start,
    End,
    SelfLoop,
}

/// One parameter route: segment `destination` of generator `generator` reads
/// from channel `source` (local index for internal bindings, absolute for
/// remote ones).
#[derive(Debug, Clone, Copy, Default)]
struct ParameterBinding {
    generator: usize,
    source: usize,
    destination: usize,
}

/// The distributed chain state of one module.
pub struct ChainState {
    index: usize,
    size: usize,

    left_key: u32,
    right_key: u32,

    channel_state: [ChannelStateWire; MAX_NUM_CHANNELS],
    last_local_config: [u16; NUM_CHANNELS],
    dirty: [bool; MAX_NUM_CHANNELS],

    switch_press_time: [i16; MAX_NUM_CHANNELS],
    unpatch_counter: [u16; NUM_CHANNELS],
    loop_status: [LoopStatus; NUM_CHANNELS],
    /// Channels whose generator wants its CV scaled by the pot.
    attenuate: u8,

    switch_pressed: [u8; MAX_CHAIN_SIZE],
    input_patched: [u8; MAX_CHAIN_SIZE],

    rx_last_patched_channel: usize,
    tx_last_patched_channel: usize,
    rx_last_loop: Loop,
    tx_last_loop: Loop,
    rx_last_sample: Output,
    tx_last_sample: Output,

    request: RequestPacket,

    status: ChainStatus,
    counter: u32,

    num_internal_bindings: usize,
    num_bindings: usize,
    bindings: [ParameterBinding; MAX_NUM_CHANNELS],

    quantizers: [NoteQuantizer; NUM_CHANNELS],
}

impl ChainState {
    pub fn new(settings: &Settings) -> Self {
        let mut state = Self {
            index: 0,
            size: 1,
            left_key: BASIC_LEFT_KEY,
            right_key: BASIC_RIGHT_KEY,
            channel_state: [ChannelStateWire::default(); MAX_NUM_CHANNELS],
            last_local_config: [0; NUM_CHANNELS],
            dirty: [false; MAX_NUM_CHANNELS],
            switch_press_time: [0; MAX_NUM_CHANNELS],
            unpatch_counter: [0; NUM_CHANNELS],
            loop_status: [LoopStatus::None; NUM_CHANNELS],
            attenuate: 0,
            switch_pressed: [0; MAX_CHAIN_SIZE],
            input_patched: [0; MAX_CHAIN_SIZE],
            rx_last_patched_channel: MAX_NUM_CHANNELS,
            tx_last_patched_channel: MAX_NUM_CHANNELS,
            rx_last_loop: Loop::default(),
            tx_last_loop: Loop::default(),
            rx_last_sample: Output::default(),
            tx_last_sample: Output::default(),
            request: RequestPacket::default(),
            status: ChainStatus::Discovering,
            counter: 0,
            num_internal_bindings: 0,
            num_bindings: 0,
            bindings: [ParameterBinding::default(); MAX_NUM_CHANNELS],
            quantizers: [NoteQuantizer::new(); NUM_CHANNELS],
        };
        state.reinit(settings);
        state
    }

    /// Reset to the pre-discovery state.
    fn reinit(&mut self, settings: &Settings) {
        self.index = 0;
        self.size = 1;
        self.channel_state = [ChannelStateWire::default(); MAX_NUM_CHANNELS];
        self.last_local_config = [0; NUM_CHANNELS];
        self.unpatch_counter = [0; NUM_CHANNELS];
        self.loop_status = [LoopStatus::None; NUM_CHANNELS];
        self.switch_pressed = [0; MAX_CHAIN_SIZE];
        self.switch_press_time = [0; MAX_NUM_CHANNELS];
        self.request = RequestPacket::default();
        self.status = ChainStatus::Discovering;
        self.counter = 0;
        self.num_internal_bindings = 0;
        self.num_bindings = 0;

        match settings.multimode() {
            MultiMode::Segments => {
                self.left_key = BASIC_LEFT_KEY;
                self.right_key = BASIC_RIGHT_KEY;
            }
            MultiMode::Advanced | MultiMode::SlowLfo => {
                self.left_key = ADVANCED_LEFT_KEY;
                self.right_key = ADVANCED_RIGHT_KEY;
            }
            // The other modes don't chain.
            _ => self.status = ChainStatus::Ready,
        }

        for q in self.quantizers.iter_mut() {
            q.configure(SCALES[0]);
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn status(&self) -> ChainStatus {
        self.status
    }

    #[inline]
    pub fn loop_status(&self, channel: usize) -> LoopStatus {
        self.loop_status[channel]
    }

    #[inline]
    pub fn local_channel(&self, channel: usize) -> &ChannelStateWire {
        &self.channel_state[self.local_channel_index(channel)]
    }

    /// Read any channel record of the chain mirror, by absolute index.
    /// Records of modules to the left are never refreshed; only the
    /// aggregates of the left-to-right packet flow that way.
    #[inline]
    pub fn channel_state(&self, channel: usize) -> &ChannelStateWire {
        &self.channel_state[channel]
    }

    /// Report this module's pressed switches (one bit per channel).
    #[inline]
    pub fn set_local_switch_pressed(&mut self, bitmask: u8) {
        self.switch_pressed[self.index] = bitmask;
    }

    /// Report "switches are busy editing local properties": the rightmost
    /// module suspends chain-level switch handling for this module.
    pub fn suspend_switches(&mut self) {
        self.set_local_switch_pressed(0xff);
    }

    /// Begin broadcasting a reinit wave (entered on multimode change or on a
    /// received reinit packet).
    pub fn start_reinit(&mut self) {
        self.counter = 0;
        self.status = ChainStatus::Reinitializing;
        self.request = RequestPacket::default();
    }

    #[inline]
    fn local_channel_index(&self, channel: usize) -> usize {
        self.index * NUM_CHANNELS + channel
    }

    #[inline]
    fn remote_channel_index(module: usize, channel: usize) -> usize {
        module * NUM_CHANNELS + channel
    }

    fn set_loop_status(&mut self, channel: usize, segment: i32, lp: Loop) {
        self.loop_status[channel] = if segment == i32::from(lp.start) {
            if segment == i32::from(lp.end) {
                LoopStatus::SelfLoop
            } else {
                LoopStatus::Start
            }
        } else if segment == i32::from(lp.end) {
            LoopStatus::End
        } else {
            LoopStatus::None
        };
    }

    // --- Per-block update --------------------------------------------------

    /// Run one block's worth of chain work and pre-fill `out` with the left
    /// neighbor's progress.
    pub fn update(
        &mut self,
        left: &mut dyn SerialLink,
        right: &mut dyn SerialLink,
        block: &Block,
        settings: &mut Settings,
        generators: &mut [SegmentGenerator; NUM_CHANNELS],
        out: &mut [Output; BLOCK_SIZE],
    ) {
        match self.status {
            ChainStatus::Discovering => {
                self.discover_neighbors(left, right);
                return;
            }
            ChainStatus::Reinitializing => {
                self.broadcast_reinit(left, right, settings);
                return;
            }
            ChainStatus::Ready => {}
        }

        match self.counter & 0x3 {
            0 => {
                self.poll_switches();
                self.update_local_state(block, settings, out[BLOCK_SIZE - 1]);
                self.transmit_right(right);
            }
            1 => {
                self.receive_right(right);
                self.handle_request(settings);
            }
            2 => {
                self.update_local_pot_cv_slider(block, settings);
                self.transmit_left(left);
                // The request has been applied locally and forwarded; done
                // with it.
                self.request = RequestPacket::default();
            }
            _ => {
                self.receive_left(left);
                self.configure(generators, settings);
                self.bind_remote_parameters(generators);
            }
        }

        self.bind_local_parameters(block, generators, settings);
        out.fill(self.rx_last_sample);

        self.counter += 1;
    }

    // --- Discovery and reinit ---------------------------------------------

    fn discover_neighbors(&mut self, left: &mut dyn SerialLink, right: &mut dyn SerialLink) {
        // Between t = 500 ms and 1500 ms, ping the neighbors every 50 ms.
        if (2000..=6000).contains(&self.counter) && self.counter % 200 == 0 {
            left.transmit(
                &DiscoveryPacket {
                    key: self.left_key,
                    counter: self.size as u8,
                }
                .encode(),
            );
            right.transmit(
                &DiscoveryPacket {
                    key: self.right_key,
                    counter: self.index as u8,
                }
                .encode(),
            );
        }

        if let Some(frame) = left.receive() {
            let p = DiscoveryPacket::decode(&frame);
            if p.key == self.right_key {
                self.index = usize::from(p.counter) + 1;
                self.size = self.size.max(self.index + 1);
            }
        }
        if let Some(frame) = right.receive() {
            let p = DiscoveryPacket::decode(&frame);
            if p.key == self.left_key {
                self.size = self.size.max(usize::from(p.counter));
            }
        }

        if self.index >= MAX_CHAIN_SIZE || self.size > MAX_CHAIN_SIZE {
            // The chain loops back on itself; demote to a solo module.
            log::warn!("chain miswire detected, running solo");
            self.index = 0;
            self.size = 1;
            self.status = ChainStatus::Ready;
            self.counter = 0;
        } else if self.counter < 8000 {
            self.counter += 1;
        } else {
            log::debug!("chain ready: module {} of {}", self.index, self.size);
            self.status = ChainStatus::Ready;
            self.counter = 0;
        }
    }

    fn broadcast_reinit(
        &mut self,
        left: &mut dyn SerialLink,
        right: &mut dyn SerialLink,
        settings: &Settings,
    ) {
        if self.counter % 200 == 0 {
            let frame = DiscoveryPacket {
                key: REINIT_KEY,
                counter: REINIT_COUNTER,
            }
            .encode();
            left.transmit(&frame);
            right.transmit(&frame);
        } else if self.counter >= 2000 {
            self.reinit(settings);
            return;
        }
        self.counter += 1;
    }

    // --- Phase 0: local flags + rightward transmission ---------------------

    fn update_local_state(&mut self, block: &Block, settings: &Settings, last_out: Output) {
        self.tx_last_sample = last_out;

        let mut input_patched_bitmask = 0u8;
        for i in 0..NUM_CHANNELS {
            if block.input_patched[i] {
                self.unpatch_counter[i] = 0;
            } else if self.unpatch_counter[i] < UNPATCHED_INPUT_DELAY {
                self.unpatch_counter[i] += 1;
            }
            let input_patched = self.unpatch_counter[i] < UNPATCHED_INPUT_DELAY;

            let config = settings.state().segment_configuration[i];
            let channel = self.local_channel_index(i);
            let flags_dirty =
                self.channel_state[channel].update_flags(self.index, config, input_patched);
            // Properties that are not transmitted still require a reconfigure.
            self.dirty[channel] = flags_dirty || config != self.last_local_config[i];
            if self.dirty[channel]
                && (config >> 12 & 0x3) != (self.last_local_config[i] >> 12 & 0x3)
            {
                self.quantizers[i].configure(SCALES[(config >> 12 & 0x3) as usize]);
            }
            self.last_local_config[i] = config;
            if input_patched {
                input_patched_bitmask |= 1 << i;
            }
        }
        self.input_patched[self.index] = input_patched_bitmask;
    }

    fn transmit_right(&mut self, right: &mut dyn SerialLink) {
        if self.index == self.size - 1 {
            return;
        }
        let mut packet = LeftToRightPacket {
            last_patched_channel: self.tx_last_patched_channel as u8,
            segment: self.tx_last_sample.segment as i8,
            phase: self.tx_last_sample.phase,
            last_loop: self.tx_last_loop,
            switch_pressed: [0; MAX_CHAIN_SIZE],
            input_patched: [0; MAX_CHAIN_SIZE],
        };
        packet.switch_pressed[..=self.index].copy_from_slice(&self.switch_pressed[..=self.index]);
        packet.input_patched[..=self.index].copy_from_slice(&self.input_patched[..=self.index]);
        right.transmit(&packet.encode());
    }

    // --- Phase 1: rightward reception + request handling -------------------

    fn receive_right(&mut self, right: &mut dyn SerialLink) {
        let Some(frame) = right.receive() else {
            return;
        };
        match decode_leftward(&frame) {
            LeftwardMessage::Reinit => self.start_reinit(),
            _ if self.index == self.size - 1 => {}
            LeftwardMessage::Channels(packet) => {
                let rx_index = packet.channels[0].index();
                if rx_index > self.index && rx_index < self.size {
                    // Fresh mirror of a module to the right; note which
                    // channels changed settings.
                    for (i, channel) in packet.channels.iter().enumerate() {
                        let mirror = Self::remote_channel_index(rx_index, i);
                        self.dirty[mirror] = self.channel_state[mirror].flags != channel.flags;
                        self.channel_state[mirror] = *channel;
                    }
                    self.request = RequestPacket::default();
                }
            }
            LeftwardMessage::Request(request) => {
                self.request = request;
            }
        }
    }

    fn handle_request(&mut self, settings: &mut Settings) {
        if self.request.request == Request::None {
            return;
        }
        let num_types: u16 = if settings.multimode() == MultiMode::Advanced {
            4
        } else {
            3
        };
        let arguments = self.request.arguments;
        let request = self.request.request;

        for i in 0..NUM_CHANNELS {
            let channel = self.local_channel_index(i) as u8;
            match request {
                Request::SetSegmentType => {
                    if channel == arguments[0] {
                        settings
                            .mutable_state()
                            .update_word(i, |w| w.cycle_type(num_types));
                    }
                }
                Request::SetLoop => {
                    let word = settings.state().word(i);
                    let old_loop = word.looped();
                    let mut new_loop = old_loop;
                    if channel >= arguments[0] && channel < arguments[3] {
                        new_loop = false;
                    }
                    if channel == arguments[1] || channel == arguments[2] {
                        new_loop = if arguments[1] == arguments[2] {
                            !old_loop
                        } else {
                            true
                        };
                    }
                    settings.mutable_state().update_word(i, |w| {
                        w.set_loop(new_loop);
                        // A fresh self-loop on a free-running channel starts
                        // from the default LFO range.
                        if new_loop != old_loop && arguments[0] == arguments[3] {
                            w.clear_range_bits();
                        }
                    });
                }
                Request::None => {}
            }
        }
    }

    // --- Phase 2: control mirrors + leftward transmission ------------------

    fn update_local_pot_cv_slider(&mut self, block: &Block, settings: &Settings) {
        for i in 0..NUM_CHANNELS {
            let word = settings.state().word(i);
            let value = self.shaped_cv_slider(block, i, word);
            let channel = self.local_channel_index(i);
            self.channel_state[channel].cv_slider = ChannelStateWire::pack_cv_slider(value);
            self.channel_state[channel].pot = ChannelStateWire::pack_pot(block.pot[i]);
        }
    }

    fn transmit_left(&mut self, left: &mut dyn SerialLink) {
        if self.index == 0 {
            return;
        }
        if self.request.request != Request::None {
            left.transmit(&self.request.encode());
            return;
        }

        // Find the nearest module, at or right of this one, that contains a
        // patched channel (the run of unpatched channels ends there); the
        // round-robin below covers [index, last] so every record of the run
        // reaches the leftmost patched module within O(size) cycles.
        let mut last = self.size - 1;
        'search: for module in self.index..self.size {
            for channel in 0..NUM_CHANNELS {
                if self.channel_state[Self::remote_channel_index(module, channel)].input_patched()
                {
                    last = module;
                    break 'search;
                }
            }
        }

        let tx_index =
            self.index + ((self.counter >> 2) as usize % (last - self.index + 1));
        let mut packet = RightToLeftPacket {
            channels: [ChannelStateWire::default(); NUM_CHANNELS],
        };
        let base = Self::remote_channel_index(tx_index, 0);
        packet
            .channels
            .copy_from_slice(&self.channel_state[base..base + NUM_CHANNELS]);
        left.transmit(&packet.encode());
    }

    // --- Phase 3: leftward reception + reconfiguration ---------------------

    fn receive_left(&mut self, left: &mut dyn SerialLink) {
        let frame = left.receive();
        if let Some(frame) = &frame {
            if DiscoveryPacket::is_reinit(frame) {
                self.start_reinit();
                return;
            }
        }
        if self.index == 0 {
            // Nothing to our left: no patched channel can precede ours.
            self.rx_last_patched_channel = self.size * NUM_CHANNELS;
            self.rx_last_loop = Loop::default();
            return;
        }
        let Some(frame) = frame else {
            return;
        };
        let packet = LeftToRightPacket::decode(&frame);
        self.rx_last_patched_channel = usize::from(packet.last_patched_channel);
        self.rx_last_loop = packet.last_loop;
        self.rx_last_sample.phase = packet.phase;
        self.rx_last_sample.segment = i32::from(packet.segment);
        self.switch_pressed[..self.index].copy_from_slice(&packet.switch_pressed[..self.index]);
        self.input_patched[..self.index].copy_from_slice(&packet.input_patched[..self.index]);
    }

    /// The segment-linking policy: derive each local generator's
    /// configuration from the patched/unpatched pattern of the whole chain.
    fn configure(
        &mut self,
        generators: &mut [SegmentGenerator; NUM_CHANNELS],
        settings: &Settings,
    ) {
        let options = GeneratorOptions {
            advanced: settings.multimode() == MultiMode::Advanced,
            slow_lfo: settings.multimode() == MultiMode::SlowLfo,
        };
        let last_local_channel = self.local_channel_index(0) + NUM_CHANNELS;
        let last_channel = self.size * NUM_CHANNELS;
        let mut last_patched_channel = self.rx_last_patched_channel;
        let mut last_loop = self.rx_last_loop;

        self.num_internal_bindings = 0;
        self.num_bindings = 0;
        self.attenuate = 0;

        let mut configuration = [Configuration::default(); MAX_NUM_CHANNELS];

        for i in 0..NUM_CHANNELS {
            let channel = self.local_channel_index(i);
            generators[i].set_options(options);

            if !self.channel_state[channel].input_patched() {
                if channel > last_patched_channel {
                    // Extend the group owned by a channel to our left.
                    let segment = channel - last_patched_channel;
                    generators[i].configure_slave(segment);
                    self.set_loop_status(i, segment as i32, last_loop);
                } else {
                    // Free-running channel.
                    let mut c = self.channel_state[channel].configuration();
                    c.range = FreqRange::from_bits(settings.state().word(i).range_bits());
                    generators[i].configure_single_segment(false, c);
                    self.bindings[self.num_bindings] = ParameterBinding {
                        generator: i,
                        source: i,
                        destination: 0,
                    };
                    self.num_bindings += 1;
                    self.num_internal_bindings += 1;
                    self.loop_status[i] = if c.looped {
                        LoopStatus::SelfLoop
                    } else {
                        LoopStatus::None
                    };
                }
            } else {
                last_patched_channel = channel;

                // Greedily extend a group rightward over unpatched channels,
                // local or remote.
                let mut num_segments = 0usize;
                let mut dirty = false;
                let mut cursor = channel;
                last_loop = Loop::default();
                loop {
                    let c = self.channel_state[cursor].configuration();
                    configuration[num_segments] = c;
                    dirty |= self.dirty[cursor];

                    if c.looped {
                        if last_loop.start == -1 {
                            last_loop.start = num_segments as i8;
                        }
                        last_loop.end = num_segments as i8;
                    }

                    let binding = &mut self.bindings[self.num_bindings];
                    binding.generator = i;
                    binding.destination = num_segments;
                    if cursor < last_local_channel {
                        // Live pot/CV/slider of one of our own channels.
                        binding.source = i + num_segments;
                        self.num_internal_bindings += 1;
                        // Only meaningful for LFO segments.
                        configuration[num_segments].range = FreqRange::from_bits(
                            settings.state().word(i + num_segments).range_bits(),
                        );
                    } else {
                        // Transmitted mirror of a remote channel.
                        binding.source = cursor;
                    }
                    self.num_bindings += 1;
                    cursor += 1;
                    num_segments += 1;

                    if cursor >= last_channel || self.channel_state[cursor].input_patched() {
                        break;
                    }
                }
                if dirty || num_segments != generators[i].num_segments() {
                    generators[i].configure(true, &configuration[..num_segments]);
                }
                self.set_loop_status(i, 0, last_loop);
            }
            self.attenuate |= u8::from(generators[i].needs_attenuation()) << i;
        }
        self.tx_last_loop = last_loop;
        self.tx_last_patched_channel = last_patched_channel;
    }

    fn bind_remote_parameters(&self, generators: &mut [SegmentGenerator; NUM_CHANNELS]) {
        for binding in &self.bindings[self.num_internal_bindings..self.num_bindings] {
            let state = &self.channel_state[binding.source];
            generators[binding.generator].set_segment_parameters(
                binding.destination,
                state.unpack_cv_slider(),
                state.unpack_pot(),
            );
        }
    }

    fn bind_local_parameters(
        &mut self,
        block: &Block,
        generators: &mut [SegmentGenerator; NUM_CHANNELS],
        settings: &Settings,
    ) {
        for b in 0..self.num_internal_bindings {
            let binding = self.bindings[b];
            let word = settings.state().word(binding.source);
            let value = self.shaped_cv_slider(block, binding.source, word);
            generators[binding.generator].set_local_segment_parameters(
                binding.destination,
                value,
                block.pot[binding.source],
                block.slider[binding.source],
                block.cv[binding.source],
            );
        }
    }

    /// Range-map one channel's combined CV + slider according to its type,
    /// range, scale and attenuation settings.
    fn shaped_cv_slider(&mut self, block: &Block, i: usize, word: ConfigWord) -> f32 {
        match word.type_bits() {
            // Ramp: the slider throw follows the LFO range, except for
            // self-looping (LFO) channels where it is the frequency itself.
            0 => {
                if self.loop_status[i] == LoopStatus::SelfLoop {
                    return block.cv_slider[i];
                }
                match word.range_bits() {
                    // Slow: short throw, 1 ms up to about 2 s.
                    1 => block.cv_slider_alt(i, 0.0, 0.6667, 0.0, 1.0),
                    // Fast: offset throw, 16 s up to about a quarter hour.
                    2 => block.cv_slider_alt(i, 1.0, 0.98, 0.0, 1.0),
                    _ => block.cv_slider[i],
                }
            }
            // Turing: probability, used raw.
            3 => block.cv_slider[i],
            // Step and hold: bipolar remap, optional quantizer, optional
            // pot attenuversion of the CV.
            _ => {
                let bipolar = word.bipolar();
                let quantize = word.scale_bits() > 0;
                let attenuate = (self.attenuate >> i) & 1 != 0;
                let pot = block.pot[i];
                let q = if quantize { 0.25 } else { 1.0 };
                let slider_offset = if bipolar { -q } else { 0.0 };
                let slider_scale = if bipolar { 2.0 * q } else { q };
                let cv_scale = if attenuate {
                    if bipolar {
                        2.0 * pot - 1.0
                    } else {
                        pot
                    }
                } else {
                    1.0
                };
                let raw = block.cv_slider_alt(i, slider_offset, slider_scale, 0.0, cv_scale);
                if quantize {
                    self.quantizers[i].process(raw)
                } else {
                    raw
                }
            }
        }
    }

    // --- Switches ----------------------------------------------------------

    /// The last module in the chain owns switch interpretation for everyone:
    /// presses were forwarded rightward, and the resulting request travels
    /// back leftward where every module applies it to its own channels.
    fn poll_switches(&mut self) {
        if self.index != self.size - 1 {
            return;
        }
        self.request = RequestPacket::default();
        let mut switch_index = 0usize;
        let mut first_pressed = MAX_NUM_CHANNELS;

        for module in 0..self.size {
            let pressed = self.switch_pressed[module];
            if pressed == 0xff {
                // That module is editing local properties; freeze its timers
                // so nothing fires on release.
                for t in
                    &mut self.switch_press_time[switch_index..switch_index + NUM_CHANNELS]
                {
                    *t = -1;
                }
                switch_index += NUM_CHANNELS;
                continue;
            }
            for channel in 0..NUM_CHANNELS {
                if pressed & (1 << channel) != 0 {
                    if self.switch_press_time[switch_index] != -1 {
                        self.switch_press_time[switch_index] += 1;
                        if first_pressed != MAX_NUM_CHANNELS {
                            // A simultaneous pair: loop between them.
                            self.request =
                                self.make_loop_change_request(first_pressed, switch_index);
                            self.switch_press_time[first_pressed] = -1;
                            self.switch_press_time[switch_index] = -1;
                        } else {
                            first_pressed = switch_index;
                        }
                    }
                } else {
                    let held = self.switch_press_time[switch_index];
                    if held > LONG_PRESS_DURATION {
                        if held < MULTIMODE_PRESS_DURATION {
                            // Long press: toggle a self-loop.
                            self.request =
                                self.make_loop_change_request(switch_index, switch_index);
                        }
                    } else if held > 5 {
                        // Short press on release: cycle the segment type.
                        self.request = RequestPacket {
                            request: Request::SetSegmentType,
                            arguments: [switch_index as u8, 0, 0, 0],
                        };
                    }
                    self.switch_press_time[switch_index] = 0;
                }
                switch_index += 1;
            }
        }
    }

    /// Turn a pair press into a loop-edit request, or reject it.
    ///
    /// `group_start`/`group_end` come out as the tightest patched-channel
    /// window enclosing the loop. The request is rejected when a patched
    /// channel sits strictly inside the loop, when the loop spans several
    /// channels of the leading free-running group, or when it ends exactly
    /// on a patched channel of a multi-channel group.
    fn make_loop_change_request(&self, loop_start: usize, loop_end: usize) -> RequestPacket {
        let mut group_start = 0usize;
        let mut group_end = self.size * NUM_CHANNELS;
        let mut inconsistent = false;

        let mut channel_index = 0usize;
        for module in 0..self.size {
            let mut patched = self.input_patched[module];
            for _ in 0..NUM_CHANNELS {
                if patched & 1 != 0 {
                    if channel_index <= loop_start {
                        group_start = channel_index;
                    } else if channel_index >= loop_end {
                        group_end = group_end.min(channel_index);
                    }
                    if channel_index > loop_start && channel_index < loop_end {
                        inconsistent = true;
                    }
                }
                patched >>= 1;
                channel_index += 1;
            }
        }

        let mut loop_start = loop_start;
        let mut loop_end = loop_end;
        // The channels before the first patched one are all free-running:
        // only self-loops make sense there.
        if group_start == 0 && self.input_patched[0] & 1 == 0 {
            if loop_start != loop_end {
                inconsistent = true;
            } else {
                group_start = loop_start;
                group_end = loop_start;
                loop_end = loop_start;
            }
        }

        // A loop may only end on a patched channel when that channel is a
        // single-channel group.
        if group_end == loop_end && group_start != group_end {
            inconsistent = true;
        }

        if inconsistent {
            RequestPacket::default()
        } else {
            RequestPacket {
                request: Request::SetLoop,
                arguments: [
                    group_start as u8,
                    loop_start as u8,
                    loop_end as u8,
                    group_end as u8,
                ],
            }
        }
    }
}
