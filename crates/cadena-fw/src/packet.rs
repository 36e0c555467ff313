//! Wire formats for the chain links.
//!
//! Four packet kinds share the 24-byte frame:
//!
//! - [`DiscoveryPacket`] - topology discovery and reinit broadcast; its key
//!   doubles as the frame tag during the discovery phase.
//! - [`LeftToRightPacket`] - group/progress state flowing rightward.
//! - [`RightToLeftPacket`] - six [`ChannelStateWire`] records flowing
//!   leftward.
//! - [`RequestPacket`] - switch/loop edit requests flowing leftward,
//!   distinguished from channel records by a leading byte whose module-index
//!   bits read 7 (no real module ever has index 7; request opcodes 0xfe and
//!   0xff both carry those bits set).
//!
//! Decoding is total: anything unrecognized decodes to "nothing", matching
//! the error policy of dropping bad traffic silently.

use crate::link::Frame;
use cadena_gen::{Configuration, FreqRange, SegmentType};
use cadena_settings::NUM_CHANNELS;

/// Maximum number of chained modules.
pub const MAX_CHAIN_SIZE: usize = 6;

/// Key/counter broadcast during discovery. The key encodes the module mode
/// (basic vs advanced) so mismatched modes refuse to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryPacket {
    pub key: u32,
    pub counter: u8,
}

/// Reinit broadcast: a discovery packet with an all-ones key.
pub const REINIT_KEY: u32 = 0xffff_ffff;
pub const REINIT_COUNTER: u8 = 0xff;

impl DiscoveryPacket {
    pub fn encode(&self) -> Frame {
        let mut frame = [0u8; 24];
        frame[0..4].copy_from_slice(&self.key.to_le_bytes());
        frame[4] = self.counter;
        frame
    }

    pub fn decode(frame: &Frame) -> Self {
        Self {
            key: u32::from_le_bytes(frame[0..4].try_into().unwrap()),
            counter: frame[4],
        }
    }

    pub fn is_reinit(frame: &Frame) -> bool {
        let p = Self::decode(frame);
        p.key == REINIT_KEY && p.counter == REINIT_COUNTER
    }
}

/// Loop endpoints within a group, as segment indices; -1,-1 means no loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loop {
    pub start: i8,
    pub end: i8,
}

impl Default for Loop {
    fn default() -> Self {
        Self { start: -1, end: -1 }
    }
}

/// Compact per-channel record exchanged across the chain.
///
/// Flags byte layout, MSB first: `SSS B I L TT` - sending module index,
/// bipolar, input patched, loop, segment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStateWire {
    pub flags: u8,
    pub pot: u8,
    pub cv_slider: u16,
}

impl Default for ChannelStateWire {
    fn default() -> Self {
        // Index 7 (never a real module), centered controls.
        Self {
            flags: 0b1110_0000,
            pot: 128,
            cv_slider: 32_768,
        }
    }
}

impl ChannelStateWire {
    #[inline]
    pub fn index(&self) -> usize {
        ((self.flags >> 5) & 0b111) as usize
    }

    #[inline]
    pub fn input_patched(&self) -> bool {
        self.flags & 0x08 != 0
    }

    /// The segment configuration carried by the flags byte.
    pub fn configuration(&self) -> Configuration {
        Configuration {
            segment_type: SegmentType::from_bits(u16::from(self.flags) & 0x3),
            looped: self.flags & 0x04 != 0,
            bipolar: self.flags & 0b0001_0000 != 0,
            range: FreqRange::Default,
        }
    }

    /// Refresh the flags from local state. Returns true when they changed.
    pub fn update_flags(&mut self, index: usize, config_word: u16, input_patched: bool) -> bool {
        let mut new_flags = (index as u8) << 5;
        new_flags |= (config_word & 0b0111) as u8;
        new_flags |= if input_patched { 0x08 } else { 0 };
        // Bipolar lives at bit 3 of the word, bit 4 of the flags.
        new_flags |= ((config_word & 0b1000) << 1) as u8;
        let dirty = new_flags != self.flags;
        self.flags = new_flags;
        dirty
    }

    /// Encode the combined CV + slider value (-1..2 biased into a u16).
    #[inline]
    pub fn pack_cv_slider(value: f32) -> u16 {
        (value * 16_384.0 + 32_768.0) as u16
    }

    #[inline]
    pub fn unpack_cv_slider(&self) -> f32 {
        f32::from(self.cv_slider) / 16_384.0 - 2.0
    }

    #[inline]
    pub fn pack_pot(value: f32) -> u8 {
        (value * 255.0) as u8
    }

    #[inline]
    pub fn unpack_pot(&self) -> f32 {
        f32::from(self.pot) / 255.0
    }
}

/// Group/progress state flowing rightward once per chain cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeftToRightPacket {
    /// Absolute index of the last patched channel seen so far.
    pub last_patched_channel: u8,
    /// Active segment of this module's last generator.
    pub segment: i8,
    /// Phase of this module's last generator.
    pub phase: f32,
    pub last_loop: Loop,
    /// Per-module switch bitmasks, for modules 0..=sender.
    pub switch_pressed: [u8; MAX_CHAIN_SIZE],
    /// Per-module input-patched bitmasks, for modules 0..=sender.
    pub input_patched: [u8; MAX_CHAIN_SIZE],
}

impl LeftToRightPacket {
    pub fn encode(&self) -> Frame {
        let mut frame = [0u8; 24];
        frame[0] = self.last_patched_channel;
        frame[1] = self.segment as u8;
        frame[2..6].copy_from_slice(&self.phase.to_le_bytes());
        frame[6] = self.last_loop.start as u8;
        frame[7] = self.last_loop.end as u8;
        frame[8..14].copy_from_slice(&self.switch_pressed);
        frame[14..20].copy_from_slice(&self.input_patched);
        frame
    }

    pub fn decode(frame: &Frame) -> Self {
        let mut switch_pressed = [0u8; MAX_CHAIN_SIZE];
        let mut input_patched = [0u8; MAX_CHAIN_SIZE];
        switch_pressed.copy_from_slice(&frame[8..14]);
        input_patched.copy_from_slice(&frame[14..20]);
        Self {
            last_patched_channel: frame[0],
            segment: frame[1] as i8,
            phase: f32::from_le_bytes(frame[2..6].try_into().unwrap()),
            last_loop: Loop {
                start: frame[6] as i8,
                end: frame[7] as i8,
            },
            switch_pressed,
            input_patched,
        }
    }
}

/// Six channel records flowing leftward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RightToLeftPacket {
    pub channels: [ChannelStateWire; NUM_CHANNELS],
}

impl RightToLeftPacket {
    pub fn encode(&self) -> Frame {
        let mut frame = [0u8; 24];
        for (i, c) in self.channels.iter().enumerate() {
            let base = i * 4;
            frame[base] = c.flags;
            frame[base + 1] = c.pot;
            frame[base + 2..base + 4].copy_from_slice(&c.cv_slider.to_le_bytes());
        }
        frame
    }

    pub fn decode(frame: &Frame) -> Self {
        let mut channels = [ChannelStateWire::default(); NUM_CHANNELS];
        for (i, c) in channels.iter_mut().enumerate() {
            let base = i * 4;
            c.flags = frame[base];
            c.pot = frame[base + 1];
            c.cv_slider = u16::from_le_bytes(frame[base + 2..base + 4].try_into().unwrap());
        }
        Self { channels }
    }
}

/// Chain-wide edit requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Request {
    #[default]
    None,
    /// Cycle a channel's segment type. Argument 0: absolute channel.
    SetSegmentType = 0xfe,
    /// Rewrite loop bits. Arguments: group start, loop start, loop end,
    /// group end (absolute channels).
    SetLoop = 0xff,
}

/// A request plus its arguments, idempotent by construction (absolute
/// channel indices).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestPacket {
    pub request: Request,
    pub arguments: [u8; 4],
}

impl RequestPacket {
    pub fn encode(&self) -> Frame {
        let mut frame = [0u8; 24];
        frame[0] = self.request as u8;
        frame[1..5].copy_from_slice(&self.arguments);
        frame
    }

    pub fn decode(frame: &Frame) -> Self {
        let request = match frame[0] {
            0xfe => Request::SetSegmentType,
            0xff => Request::SetLoop,
            _ => Request::None,
        };
        Self {
            request,
            arguments: [frame[1], frame[2], frame[3], frame[4]],
        }
    }
}

/// What a leftward frame turned out to contain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LeftwardMessage {
    Reinit,
    Channels(RightToLeftPacket),
    Request(RequestPacket),
}

/// Classify a frame received on the right link.
pub fn decode_leftward(frame: &Frame) -> LeftwardMessage {
    if DiscoveryPacket::is_reinit(frame) {
        return LeftwardMessage::Reinit;
    }
    let packet = RightToLeftPacket::decode(frame);
    if packet.channels[0].index() == 0b111 {
        LeftwardMessage::Request(RequestPacket::decode(frame))
    } else {
        LeftwardMessage::Channels(packet)
    }
}
