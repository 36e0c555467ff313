//! Serial link abstraction.
//!
//! Each module has two UARTs at 921600 baud, one per side. Frames are
//! exactly [`PACKET_SIZE`] bytes with no framing markers; the driver hands
//! over a frame only once all its bytes have arrived, and absence of traffic
//! never blocks.

/// Fixed frame size on the wire.
pub const PACKET_SIZE: usize = 24;

/// One wire frame.
pub type Frame = [u8; PACKET_SIZE];

/// A one-sided serial connection to a neighbor module.
pub trait SerialLink {
    /// Queue a frame for transmission. Fire-and-forget; the driver owns
    /// retransmission (there is none) and pacing.
    fn transmit(&mut self, frame: &Frame);

    /// Take the most recently completed received frame, if any arrived since
    /// the last call. Never blocks.
    fn receive(&mut self) -> Option<Frame>;
}

/// Link with no neighbor attached: transmissions vanish, nothing arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLink;

impl SerialLink for NullLink {
    fn transmit(&mut self, _frame: &Frame) {}

    fn receive(&mut self) -> Option<Frame> {
        None
    }
}
