//! Cadena firmware core.
//!
//! The real-time pipeline for a six-channel, chainable multi-segment
//! function generator:
//!
//! ```text
//! ADCs/gates  ->  CvReader (smoothing + range mapping)
//!                    |
//!                    v
//!                 ChainState (neighbor exchange, segment linkage,
//!                             parameter routing)
//!                    |
//!                    v
//!                 SegmentGenerator x 6  ->  DAC codes
//!                    ^
//!                 Ui (switches, property edits, LEDs)
//! ```
//!
//! Hardware touches the core only through narrow seams: the IO [`Block`],
//! the [`SerialLink`] trait, the [`cadena_settings::Flash`] trait, raw
//! switch levels and the LED frame. Everything else is portable and fully
//! exercised by host-side tests.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod app;
pub mod chain;
pub mod clock;
pub mod cv_reader;
pub mod io_buffer;
pub mod leds;
pub mod link;
pub mod packet;
pub mod switches;
pub mod ui;

pub use app::App;
pub use chain::{ChainState, ChainStatus, LoopStatus, MAX_NUM_CHANNELS};
pub use clock::SystemClock;
pub use cv_reader::{AnalogInputs, CvReader};
pub use io_buffer::{Block, IoBuffer, Slice};
pub use leds::{LedColor, LedDriver, LedFrame};
pub use link::{Frame, NullLink, SerialLink, PACKET_SIZE};
pub use packet::MAX_CHAIN_SIZE;
pub use switches::Switches;
pub use ui::Ui;
