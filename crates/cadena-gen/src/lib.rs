//! Cadena segment generator.
//!
//! One [`SegmentGenerator`] per channel turns a configuration of one to
//! thirty-six linked segments into an output signal. Depending on the
//! configuration it behaves as:
//!
//! - a multi-segment envelope or looping function, with per-segment time,
//!   curve and portamento ([`generator::SegmentGenerator::configure`])
//! - one of the specialized single-segment modes: free-running or
//!   tap-synchronized LFO, decay envelope, portamento, sample-and-hold,
//!   delay, timed pulse or gate generator, plus the advanced set
//!   (rise-and-fall slew, attenuverter-offset, Turing shift register,
//!   logistic map, chaotic attractors, random)
//! - a step sequencer when the configuration reads as "one clock head plus
//!   step segments"
//! - a slave that renders the progress of a group owned by a channel to its
//!   left
//!
//! The crate also hosts the six-stage DAHDSR [`Envelope`] and the
//! [`Oscillator`] bank used by the alternate multimodes.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod chaos;
pub mod config;
pub mod envelope;
pub mod generator;
pub mod oscillator;
pub mod segment;
pub mod sequencer;
pub mod shape;
pub mod turing;

pub use config::{Configuration, FreqRange, GeneratorOptions, Parameters, SegmentType};
pub use envelope::{Envelope, EnvelopeStage};
pub use generator::{Output, ProcessMode, SegmentGenerator, MAX_NUM_SEGMENTS};
pub use oscillator::{Oscillator, Waveshape};
pub use segment::{ParamSource, Segment};
pub use shape::shape_lfo;
pub use turing::advance_turing;
