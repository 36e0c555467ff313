//! Cadena DSP - primitives for the segment generator core
//!
//! This crate provides the low-level building blocks the rest of the firmware
//! is assembled from:
//!
//! - [`one_pole`] smoothing and [`ParameterInterpolator`] for zipper-free
//!   per-block parameter updates
//! - [`DelayLine`] fixed-capacity delay with linear interpolation
//! - [`GateFlags`] per-sample gate/trigger edge flags
//! - [`HysteresisQuantizer`] for pot-driven discrete selections
//! - [`NoteQuantizer`] pitch quantizer with per-scale hysteresis
//! - [`RampExtractor`] tap-tempo phase extraction for clock-locked LFOs
//! - [`Rng`] deterministic xorshift generator
//! - pitch and rate conversion math ([`semitones_to_ratio`],
//!   [`rate_to_frequency`], [`portamento_to_coefficient`])
//!
//! Everything is `Copy`/`Clone`-friendly, allocation-free, and bounded; the
//! crate is `no_std` compatible.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod delay_line;
pub mod gate;
pub mod hysteresis;
pub mod math;
pub mod one_pole;
pub mod quantizer;
pub mod ramp_extractor;
pub mod rates;
pub mod rng;

pub use delay_line::DelayLine;
pub use gate::{extract_gate_flags, GateFlags};
pub use hysteresis::HysteresisQuantizer;
pub use math::{crossfade, semitones_to_ratio};
pub use one_pole::{one_pole, ParameterInterpolator};
pub use quantizer::{NoteQuantizer, Scale, SCALES};
pub use ramp_extractor::{RampExtractor, Ratio};
pub use rates::{portamento_to_coefficient, rate_to_frequency, MAX_FREQUENCY};
pub use rng::Rng;

/// Audio sample rate of the module, in Hz.
pub const SAMPLE_RATE: f32 = 31250.0;

/// Samples per processing block.
pub const BLOCK_SIZE: usize = 8;
