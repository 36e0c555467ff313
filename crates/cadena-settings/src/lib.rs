//! Cadena settings - persistent module state.
//!
//! Two records survive power cycles:
//!
//! - [`PersistentData`]: per-channel ADC/DAC calibration (tag `CALI`)
//! - [`State`]: the six segment-configuration words, the color-blind flag and
//!   the multimode (tag `STAT`)
//!
//! Both live in a flash region managed by [`ChunkStorage`]: records are
//! appended with a CRC-checked header, the region is scanned at boot for the
//! newest valid copy of each, and a full region is erased and compacted.
//! Corruption never propagates: a record that fails its CRC is skipped, and
//! a region with no valid record falls back to defaults (logged through
//! `log::warn!`).

#![cfg_attr(not(feature = "std"), no_std)]

pub mod calibration;
pub mod error;
pub mod state;
pub mod storage;

pub use calibration::ChannelCalibration;
pub use error::StorageError;
pub use state::{ConfigWord, MultiMode, State, NUM_CHANNELS};
pub use storage::{Chunk, ChunkStorage, Flash, RamFlash};

/// Per-channel calibration, persisted as the `CALI` chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersistentData {
    pub channel_calibration: [ChannelCalibration; NUM_CHANNELS],
}

impl Default for PersistentData {
    fn default() -> Self {
        Self {
            channel_calibration: [ChannelCalibration::default(); NUM_CHANNELS],
        }
    }
}

/// The module's settings, loaded once at boot and flushed when dirty.
///
/// Mutation inside the audio path only flips the dirty flag; the actual flash
/// write happens from the main loop via [`Settings::flush`].
#[derive(Debug, Clone, Default)]
pub struct Settings {
    persistent: PersistentData,
    state: State,
    state_dirty: bool,
}

impl Settings {
    /// Load both chunks from storage, falling back to defaults for whichever
    /// is missing or corrupt.
    pub fn load<F: Flash>(storage: &mut ChunkStorage<F>) -> Self {
        let persistent = storage.read_chunk::<PersistentData>().unwrap_or_else(|| {
            log::warn!("calibration chunk missing or corrupt, using defaults");
            PersistentData::default()
        });
        let state = storage.read_chunk::<State>().unwrap_or_else(|| {
            log::warn!("state chunk missing or corrupt, using defaults");
            State::default()
        });
        Self {
            persistent,
            state,
            state_dirty: false,
        }
    }

    #[inline]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Mutable access to the state; marks it for the next flush.
    #[inline]
    pub fn mutable_state(&mut self) -> &mut State {
        self.state_dirty = true;
        &mut self.state
    }

    #[inline]
    pub fn calibration(&self, channel: usize) -> &ChannelCalibration {
        &self.persistent.channel_calibration[channel]
    }

    #[inline]
    pub fn mutable_calibration(&mut self, channel: usize) -> &mut ChannelCalibration {
        &mut self.persistent.channel_calibration[channel]
    }

    /// Convert an output level to a DAC code using the channel's calibration.
    #[inline]
    pub fn dac_code(&self, channel: usize, level: f32) -> u16 {
        self.persistent.channel_calibration[channel].dac_code(level)
    }

    #[inline]
    pub fn multimode(&self) -> MultiMode {
        self.state.multimode()
    }

    /// Segment-generator modes: the chainable ones.
    #[inline]
    pub fn in_segment_mode(&self) -> bool {
        matches!(
            self.multimode(),
            MultiMode::Segments | MultiMode::Advanced | MultiMode::SlowLfo
        )
    }

    #[inline]
    pub fn in_ouroboros_mode(&self) -> bool {
        matches!(
            self.multimode(),
            MultiMode::Ouroboros | MultiMode::OuroborosAlternate
        )
    }

    #[inline]
    pub fn state_dirty(&self) -> bool {
        self.state_dirty
    }

    /// Write pending changes to storage. Call from the main loop, never from
    /// the audio path.
    pub fn flush<F: Flash>(&mut self, storage: &mut ChunkStorage<F>) -> Result<(), StorageError> {
        if self.state_dirty {
            storage.write_chunk(&self.state)?;
            self.state_dirty = false;
        }
        Ok(())
    }

    /// Persist calibration immediately (only ever called from the factory
    /// test / calibration flow).
    pub fn save_persistent<F: Flash>(
        &mut self,
        storage: &mut ChunkStorage<F>,
    ) -> Result<(), StorageError> {
        storage.write_chunk(&self.persistent)
    }
}
