//! Storage error type.

use thiserror::Error;

/// Errors from the flash chunk storage.
///
/// The firmware never propagates these to a host; callers fall back to
/// defaults on read failures and retry writes on the next edit.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The region cannot fit the record even after compaction.
    #[error("flash region too small for record of {size} bytes")]
    RegionFull {
        /// Size of the record that did not fit.
        size: usize,
    },

    /// A program operation wrote outside the region.
    #[error("write of {len} bytes at offset {offset} exceeds region")]
    OutOfBounds { offset: usize, len: usize },
}
