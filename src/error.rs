//! Error types for the record store.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store is closed")]
    Closed,

    #[error("Store file has an untruncated partial write past offset {offset}")]
    Poisoned { offset: u64 },

    #[error("Store file is locked by another store")]
    Locked,

    #[error("Store file not found: {0}")]
    NotFound(PathBuf),

    #[error("Position {position} out of range (size is {size})")]
    PositionOutOfRange { position: u64, size: u64 },

    #[error("Record at {position} claims {length} bytes past end of store (size is {size})")]
    TruncatedRecord { position: u64, length: u64, size: u64 },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
