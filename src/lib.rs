//! # Log Store
//!
//! The persistence primitive of an append-only commit log: a single file
//! holding length-prefixed records, each addressed by the byte position of
//! its header.
//!
//! ## On-disk format
//!
//! ```text
//! stream := record*
//! record := length:u64 (big-endian) payload:[u8; length]
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use logstore::Store;
//!
//! # fn main() -> logstore::Result<()> {
//! let store = Store::open("./commit.log")?;
//!
//! let (written, position) = store.append(b"hello world")?;
//! assert_eq!(written, 19);
//!
//! assert_eq!(store.read(position)?, b"hello world");
//!
//! store.close()?;
//! # Ok(())
//! # }
//! ```

mod buffer;
pub mod config;
pub mod error;
pub mod frame;
pub mod store;

// Re-exports
pub use config::{StoreConfig, DEFAULT_BUFFER_CAPACITY};
pub use error::{Result, StoreError};
pub use frame::LEN_WIDTH;
pub use store::{RecordIterator, Store};
