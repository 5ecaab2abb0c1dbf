//! Write coalescing buffer.
//!
//! Appended frames are staged in memory and pushed to the file by an
//! explicit [`WriteBuffer::flush`]. The buffer tracks how many bytes have
//! reached the file so a failed write can be cut back off the file. If
//! that cut fails the buffer is poisoned: the file tail no longer matches
//! `flushed`, so every later write would land at the wrong position.

use crate::error::{Result, StoreError};
use std::fs::File;
use std::io::Write;
use tracing::{trace, warn};

/// In-memory staging area in front of an append-mode file.
pub(crate) struct WriteBuffer {
    /// Bytes not yet written to the file.
    buf: Vec<u8>,

    /// Spill threshold.
    capacity: usize,

    /// Length of the file as written by this buffer.
    flushed: u64,

    /// Set when a partial write could not be removed from the file.
    torn: bool,
}

impl WriteBuffer {
    /// Create an empty buffer over a file currently `flushed` bytes long.
    pub fn new(capacity: usize, flushed: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            flushed,
            torn: false,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Bytes known to be in the file.
    pub fn flushed(&self) -> u64 {
        self.flushed
    }

    /// Fails once the file tail can no longer be trusted.
    pub fn check(&self) -> Result<()> {
        if self.torn {
            return Err(StoreError::Poisoned {
                offset: self.flushed,
            });
        }
        Ok(())
    }

    /// Whether `n` more bytes can be staged without exceeding capacity.
    pub fn fits(&self, n: u64) -> bool {
        (self.buf.len() as u64).saturating_add(n) <= self.capacity as u64
    }

    /// Stage bytes. Never touches the file.
    pub fn stage(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Push all staged bytes to the file.
    ///
    /// On failure the staged bytes are kept and any partial write is cut
    /// back off the file.
    pub fn flush(&mut self, file: &mut File) -> Result<()> {
        self.check()?;
        if self.buf.is_empty() {
            return Ok(());
        }

        if let Err(e) = file.write_all(&self.buf).and_then(|_| file.flush()) {
            return Err(self.rewind(file, e));
        }

        trace!(bytes = self.buf.len(), offset = self.flushed, "flushed write buffer");
        self.flushed += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }

    /// Write a frame straight to the file, bypassing the buffer.
    ///
    /// The buffer must be empty so the frame lands at `flushed`.
    pub fn write_through(&mut self, file: &mut File, parts: &[&[u8]]) -> Result<()> {
        self.check()?;
        debug_assert!(self.buf.is_empty());

        let mut written = 0u64;
        for part in parts {
            if let Err(e) = file.write_all(part) {
                return Err(self.rewind(file, e));
            }
            written += part.len() as u64;
        }

        trace!(bytes = written, offset = self.flushed, "wrote frame through");
        self.flushed += written;
        Ok(())
    }

    /// Drop staged bytes without writing them.
    pub fn discard(&mut self) -> usize {
        let n = self.buf.len();
        self.buf.clear();
        n
    }

    /// Cut the file back to `flushed` after a failed write.
    ///
    /// Returns the write error when the file is back at `flushed`, and
    /// poisons the buffer otherwise.
    fn rewind(&mut self, file: &File, cause: std::io::Error) -> StoreError {
        if file.metadata().is_ok_and(|m| m.len() == self.flushed) {
            return cause.into();
        }

        if let Err(e) = file.set_len(self.flushed) {
            warn!(
                error = %e,
                cause = %cause,
                len = self.flushed,
                "failed to truncate partial write, poisoning store"
            );
            self.torn = true;
            return StoreError::Poisoned {
                offset: self.flushed,
            };
        }

        cause.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> File {
        OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(dir.path().join("buf.log"))
            .unwrap()
    }

    #[test]
    fn test_stage_does_not_touch_file() {
        let dir = TempDir::new().unwrap();
        let file = open(&dir);
        let mut buf = WriteBuffer::new(64, 0);

        buf.stage(b"hello");
        assert_eq!(buf.len(), 5);
        assert_eq!(file.metadata().unwrap().len(), 0);
    }

    #[test]
    fn test_flush_moves_bytes_to_file() {
        let dir = TempDir::new().unwrap();
        let mut file = open(&dir);
        let mut buf = WriteBuffer::new(64, 0);

        buf.stage(b"hello");
        buf.stage(b" world");
        buf.flush(&mut file).unwrap();

        assert_eq!(buf.len(), 0);
        assert_eq!(buf.flushed(), 11);
        assert_eq!(std::fs::read(dir.path().join("buf.log")).unwrap(), b"hello world");
    }

    #[test]
    fn test_fits() {
        let buf = WriteBuffer::new(10, 0);
        assert!(buf.fits(10));
        assert!(!buf.fits(11));
        assert!(!buf.fits(u64::MAX));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let buf = WriteBuffer::new(0, 0);
        assert!(buf.fits(1));
        assert!(!buf.fits(2));
    }

    #[test]
    fn test_write_through() {
        let dir = TempDir::new().unwrap();
        let mut file = open(&dir);
        let mut buf = WriteBuffer::new(4, 0);

        buf.write_through(&mut file, &[b"abc", b"defgh"]).unwrap();

        assert_eq!(buf.len(), 0);
        assert_eq!(buf.flushed(), 8);
        assert_eq!(std::fs::read(dir.path().join("buf.log")).unwrap(), b"abcdefgh");
    }

    #[test]
    fn test_discard() {
        let mut buf = WriteBuffer::new(16, 0);
        buf.stage(b"abc");
        assert_eq!(buf.discard(), 3);
        assert_eq!(buf.len(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_write_with_intact_tail_is_io() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("buf.log");
        std::fs::write(&path, b"12345").unwrap();
        let mut file = File::open(&path).unwrap();
        let mut buf = WriteBuffer::new(16, 5);

        buf.stage(b"abc");
        assert!(matches!(buf.flush(&mut file), Err(StoreError::Io(_))));
        assert_eq!(buf.len(), 3);
        assert!(buf.check().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_untruncatable_tail_poisons() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("buf.log");
        std::fs::write(&path, b"torn tail").unwrap();

        // Read-only handle: the write fails and so does the truncate, while
        // the file is longer than what the buffer believes it flushed.
        let mut file = File::open(&path).unwrap();
        let mut buf = WriteBuffer::new(4, 0);

        let result = buf.write_through(&mut file, &[b"header", b"payload"]);
        assert!(matches!(result, Err(StoreError::Poisoned { offset: 0 })));

        buf.stage(b"x");
        assert!(matches!(buf.flush(&mut file), Err(StoreError::Poisoned { .. })));
        assert!(matches!(buf.check(), Err(StoreError::Poisoned { .. })));
        assert_eq!(std::fs::read(&path).unwrap(), b"torn tail");
    }
}
