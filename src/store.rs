//! Position-addressed record store over a single file.

use crate::buffer::WriteBuffer;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::frame::{decode_header, encode_header, framed_len, LEN_WIDTH};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Mutable state guarded by the store lock.
struct Inner {
    /// Backing file. `None` once closed.
    file: Option<File>,

    /// Frames not yet written to the file.
    buf: WriteBuffer,

    /// Logical length of the stream, buffered bytes included.
    size: u64,
}

/// Append-only record store.
///
/// Every record is framed as an 8-byte big-endian length followed by the
/// payload. `append` returns the position of the frame, which `read` takes
/// back. All operations run under one lock, so concurrent calls behave as
/// if issued in some serial order, and every read flushes the write buffer
/// first so it sees all prior appends.
///
/// After [`Store::close`] every operation fails with [`StoreError::Closed`].
/// If a failed write leaves bytes on the file that cannot be truncated
/// away, every later write or read fails with [`StoreError::Poisoned`].
pub struct Store {
    path: PathBuf,
    sync_on_close: bool,
    inner: Mutex<Inner>,
}

impl Store {
    /// Open or create a store at `path` with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(StoreConfig::new(path.as_ref()))
    }

    /// Open or create a store.
    ///
    /// The size is recovered from the file length, so appends continue
    /// right after the last byte that reached the file.
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        if !config.create_if_missing && !config.path.exists() {
            return Err(StoreError::NotFound(config.path));
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(config.create_if_missing)
            .open(&config.path)?;

        if config.lock_file {
            file.try_lock_exclusive().map_err(|e| {
                if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                    StoreError::Locked
                } else {
                    StoreError::Io(e)
                }
            })?;
        }

        let size = file.metadata()?.len();
        debug!(path = %config.path.display(), size, "opened record store");

        Ok(Self {
            path: config.path,
            sync_on_close: config.sync_on_close,
            inner: Mutex::new(Inner {
                file: Some(file),
                buf: WriteBuffer::new(config.buffer_capacity, size),
                size,
            }),
        })
    }

    /// Append a record.
    ///
    /// Returns `(bytes_written, position)` where `bytes_written` counts the
    /// header and `position` is the offset of the header. The frame usually
    /// stays in memory until the buffer fills or a read, flush or close
    /// happens. On error the size is left unchanged.
    pub fn append(&self, payload: &[u8]) -> Result<(u64, u64)> {
        let mut inner = self.inner.lock();
        let Inner { file, buf, size } = &mut *inner;
        let file = file.as_mut().ok_or(StoreError::Closed)?;
        buf.check()?;

        let position = *size;
        let header = encode_header(payload.len() as u64);
        let written = framed_len(payload.len() as u64);

        if !buf.fits(written) {
            buf.flush(file)?;
        }

        if buf.fits(written) {
            buf.stage(&header);
            buf.stage(payload);
        } else {
            buf.write_through(file, &[&header[..], payload])?;
        }

        *size += written;
        Ok((written, position))
    }

    /// Read the record whose header starts at `position`.
    pub fn read(&self, position: u64) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        let Inner { file, buf, size } = &mut *inner;
        let file = file.as_mut().ok_or(StoreError::Closed)?;
        let size = *size;

        buf.flush(file)?;
        debug_assert_eq!(buf.flushed(), size);

        match position.checked_add(LEN_WIDTH) {
            Some(end) if end <= size => {}
            _ => return Err(StoreError::PositionOutOfRange { position, size }),
        }

        let mut header = [0u8; LEN_WIDTH as usize];
        read_exact_at(file, &mut header, position)?;
        let length = decode_header(header);

        let fits = position
            .checked_add(LEN_WIDTH)
            .and_then(|start| start.checked_add(length))
            .is_some_and(|end| end <= size);
        if !fits {
            return Err(StoreError::TruncatedRecord {
                position,
                length,
                size,
            });
        }

        let mut payload = vec![0u8; length as usize];
        read_exact_at(file, &mut payload, position + LEN_WIDTH)?;
        Ok(payload)
    }

    /// Raw positional read into `dst`, ignoring framing.
    ///
    /// Reads until `dst` is full or the end of the file is reached and
    /// returns the byte count. A short count means the end of the data;
    /// `0` means `offset` is at or past the end.
    pub fn read_at(&self, dst: &mut [u8], offset: u64) -> Result<usize> {
        let mut inner = self.inner.lock();
        let Inner { file, buf, .. } = &mut *inner;
        let file = file.as_mut().ok_or(StoreError::Closed)?;

        buf.flush(file)?;

        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < dst.len() {
            match file.read(&mut dst[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    /// Push buffered bytes to the file without syncing.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let Inner { file, buf, .. } = &mut *inner;
        let file = file.as_mut().ok_or(StoreError::Closed)?;
        buf.flush(file)?;
        Ok(())
    }

    /// Flush and fsync.
    pub fn sync(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let Inner { file, buf, size } = &mut *inner;
        let file = file.as_mut().ok_or(StoreError::Closed)?;
        buf.flush(file)?;
        file.sync_all()?;
        debug!(path = %self.path.display(), size = *size, "synced record store");
        Ok(())
    }

    /// Flush buffered bytes and release the file.
    ///
    /// The file is released even when the final flush fails; the error is
    /// still returned. Closing an already closed store is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let Some(mut file) = inner.file.take() else {
            return Ok(());
        };

        let result = Self::finish(&mut file, &mut inner.buf, self.sync_on_close);
        if result.is_err() {
            inner.buf.discard();
        }
        debug!(path = %self.path.display(), size = inner.size, "closed record store");
        result
    }

    /// Logical size, buffered bytes included. This is the position the next
    /// record will get.
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Bytes waiting in the write buffer.
    pub fn buffered(&self) -> usize {
        self.inner.lock().buf.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().file.is_none()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Iterate `(position, payload)` for every record.
    pub fn iter(&self) -> RecordIterator<'_> {
        self.iter_from(0)
    }

    /// Iterate `(position, payload)` starting at a record boundary.
    ///
    /// Records appended after the iterator is created are not visited.
    pub fn iter_from(&self, position: u64) -> RecordIterator<'_> {
        RecordIterator {
            store: self,
            position,
            end: self.size(),
        }
    }

    fn finish(file: &mut File, buf: &mut WriteBuffer, sync: bool) -> Result<()> {
        buf.flush(file)?;
        if sync {
            file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(mut file) = inner.file.take() {
            if let Err(e) = Self::finish(&mut file, &mut inner.buf, self.sync_on_close) {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    lost = inner.buf.len(),
                    "failed to flush record store on drop"
                );
            }
        }
    }
}

fn read_exact_at(file: &mut File, dst: &mut [u8], offset: u64) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(dst)
}

/// Iterator over records in the store.
pub struct RecordIterator<'a> {
    store: &'a Store,
    position: u64,
    end: u64,
}

impl Iterator for RecordIterator<'_> {
    type Item = Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.end {
            return None;
        }

        let position = self.position;
        match self.store.read(position) {
            Ok(payload) => {
                self.position = position + framed_len(payload.len() as u64);
                Some(Ok((position, payload)))
            }
            Err(e) => {
                self.position = self.end;
                Some(Err(e))
            }
        }
    }
}
