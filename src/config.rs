//! Store configuration.

use std::path::PathBuf;

/// Default write buffer capacity in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Path to the backing file.
    pub path: PathBuf,

    /// Bytes held in memory before they are spilled to the file.
    pub buffer_capacity: usize,

    /// Whether `close` (and drop) fsyncs the file after the final flush.
    pub sync_on_close: bool,

    /// Whether to create the file if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to take an exclusive advisory lock on the file.
    pub lock_file: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./store.log"),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            sync_on_close: true,
            create_if_missing: true,
            lock_file: true,
        }
    }
}

impl StoreConfig {
    /// Default configuration for the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn sync_on_close(mut self, sync: bool) -> Self {
        self.sync_on_close = sync;
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn lock_file(mut self, lock: bool) -> Self {
        self.lock_file = lock;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new("/tmp/a.log");
        assert_eq!(config.path, PathBuf::from("/tmp/a.log"));
        assert_eq!(config.buffer_capacity, DEFAULT_BUFFER_CAPACITY);
        assert!(config.sync_on_close);
        assert!(config.create_if_missing);
        assert!(config.lock_file);
    }

    #[test]
    fn test_setters() {
        let config = StoreConfig::new("x")
            .buffer_capacity(16)
            .sync_on_close(false)
            .create_if_missing(false)
            .lock_file(false);
        assert_eq!(config.buffer_capacity, 16);
        assert!(!config.sync_on_close);
        assert!(!config.create_if_missing);
        assert!(!config.lock_file);
    }
}
