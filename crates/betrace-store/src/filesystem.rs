//! The narrow I/O boundary both stores route through.
//!
//! `spec.md` §4.4: "All I/O routes through a narrow interface with
//! operations `Read`, `WriteAtomic`, `MakeDir`, `Stat`, `Delete`. Production
//! binds this to the host filesystem; tests substitute an in-memory
//! implementation that can inject errors at any operation." [`StdFilesystem`]
//! is the production binding; [`InMemoryFilesystem`] is the fault-injecting
//! test double. The same trait-for-testability shape as the teacher's
//! `bulloak_backend::Backend`.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, StoreError};

/// The I/O operations a store performs, abstracted so production can bind
/// to the real filesystem and tests can substitute a fault-injecting
/// in-memory double.
pub trait Filesystem: Send + Sync {
    /// Reads the full contents of `path`. Returns `Ok(None)` if the path
    /// does not exist; any other failure is a [`StoreError::Persistence`].
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    /// Atomically replaces `path`'s contents with `bytes`: writes to a
    /// `<path>.tmp` sibling, flushes it durably, then renames it over
    /// `path`. At any interrupt point `path` holds either the old bytes or
    /// the new bytes, never a torn write (`spec.md` §4.4).
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    /// Creates `path` and any missing parent directories.
    fn make_dir(&self, path: &Path) -> Result<()>;

    /// True if `path` currently exists.
    fn stat(&self, path: &Path) -> Result<bool>;

    /// Removes `path`. A missing path is not an error.
    fn delete(&self, path: &Path) -> Result<()>;
}

/// Binds [`Filesystem`] to the host filesystem via `std::fs`.
///
/// Grounded directly on `synaptik-core`'s `utils/pons.rs::write_atomic`:
/// create the `.tmp` sibling, `write_all`, `sync_all` before the rename so
/// the bytes are durable before the name is swapped.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFilesystem;

impl Filesystem for StdFilesystem {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Persistence(err.to_string())),
        }
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Persistence(e.to_string()))?;
        }
        let tmp = path.with_extension("tmp");
        {
            let mut file =
                fs::File::create(&tmp).map_err(|e| StoreError::Persistence(e.to_string()))?;
            file.write_all(bytes).map_err(|e| StoreError::Persistence(e.to_string()))?;
            file.sync_all().map_err(|e| StoreError::Persistence(e.to_string()))?;
        }
        fs::rename(&tmp, path).map_err(|e| StoreError::Persistence(e.to_string()))
    }

    fn make_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| StoreError::Persistence(e.to_string()))
    }

    fn stat(&self, path: &Path) -> Result<bool> {
        Ok(path.exists())
    }

    fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Persistence(err.to_string())),
        }
    }
}

impl<T: Filesystem + ?Sized> Filesystem for std::sync::Arc<T> {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        (**self).read(path)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        (**self).write_atomic(path, bytes)
    }

    fn make_dir(&self, path: &Path) -> Result<()> {
        (**self).make_dir(path)
    }

    fn stat(&self, path: &Path) -> Result<bool> {
        (**self).stat(path)
    }

    fn delete(&self, path: &Path) -> Result<()> {
        (**self).delete(path)
    }
}

/// In-memory [`Filesystem`] double for tests, with optional fault
/// injection at any operation -- used to exercise the rename-step crash
/// scenario without touching real disk.
#[derive(Default)]
pub struct InMemoryFilesystem {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    fail_write_atomic: Mutex<Option<String>>,
}

impl InMemoryFilesystem {
    /// Builds an empty in-memory filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// After this call, every subsequent `write_atomic` fails with
    /// `reason` instead of touching the stored bytes -- simulates a crash
    /// at the rename step (`spec.md` §8 S6).
    pub fn fail_next_write_atomic(&self, reason: impl Into<String>) {
        *self.fail_write_atomic.lock().unwrap() = Some(reason.into());
    }

    /// Reads back the raw bytes stored at `path`, bypassing the
    /// [`Filesystem`] trait -- used by tests to assert on what actually
    /// landed on "disk".
    #[must_use]
    pub fn snapshot(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

impl Filesystem for InMemoryFilesystem {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        Ok(self.files.lock().unwrap().get(path).cloned())
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(reason) = self.fail_write_atomic.lock().unwrap().take() {
            return Err(StoreError::Persistence(reason));
        }
        self.files.lock().unwrap().insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn make_dir(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn stat(&self, path: &Path) -> Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    fn delete(&self, path: &Path) -> Result<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_of_an_absent_path_is_none_not_an_error() {
        let fs = InMemoryFilesystem::new();
        assert_eq!(fs.read(Path::new("/rules.json")).unwrap(), None);
    }

    #[test]
    fn write_then_read_round_trips() {
        let fs = InMemoryFilesystem::new();
        fs.write_atomic(Path::new("/rules.json"), b"hello").unwrap();
        assert_eq!(fs.read(Path::new("/rules.json")).unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn a_failed_write_atomic_leaves_previous_bytes_untouched() {
        let fs = InMemoryFilesystem::new();
        fs.write_atomic(Path::new("/rules.json"), b"v1").unwrap();
        fs.fail_next_write_atomic("disk full");
        assert!(fs.write_atomic(Path::new("/rules.json"), b"v2").is_err());
        assert_eq!(fs.read(Path::new("/rules.json")).unwrap(), Some(b"v1".to_vec()));
    }
}
