//! Process-exclusive advisory lock guarding queue-manager ticks (spec §5):
//! concurrent ticks are safe but redundant, so a failed lock acquisition is
//! not an error — the caller simply skips this tick.

use mace_core::error::MaceResult;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// An exclusive advisory lock backed by a lock file. Held for the lifetime
/// of the guard; dropped (and the file removed) when the guard goes away.
pub struct TickLock {
    path: PathBuf,
    _file: File,
}

impl TickLock {
    /// Attempt to acquire the lock at `path`. Returns `Ok(None)` when
    /// another process already holds it — never blocks.
    pub fn try_acquire(path: impl AsRef<Path>) -> MaceResult<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => Ok(Some(Self { path, _file: file })),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for TickLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
