//! Durable half of the shutdown latch: a filesystem marker whose mere
//! existence is truth (§6 — "zero-byte file is valid"). `ups_core::ShutdownLatch`
//! is the in-memory half; this is what makes it observable externally and
//! survivable across a process restart.

use std::path::PathBuf;

use tracing::warn;

pub trait LatchPersistence: Send + Sync {
    fn create(&self);
    fn remove(&self);
    fn exists(&self) -> bool;
}

pub struct FileLatchPersistence {
    path: PathBuf,
}

impl FileLatchPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LatchPersistence for FileLatchPersistence {
    fn create(&self) {
        if let Err(err) = std::fs::write(&self.path, []) {
            warn!(path = %self.path.display(), error = %err, "failed to create shutdown latch file");
        }
    }

    fn remove(&self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to remove shutdown latch file");
            }
        }
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_remove_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shutdown.latch");
        let latch = FileLatchPersistence::new(&path);
        assert!(!latch.exists());
        latch.create();
        assert!(latch.exists());
        latch.remove();
        assert!(!latch.exists());
    }

    #[test]
    fn zero_byte_file_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shutdown.latch");
        let latch = FileLatchPersistence::new(&path);
        latch.create();
        let metadata = std::fs::metadata(&path).unwrap();
        assert_eq!(metadata.len(), 0);
    }
}
