//! The shutdown latch: a monotonic "a shutdown has started" flag.
//!
//! This type only holds the in-memory half of the contract described in
//! the data model (an `AtomicBool` so every component can check it
//! lock-free). The runtime crate pairs it with a durable on-disk marker so
//! the flag survives a process restart; this crate never touches a
//! filesystem.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ShutdownLatch {
    flag: Arc<AtomicBool>,
}

impl ShutdownLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a latch whose durable marker already existed at startup.
    pub fn from_persisted(latched: bool) -> Self {
        let latch = Self::new();
        if latched {
            latch.set();
        }
        latch
    }

    /// Idempotent: calling this repeatedly leaves the flag set.
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Only meaningful on dry-run completion or a clean exit where no real
    /// shutdown occurred.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unset() {
        let latch = ShutdownLatch::new();
        assert!(!latch.is_set());
    }

    #[test]
    fn set_is_idempotent() {
        let latch = ShutdownLatch::new();
        latch.set();
        latch.set();
        assert!(latch.is_set());
    }

    #[test]
    fn clone_shares_the_same_flag() {
        let latch = ShutdownLatch::new();
        let clone = latch.clone();
        clone.set();
        assert!(latch.is_set());
    }

    #[test]
    fn from_persisted_respects_prior_state() {
        assert!(ShutdownLatch::from_persisted(true).is_set());
        assert!(!ShutdownLatch::from_persisted(false).is_set());
    }
}
