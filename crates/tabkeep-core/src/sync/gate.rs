//! Single-flight gate for sync passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Token shared by everything that may start a pass.
///
/// Clones observe the same flag, so a gate handed to two reconcilers makes
/// them mutually exclusive.
#[derive(Debug, Clone, Default)]
pub struct SyncGate {
    busy: Arc<AtomicBool>,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate, or `None` if a pass already holds it.
    pub fn try_acquire(&self) -> Option<PassGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held for the duration of one pass; dropping it reopens the gate.
#[derive(Debug)]
#[must_use = "the gate reopens as soon as the guard is dropped"]
pub struct PassGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let gate = SyncGate::new();
        let guard = gate.try_acquire().unwrap();
        assert!(gate.is_busy());
        assert!(gate.try_acquire().is_none());
        assert!(gate.clone().try_acquire().is_none());

        drop(guard);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn guard_releases_on_panic() {
        let gate = SyncGate::new();
        let shared = gate.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = shared.try_acquire().unwrap();
            panic!("pass blew up");
        });
        assert!(result.is_err());
        assert!(!gate.is_busy());
    }
}
