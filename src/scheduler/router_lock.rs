//! A "signal, not mutex" lock: held/free state that encodes
//! "queued-or-running" rather than guarding a critical section, so the lock
//! can be acquired on one thread (the ingress thread, enqueuing) and
//! released on another (whichever worker thread runs the state machine).
//!
//! `std::sync::Mutex`/`parking_lot::Mutex` can't do this: their guards are
//! `!Send`, precisely to stop a lock being released on a different thread
//! than the one that took it. An `AtomicBool`-backed flag has no such
//! restriction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A boolean guard: held means "this router's state machine is either
/// sitting in the work queue or currently being updated by a worker".
#[derive(Clone)]
pub struct RouterLock {
    held: Arc<AtomicBool>,
}

impl Default for RouterLock {
    fn default() -> Self {
        Self {
            held: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl RouterLock {
    /// Attempts to acquire the lock without blocking. Returns `true` if
    /// this call acquired it (the caller must now enqueue the state
    /// machine); `false` means it was already held (the caller must not
    /// enqueue — the event is already in the state machine's inbox).
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the lock unconditionally, matching `ROUTER_MANAGE`'s
    /// behavior of releasing even if nothing currently holds it —
    /// idempotent by construction, since `store` never panics on an
    /// already-`false` flag.
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    /// Whether the lock is currently held. Introspection only — never use
    /// this to decide whether to acquire; use [`Self::try_acquire`].
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_try_acquire_fails_while_held() {
        let lock = RouterLock::default();
        assert!(lock.try_acquire());
        assert!(!lock.try_acquire());
    }

    #[test]
    fn release_permits_reacquire() {
        let lock = RouterLock::default();
        assert!(lock.try_acquire());
        lock.release();
        assert!(lock.try_acquire());
    }

    #[test]
    fn release_without_holding_is_a_harmless_no_op() {
        let lock = RouterLock::default();
        lock.release();
        assert!(lock.try_acquire());
    }

    #[test]
    fn clones_share_the_same_underlying_flag() {
        let lock = RouterLock::default();
        let clone = lock.clone();
        assert!(lock.try_acquire());
        assert!(!clone.try_acquire());
    }
}
