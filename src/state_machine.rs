//! The black-box contracts the engine relies on for router reconciliation
//! bodies and their external API access, plus a `WorkerContext` abstraction
//! over the compute/network clients those bodies call out to.
//!
//! Neither `RouterStateMachine` implementations nor `WorkerContext`
//! implementations are part of this crate's scope — state machine bodies and
//! the external APIs they call are both external collaborators. This module
//! defines only the traits and, under `#[cfg(any(test, feature =
//! "test-util"))]`, the fakes the rest of the crate's tests drive against.

use crate::error::SmError;
use crate::event::Event;
use crate::ids::{RouterId, TenantId};

/// Per-thread handle to the compute/network clients a
/// [`RouterStateMachine::update`] call may need.
///
/// `Send` so a freshly constructed one can be handed off to the thread
/// that will own it. Deliberately **not** `Sync`: the underlying
/// compute/network clients are not thread-safe, so every worker thread —
/// and the ingress thread, separately, for cache lookups — constructs and
/// owns exactly one of these, and never shares it across threads.
pub trait WorkerContext: Send {
    /// Looks up the default router for `tenant_id` via the network API.
    /// Returns `None` if the tenant has no router yet. Backs
    /// [`crate::router_cache::TenantRouterCache`]'s cache-miss path.
    fn lookup_router_for_tenant(&mut self, tenant_id: TenantId) -> Result<Option<RouterId>, SmError>;
}

/// The reconciliation automaton for one router. Opaque to the engine
/// beyond these three methods.
///
/// # Contracts
/// - `send_message` must be safe to call while no `update` on the same
///   instance is in progress; the engine only ever calls it while holding
///   `deliver_lock`, so implementations never need their own synchronization
///   against concurrent `send_message` calls, only against a concurrent
///   `update`.
/// - `update` must eventually return. If it returns `Err`, the engine
///   logs and moves on — the instance is assumed to still be valid and
///   may be dequeued again later.
/// - `has_more_work` must be cheap and side-effect-free; the worker loop
///   calls it once per `update` to decide whether to re-enqueue.
pub trait RouterStateMachine: Send {
    /// This state machine's router.
    fn router_id(&self) -> RouterId;

    /// This state machine's tenant.
    fn tenant_id(&self) -> TenantId;

    /// Appends `event` to this state machine's private inbox. Returns
    /// `true` iff the state machine has transitioned into a state that
    /// desires execution (i.e. should be enqueued for `update`).
    /// Idempotent deduplication inside the state machine is permitted.
    fn send_message(&mut self, event: &Event) -> bool;

    /// Executes one reconciliation step. May block on external I/O via
    /// `context`.
    fn update(&mut self, context: &mut dyn WorkerContext) -> Result<(), SmError>;

    /// True iff another `update` call would do useful work right now.
    fn has_more_work(&self) -> bool;
}

#[cfg(any(test, feature = "test-util"))]
pub mod fakes {
    //! Test doubles standing in for real reconciliation bodies and
    //! external API clients.

    use super::{RouterStateMachine, WorkerContext};
    use crate::error::SmError;
    use crate::event::Event;
    use crate::ids::{RouterId, TenantId};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// A `WorkerContext` whose tenant-to-router lookups are scripted in
    /// advance and whose call count is observable, for S5's "cache
    /// idempotence" assertion.
    #[derive(Default)]
    pub struct FakeWorkerContext {
        /// Number of times `lookup_router_for_tenant` has been called.
        pub lookups: Arc<AtomicUsize>,
        /// The scripted answer returned for every lookup.
        pub answer: Option<RouterId>,
    }

    impl FakeWorkerContext {
        /// Creates a fake context that always returns `answer`.
        #[must_use]
        pub fn new(answer: Option<RouterId>) -> Self {
            Self {
                lookups: Arc::new(AtomicUsize::new(0)),
                answer,
            }
        }
    }

    impl WorkerContext for FakeWorkerContext {
        fn lookup_router_for_tenant(&mut self, _tenant_id: TenantId) -> Result<Option<RouterId>, SmError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer)
        }
    }

    /// A minimal, fully observable state machine: records every message it
    /// receives, counts `update` calls, and can be scripted to report more
    /// work for a fixed number of rounds or to fail its next `update`.
    pub struct FakeStateMachine {
        router_id: RouterId,
        tenant_id: TenantId,
        /// Every message received so far, in arrival order.
        pub inbox: VecDeque<Event>,
        /// Number of times `update` has been called.
        pub update_calls: usize,
        /// Number of remaining `update` calls that should report more work.
        pub remaining_rounds: usize,
        /// When true, the next `update` call reports a failure.
        pub fail_next: bool,
    }

    impl FakeStateMachine {
        /// Creates a fake state machine for the given tenant/router pair.
        #[must_use]
        pub fn new(tenant_id: TenantId, router_id: RouterId) -> Self {
            Self {
                router_id,
                tenant_id,
                inbox: VecDeque::new(),
                update_calls: 0,
                remaining_rounds: 0,
                fail_next: false,
            }
        }
    }

    impl RouterStateMachine for FakeStateMachine {
        fn router_id(&self) -> RouterId {
            self.router_id
        }

        fn tenant_id(&self) -> TenantId {
            self.tenant_id
        }

        fn send_message(&mut self, event: &Event) -> bool {
            self.inbox.push_back(event.clone());
            self.remaining_rounds = self.remaining_rounds.max(1);
            true
        }

        fn update(&mut self, _context: &mut dyn WorkerContext) -> Result<(), SmError> {
            self.update_calls += 1;
            if self.fail_next {
                self.fail_next = false;
                return Err(SmError::new(
                    self.router_id,
                    std::io::Error::other("scripted failure"),
                ));
            }
            if !self.inbox.is_empty() {
                self.inbox.pop_front();
            }
            self.remaining_rounds = self.remaining_rounds.saturating_sub(1);
            Ok(())
        }

        fn has_more_work(&self) -> bool {
            self.remaining_rounds > 0 || !self.inbox.is_empty()
        }
    }
}
