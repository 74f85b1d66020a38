//! A minimal, inert [`RouterStateMachine`]/[`WorkerContext`] pair used only
//! by the `routerd serve` binary entry point when no real reconciliation
//! backend is linked in. Real deployments embed this crate as a library
//! and supply their own state-machine bodies and `WorkerContext`; this
//! module exists purely so the CLI has something concrete to run, the same
//! role a placeholder registry implementation plays before a real backend
//! is wired in.

use crate::error::SmError;
use crate::event::Event;
use crate::ids::{RouterId, TenantId};
use crate::state_machine::{RouterStateMachine, WorkerContext};

/// A `WorkerContext` whose tenant lookups always report "no router
/// configured" — sufficient for the CLI to run without crashing, useless
/// for anything else.
#[derive(Default)]
pub struct NoopWorkerContext;

impl WorkerContext for NoopWorkerContext {
    fn lookup_router_for_tenant(&mut self, _tenant_id: TenantId) -> Result<Option<RouterId>, SmError> {
        Ok(None)
    }
}

/// A state machine that accepts messages, logs them, and never reports
/// further work.
pub struct NoopStateMachine {
    tenant_id: TenantId,
    router_id: RouterId,
}

impl NoopStateMachine {
    /// Creates a new no-op state machine for the given tenant/router pair.
    #[must_use]
    pub fn new(tenant_id: TenantId, router_id: RouterId) -> Self {
        Self { tenant_id, router_id }
    }
}

impl RouterStateMachine for NoopStateMachine {
    fn router_id(&self) -> RouterId {
        self.router_id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn send_message(&mut self, event: &Event) -> bool {
        tracing::debug!(router_id = %self.router_id, kind = ?event.kind(), "noop state machine received event");
        true
    }

    fn update(&mut self, _context: &mut dyn WorkerContext) -> Result<(), SmError> {
        tracing::info!(router_id = %self.router_id, "noop state machine update (no-op backend)");
        Ok(())
    }

    fn has_more_work(&self) -> bool {
        false
    }
}
