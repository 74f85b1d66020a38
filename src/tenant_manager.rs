//! Tenant router manager and its registry: the lazy factory/registry layer
//! that sits between ingress and the per-router state machines, mirroring
//! the way a lazily-populated agent registry owns and grows its own map.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::event::{is_wildcard, Event};
use crate::ids::{RouterId, TenantId};
use crate::scheduler::SmHandle;

/// Builds a fresh state machine for `(tenant_id, router_id)`. State machine
/// bodies are an external collaborator; this crate only defines the slot
/// they plug into. `reboot_error_threshold` is forwarded
/// so a state-machine body can decide for itself when repeated failures
/// warrant a full rebuild rather than another reconciliation attempt —
/// that decision is the body's, not the engine's.
pub type SmFactory = dyn Fn(TenantId, RouterId, usize) -> SmHandle + Send + Sync;

/// Either "every tenant" or one specific, normalized tenant id — the two
/// lookup modes target resolution supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Broadcast: affects every tenant manager, e.g. a cluster-wide
    /// `GLOBAL_DEBUG` toggle.
    Wildcard,
    /// One specific tenant, already normalized to canonical UUID form.
    Tenant(TenantId),
}

/// Parses a raw ingress target string into a [`Target`], normalizing a
/// specific target the way [`TenantId::normalize`] does: strip dashes, then
/// reparse.
pub fn parse_target(target: &str) -> Result<Target, uuid::Error> {
    if is_wildcard(target) {
        Ok(Target::Wildcard)
    } else {
        TenantId::normalize(target).map(Target::Tenant)
    }
}

/// Owns the set of state machines for one tenant.
pub struct TenantRouterManager {
    tenant_id: TenantId,
    state_machines: DashMap<RouterId, SmHandle>,
    sm_factory: Arc<SmFactory>,
    queue_warning_threshold: usize,
    reboot_error_threshold: usize,
}

impl TenantRouterManager {
    /// Creates a manager for `tenant_id` with no state machines yet.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        sm_factory: Arc<SmFactory>,
        queue_warning_threshold: usize,
        reboot_error_threshold: usize,
    ) -> Self {
        Self {
            tenant_id,
            state_machines: DashMap::new(),
            sm_factory,
            queue_warning_threshold,
            reboot_error_threshold,
        }
    }

    /// The tenant id this manager was created for.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Number of state machines this manager currently tracks. Used both as
    /// the `WORKERS_DEBUG` introspection count and as the proxy for
    /// per-tenant inbox depth — event-level queue depth isn't observable
    /// from outside the state machine, so router count is the closest
    /// engine-visible signal (see DESIGN.md).
    #[must_use]
    pub fn router_count(&self) -> usize {
        self.state_machines.len()
    }

    fn get_or_create_sm(&self, router_id: RouterId) -> SmHandle {
        Arc::clone(
            self.state_machines
                .entry(router_id)
                .or_insert_with(|| {
                    (self.sm_factory)(self.tenant_id, router_id, self.reboot_error_threshold)
                })
                .value(),
        )
    }

    /// Returns the state machine(s) `event` should be delivered to.
    /// Resource-type broadcast filtering is left to the state-machine
    /// body: the body's `send_message` may itself ignore events it isn't
    /// interested in, which keeps this engine from having to parse the
    /// opaque `body` payload.
    ///
    /// Returns an empty vec (and logs a warning) if `event` still has no
    /// `router_id` — by the time it reaches a tenant manager, ingress is
    /// expected to have already resolved it via
    /// [`crate::router_cache::TenantRouterCache`].
    pub fn get_state_machines(&self, event: &Event) -> Vec<SmHandle> {
        let Some(router_id) = event.router_id() else {
            warn!(tenant = %self.tenant_id, "event missing router_id reached tenant manager, dropping");
            return Vec::new();
        };
        let sm = self.get_or_create_sm(router_id);
        let depth = self.router_count();
        if depth > self.queue_warning_threshold {
            warn!(
                tenant = %self.tenant_id,
                depth,
                threshold = self.queue_warning_threshold,
                "tenant inbox depth exceeds warning threshold"
            );
        }
        vec![sm]
    }

    /// Releases every state machine this manager holds.
    pub fn shutdown(&self) {
        self.state_machines.clear();
    }
}

/// Registry of [`TenantRouterManager`]s, keyed by tenant id, mutated only
/// from the ingress thread while `deliver_lock` is held.
pub struct TenantManagerRegistry {
    managers: DashMap<TenantId, Arc<TenantRouterManager>>,
    sm_factory: Arc<SmFactory>,
    queue_warning_threshold: usize,
    reboot_error_threshold: usize,
}

impl TenantManagerRegistry {
    /// Creates an empty registry that lazily builds tenant managers on first use.
    #[must_use]
    pub fn new(sm_factory: Arc<SmFactory>, queue_warning_threshold: usize, reboot_error_threshold: usize) -> Self {
        Self {
            managers: DashMap::new(),
            sm_factory,
            queue_warning_threshold,
            reboot_error_threshold,
        }
    }

    /// Returns the manager for `tenant_id`, creating it on first use.
    pub fn get_or_create(&self, tenant_id: TenantId) -> Arc<TenantRouterManager> {
        Arc::clone(
            self.managers
                .entry(tenant_id)
                .or_insert_with(|| {
                    Arc::new(TenantRouterManager::new(
                        tenant_id,
                        Arc::clone(&self.sm_factory),
                        self.queue_warning_threshold,
                        self.reboot_error_threshold,
                    ))
                })
                .value(),
        )
    }

    /// Resolves a raw ingress target into the manager(s) it addresses —
    /// every manager for [`Target::Wildcard`], or exactly one
    /// (created on demand) for [`Target::Tenant`].
    pub fn resolve(&self, target: &str) -> Result<Vec<Arc<TenantRouterManager>>, uuid::Error> {
        match parse_target(target)? {
            Target::Wildcard => Ok(self.managers.iter().map(|e| Arc::clone(e.value())).collect()),
            Target::Tenant(tenant_id) => Ok(vec![self.get_or_create(tenant_id)]),
        }
    }

    /// Number of tenants currently tracked, for `WORKERS_DEBUG`.
    #[must_use]
    pub fn tenant_count(&self) -> usize {
        self.managers.len()
    }

    /// Shuts down every tenant manager. Called under `deliver_lock` during
    /// engine shutdown.
    pub fn shutdown_all(&self) {
        for entry in &self.managers {
            entry.value().shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Kind;
    use crate::state_machine::fakes::FakeStateMachine;
    use parking_lot::Mutex;
    use serde_json::Map;

    fn factory() -> Arc<SmFactory> {
        Arc::new(|tenant_id, router_id, _reboot_threshold| {
            Arc::new(Mutex::new(FakeStateMachine::new(tenant_id, router_id))) as SmHandle
        })
    }

    #[test]
    fn get_state_machines_creates_on_demand_and_reuses() {
        let trm = TenantRouterManager::new(TenantId::generate(), factory(), 100, 5);
        let router = RouterId::generate();
        let event = Event::new(trm.tenant_id(), Some(router), Kind::Update, Map::new());

        let first = trm.get_state_machines(&event);
        let second = trm.get_state_machines(&event);
        assert_eq!(first.len(), 1);
        assert!(Arc::ptr_eq(&first[0], &second[0]));
        assert_eq!(trm.router_count(), 1);
    }

    #[test]
    fn get_state_machines_drops_events_with_no_router_id() {
        let trm = TenantRouterManager::new(TenantId::generate(), factory(), 100, 5);
        let event = Event::new(trm.tenant_id(), None, Kind::Update, Map::new());
        assert!(trm.get_state_machines(&event).is_empty());
    }

    #[test]
    fn registry_wildcard_target_returns_every_manager() {
        let registry = TenantManagerRegistry::new(factory(), 100, 5);
        registry.get_or_create(TenantId::generate());
        registry.get_or_create(TenantId::generate());
        assert_eq!(registry.resolve("*").unwrap().len(), 2);
        assert_eq!(registry.resolve("all").unwrap().len(), 2);
    }

    #[test]
    fn registry_specific_target_normalizes_and_creates() {
        let registry = TenantManagerRegistry::new(factory(), 100, 5);
        let tenant = TenantId::generate();
        let bare = tenant.to_string().replace('-', "");
        let resolved = registry.resolve(&bare).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].tenant_id(), tenant);
        assert_eq!(registry.tenant_count(), 1);
    }

    #[test]
    fn shutdown_all_clears_every_manager() {
        let registry = TenantManagerRegistry::new(factory(), 100, 5);
        let trm = registry.get_or_create(TenantId::generate());
        let router = RouterId::generate();
        let event = Event::new(trm.tenant_id(), Some(router), Kind::Update, Map::new());
        trm.get_state_machines(&event);
        assert_eq!(trm.router_count(), 1);
        registry.shutdown_all();
        assert_eq!(trm.router_count(), 0);
    }
}
