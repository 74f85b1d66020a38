//! `DashMap`-backed debug store. Default implementation: no persistence
//! across restarts, but sub-microsecond reads, which is what every call on
//! the ingress hot path needs.

use dashmap::DashMap;
use parking_lot::RwLock;

use super::{DebugFlag, DebugStore};
use crate::error::DebugStoreError;
use crate::ids::{RouterId, TenantId};

/// In-memory debug store. Construct one per process; share it via `Arc`.
#[derive(Default)]
pub struct InMemoryDebugStore {
    global: RwLock<DebugFlag>,
    tenants: DashMap<TenantId, Option<String>>,
    routers: DashMap<RouterId, Option<String>>,
}

impl InMemoryDebugStore {
    /// Creates an empty store with nothing in debug mode.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DebugStore for InMemoryDebugStore {
    fn global_debug(&self) -> Result<DebugFlag, DebugStoreError> {
        Ok(self.global.read().clone())
    }

    fn tenant_in_debug(&self, tenant_id: TenantId) -> Result<DebugFlag, DebugStoreError> {
        Ok(match self.tenants.get(&tenant_id) {
            Some(reason) => (true, reason.clone()),
            None => (false, None),
        })
    }

    fn router_in_debug(&self, router_id: RouterId) -> Result<DebugFlag, DebugStoreError> {
        Ok(match self.routers.get(&router_id) {
            Some(reason) => (true, reason.clone()),
            None => (false, None),
        })
    }

    fn tenants_in_debug(&self) -> Result<Vec<(TenantId, Option<String>)>, DebugStoreError> {
        Ok(self
            .tenants
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect())
    }

    fn routers_in_debug(&self) -> Result<Vec<(RouterId, Option<String>)>, DebugStoreError> {
        Ok(self
            .routers
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect())
    }

    fn enable_global_debug(&self, reason: Option<String>) -> Result<(), DebugStoreError> {
        *self.global.write() = (true, reason);
        Ok(())
    }

    fn disable_global_debug(&self) -> Result<(), DebugStoreError> {
        *self.global.write() = (false, None);
        Ok(())
    }

    fn enable_tenant_debug(&self, tenant_id: TenantId, reason: Option<String>) -> Result<(), DebugStoreError> {
        self.tenants.insert(tenant_id, reason);
        Ok(())
    }

    fn disable_tenant_debug(&self, tenant_id: TenantId) -> Result<(), DebugStoreError> {
        self.tenants.remove(&tenant_id);
        Ok(())
    }

    fn enable_router_debug(&self, router_id: RouterId, reason: Option<String>) -> Result<(), DebugStoreError> {
        self.routers.insert(router_id, reason);
        Ok(())
    }

    fn disable_router_debug(&self, router_id: RouterId) -> Result<(), DebugStoreError> {
        self.routers.remove(&router_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_debug_defaults_to_off() {
        let store = InMemoryDebugStore::new();
        assert_eq!(store.global_debug().unwrap(), (false, None));
    }

    #[test]
    fn enable_then_disable_router_debug_round_trips() {
        let store = InMemoryDebugStore::new();
        let router = RouterId::generate();
        store.enable_router_debug(router, Some("maintenance".into())).unwrap();
        assert_eq!(
            store.router_in_debug(router).unwrap(),
            (true, Some("maintenance".into()))
        );
        store.disable_router_debug(router).unwrap();
        assert_eq!(store.router_in_debug(router).unwrap(), (false, None));
    }

    #[test]
    fn tenants_in_debug_lists_all_enabled_tenants() {
        let store = InMemoryDebugStore::new();
        let t1 = TenantId::generate();
        let t2 = TenantId::generate();
        store.enable_tenant_debug(t1, None).unwrap();
        store.enable_tenant_debug(t2, Some("reason".into())).unwrap();
        let mut listed: Vec<_> = store.tenants_in_debug().unwrap();
        listed.sort_by_key(|(id, _)| id.to_string());
        assert_eq!(listed.len(), 2);
    }
}
