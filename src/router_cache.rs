//! `TenantRouterCache`: memoizes each tenant's default router id so
//! messages that arrive without a `router_id` don't cost a network-API
//! round trip every time.

use dashmap::DashMap;

use crate::error::SmError;
use crate::ids::{RouterId, TenantId};
use crate::state_machine::WorkerContext;

/// Holds a cache of default router ids for tenants.
///
/// Populated lazily on the first lookup that misses; never invalidated
/// during normal operation. A stale entry (the tenant's default router
/// changed) is an accepted race — the next event that carries an explicit
/// `router_id` restores consistency.
///
/// Documented as ingress-thread-only: the engine never calls this from a
/// worker thread.
#[derive(Default)]
pub struct TenantRouterCache {
    entries: DashMap<TenantId, RouterId>,
}

impl TenantRouterCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached router for `tenant_id`, consulting `context`'s
    /// network API on a cache miss and memoizing a non-null result.
    pub fn get_by_tenant(
        &self,
        tenant_id: TenantId,
        context: &mut dyn WorkerContext,
    ) -> Result<Option<RouterId>, SmError> {
        if let Some(router_id) = self.entries.get(&tenant_id) {
            return Ok(Some(*router_id));
        }
        let Some(router_id) = context.lookup_router_for_tenant(tenant_id)? else {
            return Ok(None);
        };
        self.entries.insert(tenant_id, router_id);
        Ok(Some(router_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::fakes::FakeWorkerContext;
    use std::sync::atomic::Ordering;

    #[test]
    fn repeated_lookups_hit_the_network_api_at_most_once() {
        let cache = TenantRouterCache::new();
        let tenant = TenantId::generate();
        let router = RouterId::generate();
        let mut ctx = FakeWorkerContext::new(Some(router));
        let lookups = ctx.lookups.clone();

        assert_eq!(cache.get_by_tenant(tenant, &mut ctx).unwrap(), Some(router));
        assert_eq!(cache.get_by_tenant(tenant, &mut ctx).unwrap(), Some(router));
        assert_eq!(cache.get_by_tenant(tenant, &mut ctx).unwrap(), Some(router));

        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn miss_with_no_router_is_not_cached() {
        let cache = TenantRouterCache::new();
        let tenant = TenantId::generate();
        let mut ctx = FakeWorkerContext::new(None);
        let lookups = ctx.lookups.clone();

        assert_eq!(cache.get_by_tenant(tenant, &mut ctx).unwrap(), None);
        assert_eq!(cache.get_by_tenant(tenant, &mut ctx).unwrap(), None);

        assert_eq!(lookups.load(Ordering::SeqCst), 2);
    }
}
