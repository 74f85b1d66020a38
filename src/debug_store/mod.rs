//! Debug store interface: a small key/value API for tenant/router/global
//! debug flags, queried synchronously on every inbound event and mutated
//! only by command dispatch.
//!
//! The engine treats the store as an external collaborator — this module
//! defines the trait plus two implementations: [`memory::InMemoryDebugStore`]
//! (the default, used in tests and for deployments that don't need
//! cross-restart persistence) and [`sqlite::SqliteDebugStore`] (sqlx-backed
//! persistence).

pub mod memory;
pub mod sqlite;

use crate::error::DebugStoreError;
use crate::ids::{RouterId, TenantId};

pub use memory::InMemoryDebugStore;
pub use sqlite::SqliteDebugStore;

/// A debug flag with an optional human-readable reason, as returned by the
/// store's query methods.
pub type DebugFlag = (bool, Option<String>);

/// Synchronous query/mutate interface over the three debug-flag maps
/// (global, per-tenant, per-router).
///
/// Every method is `&self` and non-async by design: the engine calls this
/// on the hot path of every inbound event, and the worker loop's
/// debug-skip check runs inline between dequeuing a state machine and
/// calling `update`. Wrapping
/// these in `async fn` would force every caller onto an async runtime for
/// what is specified as a low-latency, synchronous lookup; implementations
/// that need async I/O (like [`sqlite::SqliteDebugStore`]) bridge
/// internally instead.
pub trait DebugStore: Send + Sync {
    /// Whether the whole cluster is in debug mode, and why.
    fn global_debug(&self) -> Result<DebugFlag, DebugStoreError>;

    /// Whether `tenant_id` is in debug mode, and why.
    fn tenant_in_debug(&self, tenant_id: TenantId) -> Result<DebugFlag, DebugStoreError>;

    /// Whether `router_id` is in debug mode, and why.
    fn router_in_debug(&self, router_id: RouterId) -> Result<DebugFlag, DebugStoreError>;

    /// All tenants currently in debug mode, with their reasons.
    fn tenants_in_debug(&self) -> Result<Vec<(TenantId, Option<String>)>, DebugStoreError>;

    /// All routers currently in debug mode, with their reasons.
    fn routers_in_debug(&self) -> Result<Vec<(RouterId, Option<String>)>, DebugStoreError>;

    /// Enables cluster-wide debug mode.
    fn enable_global_debug(&self, reason: Option<String>) -> Result<(), DebugStoreError>;

    /// Disables cluster-wide debug mode.
    fn disable_global_debug(&self) -> Result<(), DebugStoreError>;

    /// Puts `tenant_id` into debug mode.
    fn enable_tenant_debug(&self, tenant_id: TenantId, reason: Option<String>) -> Result<(), DebugStoreError>;

    /// Takes `tenant_id` out of debug mode.
    fn disable_tenant_debug(&self, tenant_id: TenantId) -> Result<(), DebugStoreError>;

    /// Puts `router_id` into debug mode.
    fn enable_router_debug(&self, router_id: RouterId, reason: Option<String>) -> Result<(), DebugStoreError>;

    /// Takes `router_id` out of debug mode.
    fn disable_router_debug(&self, router_id: RouterId) -> Result<(), DebugStoreError>;
}
