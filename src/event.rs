//! Event model: immutable records describing router lifecycle and
//! configuration changes, and the control-command taxonomy carried inside
//! `Kind::Command` events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::ids::{RouterId, TenantId};

/// Reserved target strings meaning "all tenants". Commands that would
/// enable debug mode against a wildcard target are rejected by the
/// dispatcher.
pub const WILDCARDS: &[&str] = &["*", "all"];

/// Returns true if `target` (case-insensitively) names every tenant rather
/// than one specific tenant.
#[must_use]
pub fn is_wildcard(target: &str) -> bool {
    let lower = target.to_lowercase();
    WILDCARDS.iter().any(|w| *w == lower)
}

/// The kind of change or observation an [`Event`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    /// A router should be created.
    Create,
    /// A router's configuration changed and should be reconciled.
    Update,
    /// A router should be torn down.
    Delete,
    /// A router should be fully rebuilt from scratch.
    Rebuild,
    /// A control command for the engine itself; see [`Command`].
    Command,
    /// A periodic poll/health-check tick.
    Poll,
}

/// The control commands the dispatcher understands, carried in the `body`
/// of a [`Kind::Command`] event under the `command` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Force a reconciliation update for one router.
    RouterUpdate,
    /// Force a full rebuild for one router.
    RouterRebuild,
    /// Put one router into debug mode (suppress updates).
    RouterDebug,
    /// Take one router out of debug mode and release its lock.
    RouterManage,
    /// Put one tenant into debug mode.
    TenantDebug,
    /// Take one tenant out of debug mode.
    TenantManage,
    /// Dump worker-pool introspection state to the logs.
    WorkersDebug,
    /// Enable or disable cluster-wide debug mode.
    GlobalDebug,
    /// Re-read configuration from disk.
    ConfigReload,
}

/// An immutable event describing a desired change or observation about a
/// tenant's router.
///
/// Once placed in any inbox, an `Event`'s fields never change; anything
/// that needs to "rewrite" an event (e.g. populating a missing
/// `router_id`) builds a new one with [`Event::with_router_id`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    tenant_id: TenantId,
    router_id: Option<RouterId>,
    crud: Kind,
    body: Map<String, Value>,
    /// Stamped once at ingress, threaded through tracing spans for log
    /// correlation across the tenant manager and worker pool. Has no
    /// effect on dispatch semantics.
    correlation_id: Uuid,
}

impl Event {
    /// Builds a new event. `correlation_id` is generated fresh; events
    /// derived from this one via [`Event::with_router_id`] or command
    /// synthesis keep the same correlation id so a single logical request
    /// can be traced across rewrites.
    #[must_use]
    pub fn new(tenant_id: TenantId, router_id: Option<RouterId>, crud: Kind, body: Map<String, Value>) -> Self {
        Self {
            tenant_id,
            router_id,
            crud,
            body,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// The tenant this event concerns.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// The router this event concerns, if already resolved.
    #[must_use]
    pub fn router_id(&self) -> Option<RouterId> {
        self.router_id
    }

    /// The kind of change or observation this event carries.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.crud
    }

    /// The opaque body payload.
    #[must_use]
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Correlation id threaded through derived events and tracing spans.
    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Returns a new event identical to this one but with `router_id`
    /// populated. Used by [`crate::router_cache::TenantRouterCache`]
    /// resolution.
    #[must_use]
    pub fn with_router_id(&self, router_id: RouterId) -> Self {
        Self {
            tenant_id: self.tenant_id,
            router_id: Some(router_id),
            crud: self.crud,
            body: self.body.clone(),
            correlation_id: self.correlation_id,
        }
    }

    /// Returns a new event with the same tenant/router, a new `crud` kind,
    /// and a fresh body. Used by command synthesis (`ROUTER_UPDATE` /
    /// `ROUTER_REBUILD` re-entering `handle_message`).
    #[must_use]
    pub fn derive(&self, crud: Kind, body: Map<String, Value>) -> Self {
        Self {
            tenant_id: self.tenant_id,
            router_id: self.router_id,
            crud,
            body,
            correlation_id: self.correlation_id,
        }
    }

    /// Parses the `command` discriminator out of a `Kind::Command` event's
    /// body. Returns `None` if the body has no recognizable `command`
    /// field (caller should warn-and-ignore on an unknown discriminator).
    #[must_use]
    pub fn command(&self) -> Option<Command> {
        self.body
            .get("command")
            .and_then(Value::as_str)
            .and_then(|s| serde_json::from_value(Value::String(s.to_string())).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_with_command(cmd: &str) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("command".to_string(), Value::String(cmd.to_string()));
        m
    }

    #[test]
    fn with_router_id_preserves_correlation_id() {
        let e = Event::new(TenantId::generate(), None, Kind::Update, Map::new());
        let rewritten = e.with_router_id(RouterId::generate());
        assert_eq!(e.correlation_id(), rewritten.correlation_id());
        assert!(rewritten.router_id().is_some());
    }

    #[test]
    fn derive_keeps_tenant_and_router() {
        let e = Event::new(TenantId::generate(), Some(RouterId::generate()), Kind::Command, body_with_command("ROUTER_REBUILD"));
        let derived = e.derive(Kind::Rebuild, Map::new());
        assert_eq!(derived.tenant_id(), e.tenant_id());
        assert_eq!(derived.router_id(), e.router_id());
        assert_eq!(derived.kind(), Kind::Rebuild);
    }

    #[test]
    fn command_parses_known_discriminator() {
        let e = Event::new(TenantId::generate(), None, Kind::Command, body_with_command("WORKERS_DEBUG"));
        assert_eq!(e.command(), Some(Command::WorkersDebug));
    }

    #[test]
    fn command_is_none_for_unknown_discriminator() {
        let e = Event::new(TenantId::generate(), None, Kind::Command, body_with_command("NOT_A_COMMAND"));
        assert_eq!(e.command(), None);
    }

    #[test]
    fn wildcard_matching_is_case_insensitive() {
        assert!(is_wildcard("*"));
        assert!(is_wildcard("All"));
        assert!(!is_wildcard("tenant-1"));
    }
}
