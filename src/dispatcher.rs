//! Command dispatcher: interprets `COMMAND` events and mutates debug state,
//! or asks the caller to re-enter the ingress path for the two commands
//! that are really just sugar for "send a normal event" (`ROUTER_UPDATE`,
//! `ROUTER_REBUILD`).
//!
//! Returning a [`DispatchOutcome`] rather than calling back into the
//! engine directly avoids a dependency cycle between this module and
//! `engine`, while still re-entering the top-level entry point rather than
//! fast-pathing into the tenant manager directly.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::debug_store::DebugStore;
use crate::error::ConfigError;
use crate::event::{is_wildcard, Command, Event, Kind};
use crate::ids::{RouterId, TenantId};
use crate::scheduler::WorkerPool;
use crate::tenant_manager::TenantManagerRegistry;

/// What the caller should do after a command has been dispatched.
pub enum DispatchOutcome {
    /// The command was fully handled; no further action needed.
    Handled,
    /// Re-enter `handle_message` with a synthesized event, so it takes the
    /// normal serialization path.
    ReEnter(String, Event),
}

fn body_str<'a>(event: &'a Event, key: &str) -> Option<&'a str> {
    event.body().get(key).and_then(Value::as_str)
}

/// Interprets `event`'s `body.command` discriminator and applies its
/// effect. `target` is the raw ingress target string the command arrived
/// addressed to.
pub fn dispatch_command(
    target: &str,
    event: &Event,
    debug_store: &dyn DebugStore,
    registry: &TenantManagerRegistry,
    worker_pool: &WorkerPool,
    reload_config: &dyn Fn() -> Result<Config, ConfigError>,
) -> DispatchOutcome {
    let Some(command) = event.command() else {
        warn!(target, "unrecognized command, ignoring");
        return DispatchOutcome::Handled;
    };

    match command {
        Command::WorkersDebug => {
            let tenants = debug_store.tenants_in_debug().unwrap_or_default();
            let routers = debug_store.routers_in_debug().unwrap_or_default();
            info!(
                active_routers = worker_pool.active_router_count(),
                tenant_count = registry.tenant_count(),
                threads = ?worker_pool.thread_status(),
                tenants_in_debug = ?tenants,
                routers_in_debug = ?routers,
                "worker pool status"
            );
            DispatchOutcome::Handled
        }

        Command::RouterDebug => {
            with_router_target(event, |router_id| {
                let reason = body_str(event, "reason").map(str::to_string);
                match debug_store.enable_router_debug(router_id, reason.clone()) {
                    Ok(()) => info!(%router_id, ?reason, "router debug enabled"),
                    Err(e) => warn!(%router_id, error = %e, "failed to enable router debug"),
                }
            });
            DispatchOutcome::Handled
        }

        Command::RouterManage => {
            with_router_target(event, |router_id| {
                if let Err(e) = debug_store.disable_router_debug(router_id) {
                    warn!(%router_id, error = %e, "failed to clear router debug flag");
                }
                worker_pool.force_release(router_id);
                info!(%router_id, "router lock released, debug cleared");
            });
            DispatchOutcome::Handled
        }

        Command::TenantDebug => {
            if is_wildcard(target) {
                warn!(target, "rejecting TENANT_DEBUG against a wildcard target");
                return DispatchOutcome::Handled;
            }
            match TenantId::normalize(target) {
                Ok(tenant_id) => {
                    let reason = body_str(event, "reason").map(str::to_string);
                    match debug_store.enable_tenant_debug(tenant_id, reason.clone()) {
                        Ok(()) => info!(%tenant_id, ?reason, "tenant debug enabled"),
                        Err(e) => warn!(%tenant_id, error = %e, "failed to enable tenant debug"),
                    }
                }
                Err(e) => warn!(target, error = %e, "could not parse tenant target"),
            }
            DispatchOutcome::Handled
        }

        Command::TenantManage => {
            match TenantId::normalize(target) {
                Ok(tenant_id) => {
                    if let Err(e) = debug_store.disable_tenant_debug(tenant_id) {
                        warn!(%tenant_id, error = %e, "failed to clear tenant debug flag");
                    } else {
                        info!(%tenant_id, "tenant debug cleared");
                    }
                }
                Err(e) => warn!(target, error = %e, "could not parse tenant target"),
            }
            DispatchOutcome::Handled
        }

        Command::GlobalDebug => {
            let reason = body_str(event, "reason").map(str::to_string);
            match event.body().get("enabled") {
                Some(v @ (Value::Bool(_) | Value::Number(_))) if is_truthy(Some(v)) => {
                    match debug_store.enable_global_debug(reason.clone()) {
                        Ok(()) => info!(?reason, "global debug enabled"),
                        Err(e) => warn!(error = %e, "failed to enable global debug"),
                    }
                }
                Some(Value::Bool(_) | Value::Number(_)) => match debug_store.disable_global_debug() {
                    Ok(()) => info!("global debug disabled"),
                    Err(e) => warn!(error = %e, "failed to disable global debug"),
                },
                other => warn!(?other, "GLOBAL_DEBUG with no recognizable `enabled` field"),
            }
            DispatchOutcome::Handled
        }

        Command::ConfigReload => {
            match reload_config() {
                Ok(config) => info!(?config, "configuration reloaded"),
                Err(e) => warn!(error = %e, "configuration reload failed"),
            }
            DispatchOutcome::Handled
        }

        Command::RouterUpdate => re_enter(target, event, Kind::Update),
        Command::RouterRebuild => re_enter(target, event, Kind::Rebuild),
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

fn with_router_target(event: &Event, f: impl FnOnce(RouterId)) {
    let Some(raw) = body_str(event, "router_id") else {
        warn!("command missing body.router_id");
        return;
    };
    if is_wildcard(raw) {
        warn!("rejecting router command against a wildcard router_id");
        return;
    }
    match RouterId::normalize(raw) {
        Ok(router_id) => f(router_id),
        Err(e) => warn!(raw, error = %e, "could not parse router_id"),
    }
}

fn re_enter(target: &str, event: &Event, crud: Kind) -> DispatchOutcome {
    debug!(target, ?crud, "synthesizing event from command");
    DispatchOutcome::ReEnter(target.to_string(), event.derive(crud, Map::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_store::InMemoryDebugStore;
    use crate::tenant_manager::SmFactory;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn command_event(tenant: TenantId, router: Option<RouterId>, command: &str, extra: Map<String, Value>) -> Event {
        let mut body = extra;
        body.insert("command".to_string(), Value::String(command.to_string()));
        if let Some(router) = router {
            body.insert("router_id".to_string(), Value::String(router.to_string()));
        }
        Event::new(tenant, None, Kind::Command, body)
    }

    fn sm_factory() -> Arc<SmFactory> {
        Arc::new(|tenant_id, router_id, _threshold| {
            Arc::new(Mutex::new(crate::state_machine::fakes::FakeStateMachine::new(tenant_id, router_id)))
                as crate::scheduler::SmHandle
        })
    }

    fn no_reload() -> impl Fn() -> Result<Config, ConfigError> {
        || Err(ConfigError::Validation { field: "n/a".into(), reason: "no reload wired in test".into() })
    }

    #[test]
    fn router_debug_rejects_wildcard_router_id() {
        let store = InMemoryDebugStore::new();
        let registry = TenantManagerRegistry::new(sm_factory(), 100, 5);
        let pool = crate::scheduler::WorkerPool::start(
            1,
            std::time::Duration::from_millis(50),
            std::time::Duration::from_millis(50),
            Arc::new(InMemoryDebugStore::new()),
            Arc::new(|| Box::new(crate::state_machine::fakes::FakeWorkerContext::default()) as Box<dyn crate::state_machine::WorkerContext>),
        );
        let tenant = TenantId::generate();
        let mut body = Map::new();
        body.insert("router_id".to_string(), Value::String("*".to_string()));
        let event = command_event(tenant, None, "ROUTER_DEBUG", body);

        dispatch_command("t1", &event, &store, &registry, &pool, &no_reload());
        assert!(store.routers_in_debug().unwrap().is_empty());
        pool.shutdown();
    }

    #[test]
    fn router_update_synthesizes_reentry_event() {
        let store = InMemoryDebugStore::new();
        let registry = TenantManagerRegistry::new(sm_factory(), 100, 5);
        let pool = crate::scheduler::WorkerPool::start(
            1,
            std::time::Duration::from_millis(50),
            std::time::Duration::from_millis(50),
            Arc::new(InMemoryDebugStore::new()),
            Arc::new(|| Box::new(crate::state_machine::fakes::FakeWorkerContext::default()) as Box<dyn crate::state_machine::WorkerContext>),
        );
        let tenant = TenantId::generate();
        let router = RouterId::generate();
        let event = command_event(tenant, Some(router), "ROUTER_REBUILD", Map::new());

        match dispatch_command("t1", &event, &store, &registry, &pool, &no_reload()) {
            DispatchOutcome::ReEnter(target, derived) => {
                assert_eq!(target, "t1");
                assert_eq!(derived.kind(), Kind::Rebuild);
                assert_eq!(derived.tenant_id(), tenant);
            }
            DispatchOutcome::Handled => panic!("expected re-entry"),
        }
        pool.shutdown();
    }

    #[test]
    fn unknown_command_is_a_warn_only_no_op() {
        let store = InMemoryDebugStore::new();
        let registry = TenantManagerRegistry::new(sm_factory(), 100, 5);
        let pool = crate::scheduler::WorkerPool::start(
            1,
            std::time::Duration::from_millis(50),
            std::time::Duration::from_millis(50),
            Arc::new(InMemoryDebugStore::new()),
            Arc::new(|| Box::new(crate::state_machine::fakes::FakeWorkerContext::default()) as Box<dyn crate::state_machine::WorkerContext>),
        );
        let tenant = TenantId::generate();
        let event = command_event(tenant, None, "NOT_A_REAL_COMMAND", Map::new());
        assert!(matches!(
            dispatch_command("t1", &event, &store, &registry, &pool, &no_reload()),
            DispatchOutcome::Handled
        ));
        pool.shutdown();
    }
}
