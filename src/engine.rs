//! Top-level wiring: `handle_message`, `should_process`, and the shutdown
//! sequence. Everything else in this crate is a collaborator this type owns
//! and coordinates; nothing here does I/O beyond what `DebugStore`,
//! `WorkerContext`, and `RouterStateMachine` implementations do on its
//! behalf.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::debug_store::DebugStore;
use crate::dispatcher::{dispatch_command, DispatchOutcome};
use crate::error::ConfigError;
use crate::event::{Event, Kind};
use crate::router_cache::TenantRouterCache;
use crate::scheduler::{WorkerPool, DEFAULT_DEQUEUE_TIMEOUT, DEFAULT_JOIN_TIMEOUT};
use crate::state_machine::WorkerContext;
use crate::tenant_manager::{SmFactory, TenantManagerRegistry};
use crate::transport::{Delivery, Transport};

/// The running dispatch-and-execution engine.
pub struct Engine {
    config_path: Option<PathBuf>,
    debug_store: Arc<dyn DebugStore>,
    tenant_cache: TenantRouterCache,
    registry: TenantManagerRegistry,
    worker_pool: Arc<WorkerPool>,
    ingress_context: Mutex<Box<dyn WorkerContext>>,
    shut_down: AtomicBool,
}

impl Engine {
    /// Builds and starts the engine: spins up the worker pool immediately,
    /// the way [`WorkerPool::start`] starts its threads at construction.
    pub fn start(
        config: &Config,
        config_path: Option<PathBuf>,
        debug_store: Arc<dyn DebugStore>,
        sm_factory: Arc<SmFactory>,
        context_factory: Arc<dyn Fn() -> Box<dyn WorkerContext> + Send + Sync>,
    ) -> Self {
        let worker_pool = WorkerPool::start(
            config.num_workers,
            DEFAULT_DEQUEUE_TIMEOUT,
            DEFAULT_JOIN_TIMEOUT,
            Arc::clone(&debug_store),
            Arc::clone(&context_factory),
        );
        let registry = TenantManagerRegistry::new(
            sm_factory,
            config.queue_warning_threshold,
            config.reboot_error_threshold,
        );
        Self {
            config_path,
            debug_store,
            tenant_cache: TenantRouterCache::new(),
            registry,
            worker_pool,
            ingress_context: Mutex::new(context_factory()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// The ingress loop: pulls deliveries from `transport` and feeds them
    /// to [`Engine::handle_message`] until the transport yields
    /// [`Delivery::Shutdown`] or is torn down out from under it.
    pub fn run(&self, transport: &mut dyn Transport) {
        loop {
            match transport.recv() {
                Ok(delivery) => {
                    let is_shutdown = matches!(delivery, Delivery::Shutdown);
                    self.handle_message(delivery);
                    if is_shutdown {
                        return;
                    }
                }
                Err(_) => {
                    warn!("transport closed without an explicit shutdown signal");
                    self.shutdown();
                    return;
                }
            }
        }
    }

    /// The single entry point the ingress loop feeds every delivery
    /// through.
    pub fn handle_message(&self, delivery: Delivery) {
        match delivery {
            Delivery::Shutdown => self.shutdown(),
            Delivery::Message { target, event } => {
                if event.kind() == Kind::Command {
                    self.dispatch(&target, &event);
                    return;
                }
                let Some(event) = self.should_process(event) else {
                    return;
                };
                self.deliver(&target, &event);
            }
        }
    }

    fn dispatch(&self, target: &str, event: &Event) {
        let reload = |config_path: &Option<PathBuf>| -> Result<Config, ConfigError> {
            match config_path {
                Some(path) => Config::load(path),
                None => Config::from_env(),
            }
        };
        let outcome = dispatch_command(
            target,
            event,
            self.debug_store.as_ref(),
            &self.registry,
            self.worker_pool.as_ref(),
            &|| reload(&self.config_path),
        );
        if let DispatchOutcome::ReEnter(target, derived) = outcome {
            self.handle_message(Delivery::Message { target, event: derived });
        }
    }

    /// Global/tenant/router debug filtering, then router-id resolution via
    /// the tenant cache.
    fn should_process(&self, event: Event) -> Option<Event> {
        match self.debug_store.global_debug() {
            Ok((true, reason)) => {
                debug!(?reason, "dropping event, global debug active");
                return None;
            }
            Ok((false, _)) => {}
            Err(e) => {
                error!(error = %e, "debug store failure, dropping event (fail-closed)");
                return None;
            }
        }

        match self.debug_store.tenant_in_debug(event.tenant_id()) {
            Ok((true, reason)) => {
                debug!(tenant = %event.tenant_id(), ?reason, "dropping event, tenant debug active");
                return None;
            }
            Ok((false, _)) => {}
            Err(e) => {
                error!(error = %e, "debug store failure, dropping event (fail-closed)");
                return None;
            }
        }

        if let Some(router_id) = event.router_id() {
            return match self.debug_store.router_in_debug(router_id) {
                Ok((true, reason)) => {
                    debug!(%router_id, ?reason, "dropping event, router debug active");
                    None
                }
                Ok((false, _)) => Some(event),
                Err(e) => {
                    error!(error = %e, "debug store failure, dropping event (fail-closed)");
                    None
                }
            };
        }

        let mut ctx = self.ingress_context.lock();
        match self.tenant_cache.get_by_tenant(event.tenant_id(), &mut **ctx) {
            Ok(Some(router_id)) => Some(event.with_router_id(router_id)),
            Ok(None) => {
                warn!(tenant = %event.tenant_id(), "no router for tenant, dropping event");
                None
            }
            Err(e) => {
                error!(tenant = %event.tenant_id(), error = %e, "router lookup failed, dropping event");
                None
            }
        }
    }

    /// Routes `event` through the tenant manager and enqueues the
    /// resulting state machine(s), all under `deliver_lock`.
    fn deliver(&self, target: &str, event: &Event) {
        let _guard = self.worker_pool.deliver_lock().lock();
        let managers = match self.registry.resolve(target) {
            Ok(managers) => managers,
            Err(e) => {
                warn!(target, error = %e, "could not resolve delivery target");
                return;
            }
        };
        for trm in managers {
            for sm in trm.get_state_machines(event) {
                let wants_execution = sm.lock().send_message(event);
                if wants_execution {
                    self.worker_pool.enqueue_if_idle(sm);
                }
            }
        }
    }

    /// Shutdown sequence. Signaling the transport to stop producing new
    /// deliveries is the caller's responsibility, since the transport lives
    /// outside this crate's scope.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            debug!("shutdown already in progress, ignoring duplicate signal");
            return;
        }
        info!(
            tenant_count = self.registry.tenant_count(),
            threads = ?self.worker_pool.thread_status(),
            "shutdown requested"
        );
        self.worker_pool.shutdown();
        let _guard = self.worker_pool.deliver_lock().lock();
        self.registry.shutdown_all();
        info!("shutdown complete");
    }
}
