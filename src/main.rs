//! `routerd` — runs the dispatch-and-execution engine as a standalone
//! service, or manipulates the debug store directly for operators.
//!
//! The engine core runs on ordinary OS threads rather than async tasks (see
//! [`routerd::scheduler`] for why); this binary is a thin, synchronous shell
//! around it. The only async code here is a one-off Tokio runtime used
//! solely to await `Ctrl+C`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use parking_lot::Mutex as SyncMutex;
use tracing::{error, info};

use routerd::config::Config;
use routerd::debug_store::{DebugStore, InMemoryDebugStore, SqliteDebugStore};
use routerd::demo::{NoopStateMachine, NoopWorkerContext};
use routerd::engine::Engine;
use routerd::error::EngineError;
use routerd::scheduler::SmHandle;
use routerd::state_machine::WorkerContext;
use routerd::tenant_manager::SmFactory;
use routerd::transport::ChannelTransport;

#[derive(Parser)]
#[command(name = "routerd", version, about = "Tenant-router dispatch-and-execution engine")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Runs the engine until interrupted.
    Serve {
        /// Path to a TOML configuration file. Falls back to environment
        /// variables and defaults if omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Path to a SQLite debug-store database. Falls back to an
        /// in-memory store (lost on restart) if omitted.
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Reads or mutates the debug store directly, without going through a
    /// running engine's command dispatcher.
    Debug {
        /// Path to the SQLite debug-store database.
        #[arg(long)]
        db: PathBuf,
        #[arg(value_enum)]
        scope: DebugScope,
        /// Tenant or router id, as a UUID (any dash placement). Ignored
        /// for `global`.
        id: Option<String>,
        /// Clears the flag instead of setting it.
        #[arg(long)]
        disable: bool,
        /// Human-readable reason recorded alongside the flag.
        #[arg(long)]
        reason: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DebugScope {
    Router,
    Tenant,
    Global,
}

fn main() -> ExitCode {
    if let Err(e) = routerd::observability::init_tracing() {
        eprintln!("failed to initialize logging: {e}");
    }

    let cli = Cli::parse();
    let result = match cli.command {
        CliCommand::Serve { config, db } => run_serve(config, db),
        CliCommand::Debug {
            db,
            scope,
            id,
            disable,
            reason,
        } => run_debug(&db, scope, id.as_deref(), disable, reason),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn run_serve(config_path: Option<PathBuf>, db_path: Option<PathBuf>) -> Result<(), EngineError> {
    let config = match &config_path {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    let debug_store: Arc<dyn DebugStore> = match &db_path {
        Some(path) => Arc::new(SqliteDebugStore::open(path)?),
        None => Arc::new(InMemoryDebugStore::new()),
    };

    info!(host = %config.host, num_workers = config.num_workers, "starting engine");

    let sm_factory: Arc<SmFactory> = Arc::new(|tenant_id, router_id, _reboot_error_threshold| {
        Arc::new(SyncMutex::new(NoopStateMachine::new(tenant_id, router_id))) as SmHandle
    });
    let context_factory: Arc<dyn Fn() -> Box<dyn WorkerContext> + Send + Sync> =
        Arc::new(|| Box::new(NoopWorkerContext) as Box<dyn WorkerContext>);

    let engine = Arc::new(Engine::start(
        &config,
        config_path,
        debug_store,
        sm_factory,
        context_factory,
    ));

    let (transport_handle, mut transport) = ChannelTransport::pair();
    let ingress_engine = Arc::clone(&engine);
    let ingress_thread = std::thread::Builder::new()
        .name("routerd-ingress".to_string())
        .spawn(move || ingress_engine.run(&mut transport))
        .map_err(|e| EngineError::DebugStore(routerd::error::DebugStoreError::Backend(e.to_string())))?;

    let rt = tokio::runtime::Runtime::new().map_err(|e| {
        EngineError::DebugStore(routerd::error::DebugStoreError::Backend(e.to_string()))
    })?;
    rt.block_on(async {
        let _ = tokio::signal::ctrl_c().await;
    });

    info!("received shutdown signal");
    transport_handle.shutdown();
    let _ = ingress_thread.join();
    Ok(())
}

fn run_debug(
    db_path: &std::path::Path,
    scope: DebugScope,
    id: Option<&str>,
    disable: bool,
    reason: Option<String>,
) -> Result<(), EngineError> {
    let store = SqliteDebugStore::open(db_path)?;

    match scope {
        DebugScope::Global => {
            if disable {
                store.disable_global_debug()?;
                info!("global debug disabled");
            } else {
                store.enable_global_debug(reason)?;
                info!("global debug enabled");
            }
        }
        DebugScope::Tenant => {
            let id = id.ok_or_else(|| routerd::error::ConfigError::Validation {
                field: "id".to_string(),
                reason: "tenant id is required for `debug tenant`".to_string(),
            })?;
            let tenant_id = routerd::ids::TenantId::normalize(id).map_err(|e| routerd::error::ConfigError::Validation {
                field: "id".to_string(),
                reason: e.to_string(),
            })?;
            if disable {
                store.disable_tenant_debug(tenant_id)?;
                info!(%tenant_id, "tenant debug disabled");
            } else {
                store.enable_tenant_debug(tenant_id, reason)?;
                info!(%tenant_id, "tenant debug enabled");
            }
        }
        DebugScope::Router => {
            let id = id.ok_or_else(|| routerd::error::ConfigError::Validation {
                field: "id".to_string(),
                reason: "router id is required for `debug router`".to_string(),
            })?;
            let router_id = routerd::ids::RouterId::normalize(id).map_err(|e| routerd::error::ConfigError::Validation {
                field: "id".to_string(),
                reason: e.to_string(),
            })?;
            if disable {
                store.disable_router_debug(router_id)?;
                info!(%router_id, "router debug disabled");
            } else {
                store.enable_router_debug(router_id, reason)?;
                info!(%router_id, "router debug enabled");
            }
        }
    }
    Ok(())
}
