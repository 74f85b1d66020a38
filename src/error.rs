//! Error taxonomy for the dispatch engine: one `thiserror` enum per seam,
//! composed into an umbrella error at the top for startup/shutdown
//! reporting.

use thiserror::Error;

use crate::ids::RouterId;

/// Errors from a [`crate::debug_store::DebugStore`] implementation.
///
/// A debug-store failure is fail-closed: the caller drops the event rather
/// than risk processing it while unable to confirm debug state.
#[derive(Debug, Error)]
pub enum DebugStoreError {
    /// The backing store (file system, database) could not be reached or
    /// returned a malformed response.
    #[error("debug store backend error: {0}")]
    Backend(String),
}

/// Errors raised while a [`crate::state_machine::RouterStateMachine`]
/// executes `update`. Treated uniformly by the worker loop: logged, the
/// state machine keeps running, and progress is retried on the next
/// dequeue if it still has work.
#[derive(Debug, Error)]
#[error("state machine update failed for router {router_id}: {source}")]
pub struct SmError {
    /// The router whose update failed.
    pub router_id: RouterId,
    /// The underlying failure. Opaque to the engine by design: the state
    /// machine itself is a black box.
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl SmError {
    /// Wraps an arbitrary error as an `SmError` for `router_id`.
    pub fn new(router_id: RouterId, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            router_id,
            source: Box::new(source),
        }
    }
}

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file was not valid TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field failed validation.
    #[error("invalid configuration: {field} - {reason}")]
    Validation {
        /// Name of the offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Top-level engine error, surfaced only at startup/shutdown boundaries.
/// Per-event failures never propagate this far: there is no return channel
/// back to the event producer.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The debug store could not be initialized.
    #[error("debug store initialization failed: {0}")]
    DebugStore(#[from] DebugStoreError),
}
