//! # routerd — tenant-router dispatch-and-execution engine
//!
//! Consumes lifecycle and configuration events about tenants' virtual
//! routers, coalesces them per router, and drives each router through a
//! (caller-supplied) reconciliation state machine while guaranteeing at
//! most one concurrent update per router, per-router event ordering, and
//! fair progress across tenants.
//!
//! State-machine bodies, the external compute/network APIs they call, the
//! message transport, and the debug-mode persistent store backend are all
//! external collaborators this crate only defines trait boundaries for —
//! see [`state_machine`], [`transport`], and [`debug_store`].

pub mod config;
pub mod debug_store;
pub mod demo;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod event;
pub mod ids;
pub mod observability;
pub mod router_cache;
pub mod scheduler;
pub mod state_machine;
pub mod tenant_manager;
pub mod transport;

pub use config::Config;
pub use engine::Engine;
pub use error::EngineError;
pub use event::{Command, Event, Kind};
pub use ids::{RouterId, TenantId};
pub use state_machine::{RouterStateMachine, WorkerContext};
pub use transport::{ChannelTransport, ChannelTransportHandle, Delivery, Transport};
