//! Composition layer of the cardlink agent.
//!
//! The agent bridges a keyboard-wedge card scanner and the backend: the
//! backend asks for a scan over the broker, the agent waits for the next
//! card on the scanner and publishes what it read.
//!
//! # Components
//!
//! - [`Orchestrator`]: scan commands in, card reads and results out.
//! - [`AgentObserver`]: the seam a UI plugs into; [`LogObserver`] logs.
//! - [`probe`]: backend reachability, reported apart from the broker.
//! - [`ConfigWatcher`]: picks up reader assignments made after startup.
//! - [`Services`]: everything above, stopped in dependency order.

pub mod config_watch;
pub mod error;
pub mod observer;
pub mod orchestrator;
pub mod probe;
pub mod services;

pub use config_watch::ConfigWatcher;
pub use error::{AgentError, Result};
pub use observer::{AgentObserver, LogObserver, NoopObserver};
pub use orchestrator::{Orchestrator, OrchestratorConfig, SCAN_TIMEOUT_ERROR};
pub use probe::{BackendStatus, ReachabilityProbe, TcpProbe};
pub use services::Services;
