//! Recurring, prompt-driven automations.
//!
//! - [`trigger`] decides when an intention is due.
//! - [`store`] holds definitions and the in-flight set.
//! - [`runner`] relays one execution's chunks to the event channel.
//! - [`daemon`] polls for due intentions and launches runs.

pub mod daemon;
pub mod runner;
pub mod store;
pub mod trigger;

pub use daemon::IntentionDaemon;
pub use runner::{ExecutionRunner, RunSummary};
pub use store::IntentionStore;
