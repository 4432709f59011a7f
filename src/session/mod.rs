//! Block lifecycle: readiness, hand-off, continuation and termination.
//!
//! The [`BlockLifecycleController`] owns all session state and is driven
//! from exactly one context. The [`SessionRunner`] provides that context
//! for a live session: it polls the pipeline, executes deliveries off the
//! poll loop and feeds their outcomes back.

mod block;
mod controller;
mod events;
mod report;
mod runner;
mod state;

pub use block::{Block, BlockLabel};
pub use controller::{Action, BlockLifecycleController, LifecycleState};
pub use events::{
    SessionEvent, STATUS_EXPORT_FAILED, STATUS_FINAL_BLOCK_NOT_DELIVERED, STATUS_FINISHING_UPLOAD,
    STATUS_GENERATING,
};
pub use report::StatsReport;
pub use runner::{SessionCommand, SessionRunner, SessionSummary};
pub use state::{DeliveryCounts, RenderSnapshot, Session};

use crate::config::ConfigError;
use crate::delivery::DeliveryError;
use thiserror::Error;

/// Errors that prevent a session from starting.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("delivery setup failed: {0}")]
    Delivery(#[from] DeliveryError),
}
