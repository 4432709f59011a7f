//! Block delivery.
//!
//! A completed block leaves the session by one of two routes chosen once
//! per session: streamed to a relay (network mode) or written to files and
//! handed to an export sink (local mode). The [`DeliveryRouter`] is the error
//! boundary: whatever a sink does, the controller only ever receives a
//! [`DeliveryResult`].

mod export;
mod relay;
mod router;
mod sinks;

pub use export::{render_auxiliary_csv, stage_block, ExportFile, ExportFileSet, ExportKind};
pub use relay::TcpRelaySink;
pub use router::{CompletedDelivery, DeliveryJob, DeliveryRouter, Sinks};
pub use sinks::{DirectoryExportSink, LocalExportSink, NetworkSink, SinkOutcome};

use crate::config::{ConfigError, DeliveryMode};
use thiserror::Error;

/// Why a delivery did not complete.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network send failed. Soft: logged, session continues.
    #[error("transport error: {0}")]
    Transport(String),
    /// Writing export files failed. Soft: reported, block retained.
    #[error("export write error: {0}")]
    ExportWrite(String),
    /// Delivery cannot be attempted with the given configuration.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    /// No sink was supplied for the session's delivery mode.
    #[error("no sink configured for {0} delivery")]
    SinkUnavailable(DeliveryMode),
}

/// Terminal outcome of one delivery.
#[derive(Debug, Clone)]
pub enum DeliveryResult {
    Delivered,
    Failed(DeliveryError),
    /// The user dismissed the external hand-off.
    Cancelled,
}

impl DeliveryResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryResult::Delivered)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DeliveryResult::Failed(_))
    }
}

impl From<Result<SinkOutcome, DeliveryError>> for DeliveryResult {
    fn from(result: Result<SinkOutcome, DeliveryError>) -> Self {
        match result {
            Ok(SinkOutcome::Delivered) => DeliveryResult::Delivered,
            Ok(SinkOutcome::Cancelled) => DeliveryResult::Cancelled,
            Err(e) => DeliveryResult::Failed(e),
        }
    }
}
