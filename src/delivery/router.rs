//! Delivery routing.

use super::{stage_block, DeliveryError, DeliveryResult, LocalExportSink, NetworkSink};
use crate::config::{BlockTarget, DeliveryMode, SessionConfig};
use crate::session::{Block, BlockLabel};
use std::path::PathBuf;
use std::sync::Arc;

/// Sinks available to a session. Only the one matching the delivery mode
/// is required.
#[derive(Clone, Default)]
pub struct Sinks {
    pub network: Option<Arc<dyn NetworkSink>>,
    pub local: Option<Arc<dyn LocalExportSink>>,
}

impl Sinks {
    pub fn network(sink: Arc<dyn NetworkSink>) -> Self {
        Self {
            network: Some(sink),
            local: None,
        }
    }

    pub fn local(sink: Arc<dyn LocalExportSink>) -> Self {
        Self {
            network: None,
            local: Some(sink),
        }
    }
}

/// A drained block on its way to a sink. Owns the block.
#[derive(Debug)]
pub struct DeliveryJob {
    block: Block,
    label: BlockLabel,
}

impl DeliveryJob {
    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn label(&self) -> &BlockLabel {
        &self.label
    }
}

/// A finished delivery. The block comes back to the session whatever the
/// result, so a failed export never loses drained bytes.
#[derive(Debug)]
pub struct CompletedDelivery {
    pub block: Block,
    pub label: BlockLabel,
    pub result: DeliveryResult,
    /// Staged local-export files left on disk. Emptied once a hand-off is
    /// delivered; kept after a failure or cancel for retry or inspection.
    pub staged: Vec<PathBuf>,
}

/// Chooses the route for each block and converts sink errors into results.
pub struct DeliveryRouter {
    mode: DeliveryMode,
    target: BlockTarget,
    recipient_key: Option<String>,
    export_auxiliary_file: bool,
    label_prefix: String,
    staging_dir: PathBuf,
    sinks: Sinks,
}

impl std::fmt::Debug for DeliveryRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryRouter")
            .field("mode", &self.mode)
            .field("target", &self.target)
            .field("export_auxiliary_file", &self.export_auxiliary_file)
            .field("staging_dir", &self.staging_dir)
            .finish_non_exhaustive()
    }
}

impl DeliveryRouter {
    /// Builds a router, failing fast if the mode cannot be served.
    pub fn new(config: &SessionConfig, sinks: Sinks) -> Result<Self, DeliveryError> {
        let recipient_key = match config.delivery_mode {
            DeliveryMode::Network => {
                let key = config.require_recipient()?.to_string();
                if sinks.network.is_none() {
                    return Err(DeliveryError::SinkUnavailable(DeliveryMode::Network));
                }
                Some(key)
            }
            DeliveryMode::Local => {
                if sinks.local.is_none() {
                    return Err(DeliveryError::SinkUnavailable(DeliveryMode::Local));
                }
                None
            }
        };

        Ok(Self {
            mode: config.delivery_mode,
            target: config.block_target,
            recipient_key,
            export_auxiliary_file: config.export_auxiliary_file,
            label_prefix: config.label_prefix.clone(),
            staging_dir: config.staging_dir.clone(),
            sinks,
        })
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Local exports stop the frame source while files are written.
    pub fn pauses_capture(&self) -> bool {
        self.mode == DeliveryMode::Local
    }

    /// Whether `block_index` is the session's final block.
    pub fn is_last_block(&self, block_index: u32) -> bool {
        self.target.is_last(block_index)
    }

    /// Progress after handing off `block_index`; `None` when unlimited.
    pub fn progress(&self, block_index: u32) -> Option<f64> {
        self.target.progress(block_index)
    }

    /// Takes ownership of a drained block and labels it for delivery.
    pub fn prepare(&self, block: Block) -> DeliveryJob {
        let label = block.label(&self.label_prefix);
        DeliveryJob { block, label }
    }

    /// Runs the delivery to completion. Blocking; never panics on sink errors.
    pub fn execute(&self, job: DeliveryJob) -> CompletedDelivery {
        let DeliveryJob { block, label } = job;
        let mut staged = Vec::new();

        let result: DeliveryResult = match self.mode {
            DeliveryMode::Network => self.send_network(&block, &label).into(),
            DeliveryMode::Local => self.export_local(&block, &label, &mut staged).into(),
        };

        match &result {
            DeliveryResult::Delivered => {
                tracing::info!(block = block.index(), label = %label, mode = %self.mode, "Block delivered");
                discard_staged(&mut staged);
            }
            DeliveryResult::Cancelled => {
                tracing::info!(block = block.index(), label = %label, "Block hand-off cancelled");
            }
            DeliveryResult::Failed(e) => {
                tracing::warn!(block = block.index(), label = %label, error = %e, "Block delivery failed");
            }
        }

        CompletedDelivery {
            block,
            label,
            result,
            staged,
        }
    }

    fn send_network(
        &self,
        block: &Block,
        label: &BlockLabel,
    ) -> Result<super::SinkOutcome, DeliveryError> {
        let sink = self
            .sinks
            .network
            .as_ref()
            .ok_or(DeliveryError::SinkUnavailable(DeliveryMode::Network))?;
        let recipient = self
            .recipient_key
            .as_deref()
            .ok_or(crate::config::ConfigError::MissingRecipientKey)?;
        sink.deliver_network(block.bytes(), recipient, label.as_str())
    }

    fn export_local(
        &self,
        block: &Block,
        label: &BlockLabel,
        staged: &mut Vec<PathBuf>,
    ) -> Result<super::SinkOutcome, DeliveryError> {
        let sink = self
            .sinks
            .local
            .as_ref()
            .ok_or(DeliveryError::SinkUnavailable(DeliveryMode::Local))?;
        let files = stage_block(block, label, self.export_auxiliary_file, &self.staging_dir)?;
        staged.extend(files.paths().map(PathBuf::from));
        sink.deliver_local(&files)
    }
}

/// Removes staged files whose contents the sink now owns.
fn discard_staged(staged: &mut Vec<PathBuf>) {
    for path in staged.drain(..) {
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "Could not remove staged file");
        }
    }
}
