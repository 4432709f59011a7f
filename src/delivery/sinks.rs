//! Delivery sink contracts and the directory export sink.
//!
//! Sinks are called from a blocking worker, never from the poll loop, so
//! they may take as long as their transport needs.

use super::{DeliveryError, ExportFileSet};
use std::path::{Path, PathBuf};

/// How a sink finished a hand-off that did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    Delivered,
    /// The user backed out of the hand-off.
    Cancelled,
}

/// Streams a block to a relay.
pub trait NetworkSink: Send + Sync {
    fn deliver_network(
        &self,
        bytes: &[u8],
        recipient_key: &str,
        block_label: &str,
    ) -> Result<SinkOutcome, DeliveryError>;
}

/// Hands a staged file set to whatever exports it off the device.
pub trait LocalExportSink: Send + Sync {
    fn deliver_local(&self, files: &ExportFileSet) -> Result<SinkOutcome, DeliveryError>;
}

/// Copies staged files into an output directory.
#[derive(Debug, Clone)]
pub struct DirectoryExportSink {
    output_dir: PathBuf,
}

impl DirectoryExportSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl LocalExportSink for DirectoryExportSink {
    fn deliver_local(&self, files: &ExportFileSet) -> Result<SinkOutcome, DeliveryError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            DeliveryError::ExportWrite(format!("{}: {e}", self.output_dir.display()))
        })?;

        for path in files.paths() {
            let Some(name) = path.file_name() else {
                return Err(DeliveryError::ExportWrite(format!(
                    "{}: not a file path",
                    path.display()
                )));
            };
            let target = self.output_dir.join(name);
            std::fs::copy(path, &target).map_err(|e| {
                DeliveryError::ExportWrite(format!("{}: {e}", target.display()))
            })?;
        }

        tracing::info!(
            label = %files.label,
            dir = %self.output_dir.display(),
            "Exported block files"
        );
        Ok(SinkOutcome::Delivered)
    }
}
