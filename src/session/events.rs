//! Observer-facing notifications.

use super::{BlockLabel, LifecycleState, StatsReport};
use crate::delivery::DeliveryResult;

/// Status line shown while blocks are being generated.
pub const STATUS_GENERATING: &str = "GENERATING ENTROPY";
/// Status line shown while the final network block is on its way.
pub const STATUS_FINISHING_UPLOAD: &str = "FINISHING UPLOAD";
/// Status line shown after a local export failed.
pub const STATUS_EXPORT_FAILED: &str = "EXPORT FAILED";
/// Status line shown when the final network block could not be sent.
pub const STATUS_FINAL_BLOCK_NOT_DELIVERED: &str = "FINAL BLOCK NOT DELIVERED";

/// Everything an observer (status line, renderer, metrics) can see.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(LifecycleState),
    Stats(StatsReport),
    Status(String),
    /// Fraction of a bounded session completed, in `[0, 1]`.
    Progress(f64),
    BlockHandedOff {
        index: u32,
        label: BlockLabel,
        bytes: usize,
    },
    DeliveryFinished {
        index: u32,
        label: BlockLabel,
        result: DeliveryResult,
    },
    /// `points` new walk points were appended; `total` is the new length.
    WalkExtended { points: usize, total: usize },
    /// No frame source; the session will never produce a block.
    CaptureUnavailable,
    Terminated,
}
