//! Session gauges and counters.

use crate::delivery::DeliveryResult;
use crate::session::{LifecycleState, SessionEvent};
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus registry fed from session events.
pub struct MetricsRegistry {
    registry: Registry,

    // Collector counters
    buffer_position: IntGauge,
    generated_bytes: IntGauge,
    chi_square: Gauge,
    chi_warning: IntGauge,
    rejected_frames: IntGauge,
    corrupt_pixel_percent: Gauge,

    // Lifecycle
    lifecycle_state: IntGauge,
    progress: Gauge,
    walk_points: IntGauge,
    capture_available: IntGauge,

    // Delivery
    blocks_handed_off: IntCounter,
    blocks_delivered: IntCounter,
    blocks_failed: IntCounter,
    blocks_cancelled: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all session metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let buffer_position = IntGauge::new(
            "optical_entropy_buffer_position",
            "Bytes currently buffered in the extractor",
        )?;
        let generated_bytes = IntGauge::new(
            "optical_entropy_generated_bytes",
            "Total entropy bytes assembled into blocks",
        )?;
        let chi_square = Gauge::new(
            "optical_entropy_chi_square",
            "Chi-square statistic of the latest block",
        )?;
        let chi_warning = IntGauge::new(
            "optical_entropy_chi_warning",
            "Chi-square above the warning threshold (1=warning)",
        )?;
        let rejected_frames = IntGauge::new(
            "optical_entropy_rejected_frames",
            "Frames rejected by the extractor",
        )?;
        let corrupt_pixel_percent = Gauge::new(
            "optical_entropy_corrupt_pixel_percent",
            "Oversaturated pixels in the latest frame (percent)",
        )?;

        let lifecycle_state = IntGauge::new(
            "optical_entropy_lifecycle_state",
            "Lifecycle state (0=generating 1=ready 2=delivering 3=awaiting 4=failed 5=terminated)",
        )?;
        let progress = Gauge::new(
            "optical_entropy_session_progress",
            "Fraction of a bounded session completed",
        )?;
        let walk_points = IntGauge::new(
            "optical_entropy_walk_points",
            "Points in the audit random walk",
        )?;
        let capture_available = IntGauge::new(
            "optical_entropy_capture_available",
            "Frame source present (1=available)",
        )?;

        let blocks_handed_off = IntCounter::new(
            "optical_entropy_blocks_handed_off_total",
            "Blocks handed to a delivery sink",
        )?;
        let blocks_delivered = IntCounter::new(
            "optical_entropy_blocks_delivered_total",
            "Blocks delivered successfully",
        )?;
        let blocks_failed = IntCounter::new(
            "optical_entropy_blocks_failed_total",
            "Block deliveries that failed",
        )?;
        let blocks_cancelled = IntCounter::new(
            "optical_entropy_blocks_cancelled_total",
            "Block hand-offs cancelled by the user",
        )?;
        capture_available.set(1);

        registry.register(Box::new(buffer_position.clone()))?;
        registry.register(Box::new(generated_bytes.clone()))?;
        registry.register(Box::new(chi_square.clone()))?;
        registry.register(Box::new(chi_warning.clone()))?;
        registry.register(Box::new(rejected_frames.clone()))?;
        registry.register(Box::new(corrupt_pixel_percent.clone()))?;
        registry.register(Box::new(lifecycle_state.clone()))?;
        registry.register(Box::new(progress.clone()))?;
        registry.register(Box::new(walk_points.clone()))?;
        registry.register(Box::new(capture_available.clone()))?;
        registry.register(Box::new(blocks_handed_off.clone()))?;
        registry.register(Box::new(blocks_delivered.clone()))?;
        registry.register(Box::new(blocks_failed.clone()))?;
        registry.register(Box::new(blocks_cancelled.clone()))?;

        Ok(Self {
            registry,
            buffer_position,
            generated_bytes,
            chi_square,
            chi_warning,
            rejected_frames,
            corrupt_pixel_percent,
            lifecycle_state,
            progress,
            walk_points,
            capture_available,
            blocks_handed_off,
            blocks_delivered,
            blocks_failed,
            blocks_cancelled,
        })
    }

    /// Updates metrics from one session event.
    pub fn observe(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Stats(report) => {
                // Suppressed counters read as zero.
                self.buffer_position
                    .set(gauge_value(report.buffer_position.unwrap_or(0)));
                self.generated_bytes
                    .set(gauge_value(report.total_generated.unwrap_or(0)));
                self.rejected_frames
                    .set(gauge_value(report.rejected_frames.unwrap_or(0)));
                self.corrupt_pixel_percent
                    .set(report.corrupt_pixel_percent.unwrap_or(0.0));
                if let Some(chi) = report.chi_square {
                    self.chi_square.set(chi);
                }
                self.chi_warning.set(i64::from(report.chi_warning));
            }
            SessionEvent::StateChanged(state) => self.lifecycle_state.set(state_code(*state)),
            SessionEvent::Progress(p) => self.progress.set(*p),
            SessionEvent::WalkExtended { total, .. } => {
                self.walk_points.set(gauge_value(*total as u64));
            }
            SessionEvent::BlockHandedOff { .. } => self.blocks_handed_off.inc(),
            SessionEvent::DeliveryFinished { result, .. } => match result {
                DeliveryResult::Delivered => self.blocks_delivered.inc(),
                DeliveryResult::Failed(_) => self.blocks_failed.inc(),
                DeliveryResult::Cancelled => self.blocks_cancelled.inc(),
            },
            SessionEvent::CaptureUnavailable => self.capture_available.set(0),
            SessionEvent::Status(_) | SessionEvent::Terminated => {}
        }
    }

    /// For registering extra collectors alongside the session ones.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every registered family.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn gauge_value(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn state_code(state: LifecycleState) -> i64 {
    match state {
        LifecycleState::Generating => 0,
        LifecycleState::BlockReady => 1,
        LifecycleState::Delivering { .. } => 2,
        LifecycleState::AwaitingContinuation => 3,
        LifecycleState::Failed { .. } => 4,
        LifecycleState::Terminating => 5,
    }
}
