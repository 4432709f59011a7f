//! Prometheus telemetry for a running session.
//!
//! The [`MetricsRegistry`] is updated from [`crate::session::SessionEvent`]s
//! by the session runner. With the `metrics` feature, [`MetricsServer`]
//! exposes it over HTTP.
//!
//! # Metrics Exposed
//!
//! ## Collector
//! - `optical_entropy_buffer_position` - Bytes buffered in the extractor
//! - `optical_entropy_generated_bytes` - Total bytes assembled into blocks
//! - `optical_entropy_chi_square` - Chi-square of the latest block
//! - `optical_entropy_chi_warning` - Threshold exceeded (1=warning)
//! - `optical_entropy_rejected_frames` - Frames rejected by the extractor
//! - `optical_entropy_corrupt_pixel_percent` - Oversaturated pixels
//!
//! ## Lifecycle
//! - `optical_entropy_lifecycle_state` - Current lifecycle state code
//! - `optical_entropy_session_progress` - Bounded session progress
//! - `optical_entropy_walk_points` - Audit walk length
//! - `optical_entropy_capture_available` - Frame source present
//!
//! ## Delivery
//! - `optical_entropy_blocks_handed_off_total`
//! - `optical_entropy_blocks_delivered_total`
//! - `optical_entropy_blocks_failed_total`
//! - `optical_entropy_blocks_cancelled_total`

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
