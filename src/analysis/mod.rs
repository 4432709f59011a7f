//! Block statistics and quality telemetry.
//!
//! The chi-square value is advisory: it colours the statistics report and
//! never gates delivery.

mod quality;
mod statistics;

pub use quality::{QualityMonitor, QualitySample};
pub use statistics::{bit_bias, byte_histogram, chi_square, BYTE_BINS};
