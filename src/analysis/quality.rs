//! Chi-square warning.

use serde::{Deserialize, Serialize};

/// Point-in-time reading of extractor and collector counters.
///
/// Never persisted; it drives the statistics report and the warning.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QualitySample {
    pub chi_square: f64,
    pub rejected_frames: u64,
    pub corrupt_pixel_percent: f64,
    pub buffer_position: u64,
    pub total_generated: u64,
}

impl QualitySample {
    /// True once the collector has produced its first statistic.
    pub fn has_chi(&self) -> bool {
        self.chi_square > 0.0
    }
}

/// Compares the latest chi-square against the configured threshold.
///
/// Stateless: every sample is judged on its own. The warning is a
/// presentation hint and never stops generation or rejects a block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityMonitor {
    enabled: bool,
    threshold: f64,
}

impl QualityMonitor {
    pub fn new(enabled: bool, threshold: f64) -> Self {
        Self { enabled, threshold }
    }

    pub fn is_warning(&self, sample: &QualitySample) -> bool {
        self.enabled && sample.chi_square > self.threshold
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
