//! Block assembly and per-block statistics.
//!
//! The session observes a collector only through the [`Collector`]
//! contract. Quality gating of blocks, if any, is the collector's business;
//! the session treats its chi-square value as advisory telemetry.

use crate::analysis::chi_square;
use crate::config::ConfigError;
use crate::extraction::FrameOutcome;
use serde::{Deserialize, Serialize};

/// Observable state of a block collector.
pub trait Collector {
    /// Total bytes of entropy assembled into blocks so far.
    fn total_generated(&self) -> u64;

    /// Chi-square statistic of the most recent block; 0 means no sample yet.
    fn last_chi(&self) -> f64;

    /// Frames rejected by the extractor.
    fn rejected_frames(&self) -> u64;

    /// Oversaturated pixels in the latest frame, as a percentage.
    fn corrupt_pixels(&self) -> f64;

    /// True while a completed block waits to be drained.
    fn block_ready(&self) -> bool;

    /// Takes the completed block, clearing the ready state.
    ///
    /// Returns `None` when no block is ready.
    fn drain_entropy(&mut self) -> Option<Vec<u8>>;
}

/// `[collector]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Bytes per block.
    pub block_size: usize,
    /// Frames with a higher mean brightness are rejected.
    pub max_frame_mean: f64,
    /// Pixels at or above this level count as oversaturated.
    pub saturation_level: u8,
    /// Blocks' worth of extracted bytes held while the collector waits to
    /// be drained. Further bytes are discarded.
    pub buffer_blocks: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            block_size: 4096,
            max_frame_mean: 180.0,
            saturation_level: 255,
            buffer_blocks: 4,
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::InvalidBlockSize);
        }
        if self.buffer_blocks == 0 {
            return Err(ConfigError::InvalidBufferLimit);
        }
        Ok(())
    }

    /// Extractor buffer limit in bytes.
    pub fn max_buffered(&self) -> usize {
        self.block_size.saturating_mul(self.buffer_blocks)
    }
}

/// Holds at most one completed block and the running counters.
#[derive(Debug)]
pub struct BlockCollector {
    config: CollectorConfig,
    ready: Option<Vec<u8>>,
    total_generated: u64,
    last_chi: f64,
    rejected_frames: u64,
    corrupt_pixels: f64,
}

impl BlockCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            ready: None,
            total_generated: 0,
            last_chi: 0.0,
            rejected_frames: 0,
            corrupt_pixels: 0.0,
        }
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// Updates frame counters from an extraction outcome.
    pub fn record_frame(&mut self, outcome: &FrameOutcome) {
        match *outcome {
            FrameOutcome::Priming => {}
            FrameOutcome::Rejected { .. } => self.rejected_frames += 1,
            FrameOutcome::Accepted {
                saturated_percent, ..
            } => self.corrupt_pixels = saturated_percent,
        }
    }

    /// Installs a completed block. Ignored while a block is still waiting.
    pub fn fill(&mut self, bytes: Vec<u8>) {
        if self.ready.is_some() || bytes.is_empty() {
            return;
        }
        self.last_chi = chi_square(&bytes);
        self.total_generated += bytes.len() as u64;
        tracing::debug!(
            bytes = bytes.len(),
            chi = self.last_chi,
            total = self.total_generated,
            "Block assembled"
        );
        self.ready = Some(bytes);
    }
}

impl Collector for BlockCollector {
    fn total_generated(&self) -> u64 {
        self.total_generated
    }

    fn last_chi(&self) -> f64 {
        self.last_chi
    }

    fn rejected_frames(&self) -> u64 {
        self.rejected_frames
    }

    fn corrupt_pixels(&self) -> f64 {
        self.corrupt_pixels
    }

    fn block_ready(&self) -> bool {
        self.ready.is_some()
    }

    fn drain_entropy(&mut self) -> Option<Vec<u8>> {
        self.ready.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_without_sample() {
        let collector = BlockCollector::new(CollectorConfig::default());
        assert!(!collector.block_ready());
        assert_eq!(collector.last_chi(), 0.0);
        assert_eq!(collector.total_generated(), 0);
    }

    #[test]
    fn test_fill_then_drain() {
        let mut collector = BlockCollector::new(CollectorConfig::default());
        collector.fill((0..=255u8).collect());

        assert!(collector.block_ready());
        assert_eq!(collector.total_generated(), 256);
        // Flat histogram: the statistic is exactly zero.
        assert_eq!(collector.last_chi(), 0.0);
        assert_eq!(collector.drain_entropy().map(|b| b.len()), Some(256));
        assert!(!collector.block_ready());
        assert!(collector.drain_entropy().is_none());
    }

    #[test]
    fn test_second_fill_ignored_until_drained() {
        let mut collector = BlockCollector::new(CollectorConfig::default());
        collector.fill(vec![1; 10]);
        collector.fill(vec![2; 10]);

        assert_eq!(collector.total_generated(), 10);
        assert_eq!(collector.drain_entropy(), Some(vec![1; 10]));
    }

    #[test]
    fn test_frame_counters() {
        let mut collector = BlockCollector::new(CollectorConfig::default());
        collector.record_frame(&FrameOutcome::Rejected { mean: 220.0 });
        collector.record_frame(&FrameOutcome::Rejected { mean: 230.0 });
        collector.record_frame(&FrameOutcome::Accepted {
            bytes: 10,
            saturated_percent: 1.5,
        });

        assert_eq!(collector.rejected_frames(), 2);
        assert!((collector.corrupt_pixels() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_block_size_invalid() {
        let config = CollectorConfig {
            block_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBlockSize)));
    }

    #[test]
    fn test_buffer_limit_scales_with_block_size() {
        let mut config = CollectorConfig {
            block_size: 1000,
            ..Default::default()
        };
        assert_eq!(config.max_buffered(), 4000);
        config.buffer_blocks = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBufferLimit)));
    }
}
