//! Per-session state owned by the controller.

use super::Block;
use crate::config::SessionConfig;
use crate::walk::{WalkPoint, WalkTransform};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Everything a single generation run accumulates.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    pub(super) block_index: u32,
    pub(super) ticks: u64,
    pub(super) walk: Arc<Vec<WalkPoint>>,
    pub(super) progress: Option<f64>,
    pub(super) terminated: bool,
    pub(super) pending: VecDeque<Block>,
    pub(super) failed_block: Option<Block>,
    pub(super) set_aside: Vec<Block>,
    pub(super) counts: DeliveryCounts,
}

/// Delivery tallies for the session summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryCounts {
    pub delivered: u32,
    pub failed: u32,
    pub cancelled: u32,
}

impl Session {
    pub(super) fn new(config: SessionConfig) -> Self {
        Self {
            config,
            block_index: 0,
            ticks: 0,
            walk: Arc::new(Vec::new()),
            progress: None,
            terminated: false,
            pending: VecDeque::new(),
            failed_block: None,
            set_aside: Vec::new(),
            counts: DeliveryCounts::default(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Index of the most recently drained block; 0 before the first.
    pub fn block_index(&self) -> u32 {
        self.block_index
    }

    /// Statistics ticks observed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Elapsed session time derived from the tick count.
    pub fn elapsed(&self) -> Duration {
        self.config.poll.stats_interval() * u32::try_from(self.ticks).unwrap_or(u32::MAX)
    }

    pub fn progress(&self) -> Option<f64> {
        self.progress
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn walk(&self) -> &[WalkPoint] {
        &self.walk
    }

    /// Blocks drained while another delivery was in flight.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Block whose local export failed, awaiting retry or skip.
    pub fn failed_block(&self) -> Option<&Block> {
        self.failed_block.as_ref()
    }

    /// Blocks that were drained but never delivered: skipped failures and
    /// queued blocks discarded when the session closed.
    pub fn set_aside(&self) -> &[Block] {
        &self.set_aside
    }

    pub fn counts(&self) -> DeliveryCounts {
        self.counts
    }

    /// Appends the walk for `bytes`; returns the number of points added.
    ///
    /// Copy-on-write: a renderer holding an older snapshot keeps it intact.
    pub(super) fn extend_walk(&mut self, walker: &mut WalkTransform, bytes: &[u8]) -> usize {
        let walk = Arc::make_mut(&mut self.walk);
        let before = walk.len();
        walker.extend(bytes, walk);
        walk.len() - before
    }

    pub(super) fn render_snapshot(&self) -> RenderSnapshot {
        RenderSnapshot {
            progress: self.progress,
            walk: Arc::clone(&self.walk),
        }
    }
}

/// State read by a renderer. Published whole, so progress and walk are
/// always consistent with each other.
#[derive(Debug, Clone, Default)]
pub struct RenderSnapshot {
    pub progress: Option<f64>,
    pub walk: Arc<Vec<WalkPoint>>,
}
