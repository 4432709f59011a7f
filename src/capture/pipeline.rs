//! Extractor and collector wired together behind one lock.

use super::Frame;
use crate::collection::{BlockCollector, Collector, CollectorConfig};
use crate::extraction::{Extractor, FrameExtractor};
use std::sync::{Arc, Mutex, MutexGuard};

/// Pipeline shared between the capture loop and the session poller.
pub type SharedPipeline = Arc<Mutex<EntropyPipeline>>;

/// The frame-capture subsystem's extractor and collector.
#[derive(Debug)]
pub struct EntropyPipeline {
    pub extractor: FrameExtractor,
    pub collector: BlockCollector,
}

impl EntropyPipeline {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            extractor: FrameExtractor::new(
                config.max_frame_mean,
                config.saturation_level,
                config.max_buffered(),
            ),
            collector: BlockCollector::new(config),
        }
    }

    /// Wraps the pipeline for sharing with the capture loop.
    pub fn shared(self) -> SharedPipeline {
        Arc::new(Mutex::new(self))
    }

    /// Runs one frame through extraction and moves a full block's worth of
    /// bytes into the collector when it has room.
    pub fn ingest(&mut self, frame: &Frame) {
        let outcome = self.extractor.process(frame);
        self.collector.record_frame(&outcome);

        let block_size = self.collector.block_size();
        if !self.collector.block_ready() && self.extractor.pos() >= block_size {
            let bytes = self.extractor.take(block_size);
            self.collector.fill(bytes);
        }
    }
}

/// Locks the pipeline, recovering the data if a previous holder panicked.
pub fn lock_pipeline(pipeline: &Mutex<EntropyPipeline>) -> MutexGuard<'_, EntropyPipeline> {
    pipeline.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("entropy pipeline lock was poisoned; continuing with inner state");
        poisoned.into_inner()
    })
}
