//! Capture control and the background producer task.

use super::{lock_pipeline, CaptureConfig, FrameSource, SharedPipeline};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Desired state of the capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Running,
    Paused,
    /// Terminal; the loop closes the source and exits.
    Stopped,
}

/// Handle used by the session to pause, resume and stop capture.
#[derive(Debug, Clone)]
pub struct CaptureControl {
    tx: Arc<watch::Sender<CaptureState>>,
}

impl CaptureControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CaptureState::Running);
        Self { tx: Arc::new(tx) }
    }

    pub fn pause(&self) {
        self.transition(CaptureState::Paused);
    }

    pub fn resume(&self) {
        self.transition(CaptureState::Running);
    }

    pub fn stop(&self) {
        self.transition(CaptureState::Stopped);
    }

    pub fn state(&self) -> CaptureState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.tx.subscribe()
    }

    fn transition(&self, next: CaptureState) {
        self.tx.send_if_modified(|current| {
            // Stopped is terminal.
            if *current == CaptureState::Stopped || *current == next {
                return false;
            }
            tracing::debug!(from = ?*current, to = ?next, "Capture state change");
            *current = next;
            true
        });
    }
}

impl Default for CaptureControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the producer task feeding frames into the pipeline.
///
/// The task opens the source, captures at the configured frame rate while
/// the control is `Running`, idles while `Paused`, and closes the source once
/// `Stopped` (or once every control handle is dropped).
pub fn spawn_capture_loop(
    mut source: Box<dyn FrameSource>,
    config: CaptureConfig,
    pipeline: SharedPipeline,
    control: &CaptureControl,
) -> JoinHandle<()> {
    let mut state_rx = control.subscribe();

    tokio::spawn(async move {
        if let Err(e) = source.open(&config) {
            tracing::warn!(error = %e, "Capture loop could not open frame source");
            return;
        }

        let mut ticker = tokio::time::interval(config.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frames: u64 = 0;

        loop {
            let state = *state_rx.borrow_and_update();
            match state {
                CaptureState::Stopped => break,
                CaptureState::Paused => {
                    if state_rx.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                CaptureState::Running => {}
            }

            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match source.next_frame() {
                        Ok(frame) => {
                            lock_pipeline(&pipeline).ingest(&frame);
                            frames += 1;
                        }
                        Err(e) => tracing::warn!(error = %e, "Frame capture failed"),
                    }
                }
            }
        }

        source.close();
        tracing::info!(frames, "Capture loop finished");
    })
}
