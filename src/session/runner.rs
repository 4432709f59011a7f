//! Live session driver.
//!
//! One task owns the controller and serialises every input to it: the
//! statistics poll, the walk refresh, delivery completions, user commands
//! and the close signal. Deliveries run on the blocking pool and report
//! back through a channel, so a slow sink never stalls the poll.

use super::{
    Action, BlockLifecycleController, DeliveryCounts, LifecycleState, RenderSnapshot,
    SessionEvent,
};
use crate::capture::{
    lock_pipeline, spawn_capture_loop, CaptureConfig, CaptureControl, EntropyPipeline,
    FrameSource, SharedPipeline,
};
use crate::collection::CollectorConfig;
use crate::delivery::CompletedDelivery;
use crate::metrics::MetricsRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// User actions available while a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Re-deliver the block whose local export failed.
    RetryFailed,
    /// Set the failed block aside and continue.
    SkipFailed,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub blocks: u32,
    pub counts: DeliveryCounts,
    pub set_aside: usize,
    pub elapsed: Duration,
    pub final_state: LifecycleState,
    pub capture_available: bool,
}

pub struct SessionRunner {
    controller: BlockLifecycleController,
    source: Option<Box<dyn FrameSource>>,
    capture_config: CaptureConfig,
    pipeline: SharedPipeline,
    capture: CaptureControl,
    events: mpsc::UnboundedSender<SessionEvent>,
    commands: Option<mpsc::UnboundedReceiver<SessionCommand>>,
    render: watch::Sender<RenderSnapshot>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl SessionRunner {
    pub fn new(
        controller: BlockLifecycleController,
        source: Box<dyn FrameSource>,
        capture_config: CaptureConfig,
        collector_config: CollectorConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (render, _) = watch::channel(controller.render_snapshot());
        Self {
            controller,
            source: Some(source),
            capture_config,
            pipeline: EntropyPipeline::new(collector_config).shared(),
            capture: CaptureControl::new(),
            events,
            commands: None,
            render,
            metrics: None,
        }
    }

    /// Accepts retry/skip commands for failed local exports.
    pub fn with_commands(mut self, commands: mpsc::UnboundedReceiver<SessionCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Whole snapshots of progress and walk, published on the walk cadence.
    pub fn subscribe_render(&self) -> watch::Receiver<RenderSnapshot> {
        self.render.subscribe()
    }

    /// Handle to the capture loop's control, e.g. for a status display.
    pub fn capture_control(&self) -> &CaptureControl {
        &self.capture
    }

    /// Runs until the session terminates or `close` turns true (or its
    /// sender is dropped).
    pub async fn run(mut self, mut close: watch::Receiver<bool>) -> SessionSummary {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<CompletedDelivery>();
        let mut commands = self.commands.take();

        let actions = self.controller.start();
        self.apply(actions, &done_tx);

        let source = self.source.take();
        let capture_available = source.as_ref().is_some_and(|s| s.is_available());
        let capture_task = match source {
            Some(source) if capture_available => Some(spawn_capture_loop(
                source,
                self.capture_config.clone(),
                Arc::clone(&self.pipeline),
                &self.capture,
            )),
            _ => {
                tracing::warn!("No frame source available; session will only wait for close");
                self.emit(SessionEvent::CaptureUnavailable);
                None
            }
        };

        let poll = self.controller.session().config().poll.clone();
        let mut stats = tokio::time::interval(poll.stats_interval());
        stats.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut walk = tokio::time::interval(poll.walk_interval());
        walk.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.controller.is_terminated() {
            if *close.borrow_and_update() {
                let actions = self.controller.close();
                self.apply(actions, &done_tx);
                break;
            }

            tokio::select! {
                _ = stats.tick(), if capture_available => {
                    let actions = {
                        let mut guard = lock_pipeline(&self.pipeline);
                        let pipeline = &mut *guard;
                        self.controller.tick(&pipeline.extractor, &mut pipeline.collector)
                    };
                    self.apply(actions, &done_tx);
                }
                _ = walk.tick() => self.publish_render(),
                Some(done) = done_rx.recv() => {
                    let actions = self.controller.complete_delivery(done);
                    self.apply(actions, &done_tx);
                }
                Some(command) = next_command(&mut commands) => {
                    let actions = match command {
                        SessionCommand::RetryFailed => self.controller.retry_failed(),
                        SessionCommand::SkipFailed => self.controller.skip_failed(),
                    };
                    self.apply(actions, &done_tx);
                }
                changed = close.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Close handle dropped; closing session");
                        let actions = self.controller.close();
                        self.apply(actions, &done_tx);
                    }
                }
            }
        }

        self.publish_render();
        // Idempotent; the controller usually stopped capture already.
        self.capture.stop();
        if let Some(task) = capture_task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Capture task ended abnormally");
            }
        }

        let session = self.controller.session();
        SessionSummary {
            blocks: session.block_index(),
            counts: session.counts(),
            set_aside: session.set_aside().len(),
            elapsed: session.elapsed(),
            final_state: self.controller.state(),
            capture_available,
        }
    }

    fn apply(&mut self, actions: Vec<Action>, done_tx: &mpsc::UnboundedSender<CompletedDelivery>) {
        for action in actions {
            match action {
                Action::Emit(event) => self.emit(event),
                Action::PauseCapture => self.capture.pause(),
                Action::ResumeCapture => self.capture.resume(),
                Action::StopCapture => self.capture.stop(),
                Action::Deliver(job) => {
                    let router = Arc::clone(self.controller.router());
                    let done_tx = done_tx.clone();
                    tokio::task::spawn_blocking(move || {
                        let done = router.execute(job);
                        if done_tx.send(done).is_err() {
                            tracing::debug!("Delivery finished after the runner exited");
                        }
                    });
                }
            }
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        if let Some(metrics) = &self.metrics {
            metrics.observe(&event);
        }
        let publish = matches!(
            event,
            SessionEvent::Progress(_) | SessionEvent::Terminated
        );
        if self.events.send(event).is_err() {
            tracing::trace!("No event subscriber");
        }
        if publish {
            self.publish_render();
        }
    }

    fn publish_render(&self) {
        self.render.send_replace(self.controller.render_snapshot());
    }
}

async fn next_command(
    commands: &mut Option<mpsc::UnboundedReceiver<SessionCommand>>,
) -> Option<SessionCommand> {
    match commands {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
