//! Block lifecycle state machine.
//!
//! The controller is synchronous and single-owner. Every entry point
//! (`start`, `tick`, `complete_delivery`, `retry_failed`, `skip_failed`,
//! `close`) mutates session state and returns the [`Action`]s the caller
//! must carry out, in order. Whoever drives it (normally the
//! [`super::SessionRunner`]) must call it from one context only.
//!
//! ```text
//!            ready              handed off
//! Generating ─────▶ BlockReady ───────────▶ Delivering
//!     ▲                                        │
//!     │   below target        Delivered /      │
//!     ├──────────── AwaitingContinuation ◀─────┤ local Cancelled
//!     │                     │ target reached   │
//!     │                     ▼                  │ Failed
//!     │               Terminating              ▼
//!     └───────── network / skip ─────────── Failed ──retry──▶ BlockReady
//! ```

use super::{
    Block, RenderSnapshot, Session, SessionError, SessionEvent, StatsReport,
    STATUS_EXPORT_FAILED, STATUS_FINAL_BLOCK_NOT_DELIVERED, STATUS_FINISHING_UPLOAD,
    STATUS_GENERATING,
};
use crate::analysis::{bit_bias, QualityMonitor, QualitySample};
use crate::collection::Collector;
use crate::config::{DeliveryMode, SessionConfig};
use crate::delivery::{CompletedDelivery, DeliveryJob, DeliveryResult, DeliveryRouter, Sinks};
use crate::extraction::Extractor;
use crate::walk::WalkTransform;
use std::sync::Arc;

/// Where the session is in the block lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Polling; no delivery in progress.
    Generating,
    /// A block has been taken from the queue and is being routed.
    BlockReady,
    /// Exactly one delivery in flight.
    Delivering { block_index: u32 },
    /// Deciding between another block and termination.
    AwaitingContinuation,
    /// A delivery failed; local exports wait here for retry or skip.
    Failed { block_index: u32 },
    /// Capture stopped, session ended. Terminal.
    Terminating,
}

/// Side effects requested by the controller.
#[derive(Debug)]
pub enum Action {
    Emit(SessionEvent),
    PauseCapture,
    ResumeCapture,
    StopCapture,
    /// Run this job on a worker and report back via `complete_delivery`.
    Deliver(DeliveryJob),
}

/// Drives a session from block readiness through delivery to termination.
#[derive(Debug)]
pub struct BlockLifecycleController {
    session: Session,
    state: LifecycleState,
    router: Arc<DeliveryRouter>,
    monitor: QualityMonitor,
    walker: WalkTransform,
    in_flight: Option<u32>,
}

impl BlockLifecycleController {
    /// Validates the configuration and builds the router for its mode.
    pub fn new(config: SessionConfig, sinks: Sinks) -> Result<Self, SessionError> {
        config.validate()?;
        let router = DeliveryRouter::new(&config, sinks)?;

        Ok(Self {
            monitor: QualityMonitor::new(config.chi_warning_enabled, config.chi_warning_threshold),
            walker: WalkTransform::new(&config.walk),
            router: Arc::new(router),
            session: Session::new(config),
            state: LifecycleState::Generating,
            in_flight: None,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Shared handle for executing jobs off the coordination context.
    pub fn router(&self) -> &Arc<DeliveryRouter> {
        &self.router
    }

    /// Index of the block currently being delivered.
    pub fn in_flight(&self) -> Option<u32> {
        self.in_flight
    }

    pub fn is_terminated(&self) -> bool {
        self.state == LifecycleState::Terminating
    }

    pub fn render_snapshot(&self) -> RenderSnapshot {
        self.session.render_snapshot()
    }

    /// Announces the session to observers.
    pub fn start(&mut self) -> Vec<Action> {
        let config = self.session.config();
        tracing::info!(
            mode = %config.delivery_mode,
            target = ?config.block_target,
            chi_warning = config.chi_warning_enabled,
            "Session started"
        );
        vec![
            Action::Emit(SessionEvent::StateChanged(self.state)),
            Action::Emit(SessionEvent::Status(STATUS_GENERATING.to_string())),
        ]
    }

    /// One poll of the extractor and collector.
    pub fn tick(&mut self, extractor: &dyn Extractor, collector: &mut dyn Collector) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.is_terminated() {
            return actions;
        }
        self.session.ticks += 1;

        let sample = QualitySample {
            chi_square: collector.last_chi(),
            rejected_frames: collector.rejected_frames(),
            corrupt_pixel_percent: collector.corrupt_pixels(),
            buffer_position: extractor.pos() as u64,
            total_generated: collector.total_generated(),
        };
        // Zero chi-square means no sample yet, not a perfect fit.
        let chi_warning = sample.has_chi() && self.monitor.is_warning(&sample);
        actions.push(Action::Emit(SessionEvent::Stats(StatsReport::from_sample(
            &sample,
            self.session.elapsed(),
            chi_warning,
        ))));

        if collector.block_ready() {
            self.accept_ready_block(collector, sample.chi_square, &mut actions);
        }
        self.dispatch_next(&mut actions);
        actions
    }

    /// Feeds back the outcome of a job previously returned as `Action::Deliver`.
    pub fn complete_delivery(&mut self, done: CompletedDelivery) -> Vec<Action> {
        let mut actions = Vec::new();
        let index = done.block.index();

        if self.is_terminated() {
            tracing::debug!(block = index, "Delivery finished after session end; ignored");
            if done.result.is_failed() {
                self.session.set_aside.push(done.block);
            }
            return actions;
        }
        if self.in_flight != Some(index) {
            tracing::warn!(block = index, in_flight = ?self.in_flight, "Completion for a block not in flight");
            self.session.set_aside.push(done.block);
            return actions;
        }
        self.in_flight = None;

        let CompletedDelivery {
            block,
            label,
            result,
            ..
        } = done;
        actions.push(Action::Emit(SessionEvent::DeliveryFinished {
            index,
            label,
            result: result.clone(),
        }));

        let mode = self.router.mode();
        match result {
            DeliveryResult::Delivered => {
                self.session.counts.delivered += 1;
                self.continue_after(index, &mut actions);
            }
            DeliveryResult::Cancelled => {
                self.session.counts.cancelled += 1;
                match mode {
                    DeliveryMode::Local => self.continue_after(index, &mut actions),
                    DeliveryMode::Network if self.router.is_last_block(index) => {
                        self.hold_undelivered_final(&mut actions);
                    }
                    DeliveryMode::Network => self.resume_generating(&mut actions),
                }
            }
            DeliveryResult::Failed(error) => {
                self.session.counts.failed += 1;
                self.transition(LifecycleState::Failed { block_index: index }, &mut actions);
                match mode {
                    DeliveryMode::Network => {
                        // Soft failure: the session carries on with the next block.
                        tracing::warn!(block = index, error = %error, "Network delivery failed; continuing session");
                        if self.router.is_last_block(index) {
                            self.hold_undelivered_final(&mut actions);
                        } else {
                            self.transition(LifecycleState::Generating, &mut actions);
                            self.dispatch_next(&mut actions);
                        }
                    }
                    DeliveryMode::Local => {
                        tracing::warn!(block = index, error = %error, "Local export failed; block retained");
                        self.status(STATUS_EXPORT_FAILED, &mut actions);
                        self.session.failed_block = Some(block);
                    }
                }
            }
        }
        actions
    }

    /// Re-delivers the block whose local export failed.
    pub fn retry_failed(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if !matches!(self.state, LifecycleState::Failed { .. }) {
            return actions;
        }
        if let Some(block) = self.session.failed_block.take() {
            tracing::info!(block = block.index(), "Retrying failed export");
            self.start_delivery(block, &mut actions);
        }
        actions
    }

    /// Gives up on the failed block and continues as if the hand-off ended.
    ///
    /// The block is kept in [`Session::set_aside`] for inspection.
    pub fn skip_failed(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if !matches!(self.state, LifecycleState::Failed { .. }) {
            return actions;
        }
        if let Some(block) = self.session.failed_block.take() {
            let index = block.index();
            tracing::info!(block = index, "Skipping failed export");
            self.session.set_aside.push(block);
            self.continue_after(index, &mut actions);
        }
        actions
    }

    /// User-initiated close. Does not wait for an in-flight delivery.
    pub fn close(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.is_terminated() {
            return actions;
        }
        if let Some(index) = self.in_flight.take() {
            tracing::info!(block = index, "Closing with delivery in flight; its outcome will be ignored");
        }
        if !self.session.pending.is_empty() {
            tracing::warn!(blocks = self.session.pending.len(), "Closing with undelivered queued blocks");
            let pending = std::mem::take(&mut self.session.pending);
            self.session.set_aside.extend(pending);
        }
        self.terminate(&mut actions);
        actions
    }

    fn accept_ready_block(
        &mut self,
        collector: &mut dyn Collector,
        chi_square: f64,
        actions: &mut Vec<Action>,
    ) {
        let target = self.session.config().block_target;
        if !target.allows_after(self.session.block_index) {
            tracing::trace!(block = self.session.block_index, "Block target reached; not draining");
            return;
        }

        let Some(bytes) = collector.drain_entropy() else {
            return;
        };
        if bytes.is_empty() {
            tracing::warn!("Collector reported ready but drained no bytes");
            return;
        }

        let index = self.session.block_index + 1;
        self.session.block_index = index;
        let block = Block::new(index, bytes, chi_square);

        let added = self.session.extend_walk(&mut self.walker, block.bytes());
        actions.push(Action::Emit(SessionEvent::WalkExtended {
            points: added,
            total: self.session.walk.len(),
        }));

        tracing::debug!(
            block = index,
            bytes = block.len(),
            chi = chi_square,
            bias = bit_bias(block.bytes()),
            queued = self.session.pending.len(),
            "Block drained"
        );
        self.session.pending.push_back(block);
    }

    fn dispatch_next(&mut self, actions: &mut Vec<Action>) {
        if self.state != LifecycleState::Generating || self.in_flight.is_some() {
            return;
        }
        if let Some(block) = self.session.pending.pop_front() {
            self.start_delivery(block, actions);
        }
    }

    fn start_delivery(&mut self, block: Block, actions: &mut Vec<Action>) {
        let index = block.index();
        self.transition(LifecycleState::BlockReady, actions);

        match self.router.mode() {
            DeliveryMode::Network => {
                if self.router.is_last_block(index) {
                    self.status(STATUS_FINISHING_UPLOAD, actions);
                }
            }
            DeliveryMode::Local => {
                self.status(&format!("WRITING BLOCK {index}"), actions);
                actions.push(Action::PauseCapture);
            }
        }

        let job = self.router.prepare(block);
        let label = job.label().clone();
        let bytes = job.block().len();
        tracing::info!(
            block = index,
            label = %label,
            bytes,
            digest = %job.block().digest(),
            mode = %self.router.mode(),
            "Handing off block"
        );

        actions.push(Action::Deliver(job));
        self.in_flight = Some(index);
        self.transition(LifecycleState::Delivering { block_index: index }, actions);
        actions.push(Action::Emit(SessionEvent::BlockHandedOff {
            index,
            label,
            bytes,
        }));

        if let Some(progress) = self.router.progress(index) {
            self.session.progress = Some(progress);
            actions.push(Action::Emit(SessionEvent::Progress(progress)));
        }
    }

    fn continue_after(&mut self, index: u32, actions: &mut Vec<Action>) {
        self.transition(LifecycleState::AwaitingContinuation, actions);
        if self.router.is_last_block(index) {
            self.terminate(actions);
        } else {
            self.resume_generating(actions);
        }
    }

    fn resume_generating(&mut self, actions: &mut Vec<Action>) {
        if self.router.pauses_capture() {
            actions.push(Action::ResumeCapture);
            self.status(STATUS_GENERATING, actions);
        }
        self.transition(LifecycleState::Generating, actions);
        self.dispatch_next(actions);
    }

    /// The final network block was not delivered. Nothing more will be
    /// drained, so capture idles until the user closes the session.
    fn hold_undelivered_final(&mut self, actions: &mut Vec<Action>) {
        tracing::info!(block = self.session.block_index, "Block target reached without final delivery; capture paused");
        self.status(STATUS_FINAL_BLOCK_NOT_DELIVERED, actions);
        actions.push(Action::PauseCapture);
        self.transition(LifecycleState::Generating, actions);
    }

    fn terminate(&mut self, actions: &mut Vec<Action>) {
        self.transition(LifecycleState::Terminating, actions);
        self.session.terminated = true;
        actions.push(Action::StopCapture);
        actions.push(Action::Emit(SessionEvent::Terminated));

        let counts = self.session.counts();
        tracing::info!(
            blocks = self.session.block_index,
            delivered = counts.delivered,
            failed = counts.failed,
            cancelled = counts.cancelled,
            "Session terminated"
        );
    }

    fn transition(&mut self, next: LifecycleState, actions: &mut Vec<Action>) {
        if self.state == next {
            return;
        }
        tracing::debug!(from = ?self.state, to = ?next, "Lifecycle transition");
        self.state = next;
        actions.push(Action::Emit(SessionEvent::StateChanged(next)));
    }

    fn status(&self, text: &str, actions: &mut Vec<Action>) {
        actions.push(Action::Emit(SessionEvent::Status(text.to_string())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlockTarget;
    use crate::delivery::{
        DeliveryError, ExportFileSet, LocalExportSink, NetworkSink, SinkOutcome,
    };
    use std::sync::Mutex;

    struct FakeExtractor(usize);

    impl Extractor for FakeExtractor {
        fn pos(&self) -> usize {
            self.0
        }
    }

    #[derive(Default)]
    struct FakeCollector {
        ready: Option<Vec<u8>>,
        chi: f64,
        total: u64,
    }

    impl FakeCollector {
        fn offer(&mut self, bytes: Vec<u8>) {
            self.total += bytes.len() as u64;
            self.chi = 250.0;
            self.ready = Some(bytes);
        }
    }

    impl Collector for FakeCollector {
        fn total_generated(&self) -> u64 {
            self.total
        }
        fn last_chi(&self) -> f64 {
            self.chi
        }
        fn rejected_frames(&self) -> u64 {
            0
        }
        fn corrupt_pixels(&self) -> f64 {
            0.0
        }
        fn block_ready(&self) -> bool {
            self.ready.is_some()
        }
        fn drain_entropy(&mut self) -> Option<Vec<u8>> {
            self.ready.take()
        }
    }

    /// Relay failing or cancelling on chosen block indices, recording the rest.
    #[derive(Default)]
    struct ScriptedRelay {
        fail_on: Vec<u32>,
        cancel_on: Vec<u32>,
        sent: Mutex<Vec<String>>,
    }

    impl NetworkSink for ScriptedRelay {
        fn deliver_network(
            &self,
            _bytes: &[u8],
            _recipient_key: &str,
            block_label: &str,
        ) -> Result<SinkOutcome, DeliveryError> {
            let index: u32 = block_label
                .trim_start_matches("OE_block")
                .split('_')
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            if self.fail_on.contains(&index) {
                return Err(DeliveryError::Transport("link down".into()));
            }
            if self.cancel_on.contains(&index) {
                return Ok(SinkOutcome::Cancelled);
            }
            self.sent.lock().unwrap().push(block_label.to_string());
            Ok(SinkOutcome::Delivered)
        }
    }

    struct BrokenShare;

    impl LocalExportSink for BrokenShare {
        fn deliver_local(&self, _files: &ExportFileSet) -> Result<SinkOutcome, DeliveryError> {
            Err(DeliveryError::ExportWrite("disk full".into()))
        }
    }

    struct AcceptingShare;

    struct DismissedShare;

    impl LocalExportSink for DismissedShare {
        fn deliver_local(&self, _files: &ExportFileSet) -> Result<SinkOutcome, DeliveryError> {
            Ok(SinkOutcome::Cancelled)
        }
    }

    impl LocalExportSink for AcceptingShare {
        fn deliver_local(&self, _files: &ExportFileSet) -> Result<SinkOutcome, DeliveryError> {
            Ok(SinkOutcome::Delivered)
        }
    }

    fn network(target: BlockTarget, relay: Arc<ScriptedRelay>) -> BlockLifecycleController {
        let config = SessionConfig {
            delivery_mode: DeliveryMode::Network,
            recipient_key: Some("peer".into()),
            block_target: target,
            ..Default::default()
        };
        BlockLifecycleController::new(config, Sinks::network(relay)).unwrap()
    }

    fn local(
        target: BlockTarget,
        sink: Arc<dyn LocalExportSink>,
        dir: &std::path::Path,
    ) -> BlockLifecycleController {
        let config = SessionConfig {
            block_target: target,
            staging_dir: dir.to_path_buf(),
            ..Default::default()
        };
        BlockLifecycleController::new(config, Sinks::local(sink)).unwrap()
    }

    fn bounded(n: u32) -> BlockTarget {
        BlockTarget::from_settings(false, n).unwrap()
    }

    fn take_job(actions: &mut Vec<Action>) -> Option<DeliveryJob> {
        let pos = actions.iter().position(|a| matches!(a, Action::Deliver(_)))?;
        match actions.remove(pos) {
            Action::Deliver(job) => Some(job),
            _ => None,
        }
    }

    fn events(actions: &[Action]) -> Vec<&SessionEvent> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Emit(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    /// Ticks once with a ready block and runs any resulting delivery.
    fn produce_and_deliver(
        controller: &mut BlockLifecycleController,
        collector: &mut FakeCollector,
        bytes: Vec<u8>,
    ) -> Vec<Action> {
        collector.offer(bytes);
        let mut actions = controller.tick(&FakeExtractor(0), collector);
        let job = take_job(&mut actions).expect("delivery started");
        let done = controller.router().execute(job);
        actions.extend(controller.complete_delivery(done));
        actions
    }

    #[test]
    fn test_new_readiness_queued_while_delivering() {
        let relay = Arc::new(ScriptedRelay::default());
        let mut controller = network(BlockTarget::Unlimited, relay);
        let mut collector = FakeCollector::default();

        collector.offer(vec![1; 16]);
        let mut first = controller.tick(&FakeExtractor(0), &mut collector);
        let job1 = take_job(&mut first).unwrap();
        assert_eq!(controller.in_flight(), Some(1));

        collector.offer(vec![2; 16]);
        let mut second = controller.tick(&FakeExtractor(0), &mut collector);
        assert!(take_job(&mut second).is_none());
        assert_eq!(controller.session().pending(), 1);
        assert!(!collector.block_ready());

        let done = controller.router().execute(job1);
        let mut after = controller.complete_delivery(done);
        let job2 = take_job(&mut after).expect("queued block dispatched");
        assert_eq!(job2.block().index(), 2);
        assert_eq!(job2.block().bytes(), &[2; 16]);
        assert_eq!(controller.session().pending(), 0);
    }

    #[test]
    fn test_bounded_local_session_terminates() {
        let tmp = tempfile::tempdir().unwrap();
        let mut controller = local(bounded(3), Arc::new(AcceptingShare), tmp.path());
        let mut collector = FakeCollector::default();

        for i in 1..=2u8 {
            let actions = produce_and_deliver(&mut controller, &mut collector, vec![i; 8]);
            assert!(actions.iter().any(|a| matches!(a, Action::ResumeCapture)));
            assert_eq!(controller.state(), LifecycleState::Generating);
        }

        let actions = produce_and_deliver(&mut controller, &mut collector, vec![3; 8]);
        assert_eq!(controller.state(), LifecycleState::Terminating);
        assert!(actions.iter().any(|a| matches!(a, Action::StopCapture)));
        assert!(!actions.iter().any(|a| matches!(a, Action::ResumeCapture)));
        assert!(events(&actions)
            .iter()
            .any(|e| matches!(e, SessionEvent::Terminated)));

        // No further tick mutates the session.
        let ticks = controller.session().ticks();
        collector.offer(vec![4; 8]);
        assert!(controller.tick(&FakeExtractor(99), &mut collector).is_empty());
        assert_eq!(controller.session().ticks(), ticks);
        assert_eq!(controller.session().block_index(), 3);
        assert!(collector.block_ready());
    }

    #[test]
    fn test_local_pauses_before_delivery() {
        let tmp = tempfile::tempdir().unwrap();
        let mut controller = local(BlockTarget::Unlimited, Arc::new(AcceptingShare), tmp.path());
        let mut collector = FakeCollector::default();
        collector.offer(vec![0; 4]);

        let actions = controller.tick(&FakeExtractor(4), &mut collector);
        let pause = actions.iter().position(|a| matches!(a, Action::PauseCapture)).unwrap();
        let deliver = actions.iter().position(|a| matches!(a, Action::Deliver(_))).unwrap();
        assert!(pause < deliver);
        assert!(events(&actions)
            .iter()
            .any(|e| matches!(e, SessionEvent::Status(s) if s == "WRITING BLOCK 1")));
        // Unlimited sessions never report a progress fraction.
        assert!(!events(&actions)
            .iter()
            .any(|e| matches!(e, SessionEvent::Progress(_))));
    }

    #[test]
    fn test_network_transport_error_is_soft() {
        let relay = Arc::new(ScriptedRelay {
            fail_on: vec![2],
            ..Default::default()
        });
        let mut controller = network(bounded(5), relay.clone());
        let mut collector = FakeCollector::default();

        produce_and_deliver(&mut controller, &mut collector, vec![1; 8]);
        let actions = produce_and_deliver(&mut controller, &mut collector, vec![2; 8]);

        assert!(events(&actions).iter().any(|e| matches!(
            e,
            SessionEvent::DeliveryFinished { index: 2, result: DeliveryResult::Failed(DeliveryError::Transport(_)), .. }
        )));
        assert!(!actions.iter().any(|a| matches!(a, Action::StopCapture)));
        assert_eq!(controller.state(), LifecycleState::Generating);
        assert_eq!(controller.session().block_index(), 2);
        assert_eq!(controller.session().counts().failed, 1);

        // Quiet tick: index holds.
        controller.tick(&FakeExtractor(0), &mut collector);
        assert_eq!(controller.session().block_index(), 2);

        produce_and_deliver(&mut controller, &mut collector, vec![3; 8]);
        assert_eq!(controller.session().block_index(), 3);
        assert_eq!(relay.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_finishing_status_precedes_send_and_termination_follows() {
        let relay = Arc::new(ScriptedRelay::default());
        let mut controller = network(bounded(1), relay);
        let mut collector = FakeCollector::default();
        collector.offer(vec![7; 8]);

        let mut actions = controller.tick(&FakeExtractor(0), &mut collector);
        let finishing = actions
            .iter()
            .position(|a| matches!(a, Action::Emit(SessionEvent::Status(s)) if s == STATUS_FINISHING_UPLOAD))
            .expect("finishing status");
        let deliver = actions
            .iter()
            .position(|a| matches!(a, Action::Deliver(_)))
            .unwrap();
        assert!(finishing < deliver);
        assert!(!actions.iter().any(|a| matches!(a, Action::PauseCapture)));
        assert!(!controller.is_terminated());

        let job = take_job(&mut actions).unwrap();
        let done = controller.router().execute(job);
        let after = controller.complete_delivery(done);
        let finished = after
            .iter()
            .position(|a| matches!(a, Action::Emit(SessionEvent::DeliveryFinished { .. })))
            .unwrap();
        let terminated = after
            .iter()
            .position(|a| matches!(a, Action::Emit(SessionEvent::Terminated)))
            .unwrap();
        assert!(finished < terminated);
        assert!(controller.is_terminated());
    }

    #[test]
    fn test_final_network_block_failure_keeps_session_open() {
        let relay = Arc::new(ScriptedRelay {
            fail_on: vec![1],
            ..Default::default()
        });
        let mut controller = network(bounded(1), relay);
        let mut collector = FakeCollector::default();

        let actions = produce_and_deliver(&mut controller, &mut collector, vec![1; 8]);
        assert!(!controller.is_terminated());
        assert!(events(&actions)
            .iter()
            .any(|e| matches!(e, SessionEvent::Status(s) if s == STATUS_FINAL_BLOCK_NOT_DELIVERED)));
        // Nothing left to deliver, so the frame source stops filling buffers.
        assert!(actions.iter().any(|a| matches!(a, Action::PauseCapture)));

        // Target reached: further blocks stay in the collector.
        collector.offer(vec![2; 8]);
        controller.tick(&FakeExtractor(0), &mut collector);
        assert!(collector.block_ready());
        assert_eq!(controller.session().block_index(), 1);

        controller.close();
        assert!(controller.is_terminated());
    }

    #[test]
    fn test_local_export_failure_retains_block() {
        let tmp = tempfile::tempdir().unwrap();
        let mut controller = local(bounded(2), Arc::new(BrokenShare), tmp.path());
        let mut collector = FakeCollector::default();

        let actions = produce_and_deliver(&mut controller, &mut collector, vec![5; 12]);
        assert_eq!(controller.state(), LifecycleState::Failed { block_index: 1 });
        assert!(!actions.iter().any(|a| matches!(a, Action::ResumeCapture)));
        assert_eq!(controller.session().failed_block().unwrap().bytes(), &[5; 12]);

        // Retry hands the very same block to a new delivery.
        let mut retry = controller.retry_failed();
        let job = take_job(&mut retry).unwrap();
        assert_eq!(job.block().index(), 1);
        assert_eq!(job.block().bytes(), &[5; 12]);
        let done = controller.router().execute(job);
        controller.complete_delivery(done);
        assert_eq!(controller.state(), LifecycleState::Failed { block_index: 1 });

        // Skip sets it aside and resumes capture.
        let skipped = controller.skip_failed();
        assert!(skipped.iter().any(|a| matches!(a, Action::ResumeCapture)));
        assert_eq!(controller.state(), LifecycleState::Generating);
        assert_eq!(controller.session().set_aside().len(), 1);
        assert!(controller.session().failed_block().is_none());
    }

    #[test]
    fn test_chi_forwarded_only_when_positive() {
        let relay = Arc::new(ScriptedRelay::default());
        let config = SessionConfig {
            delivery_mode: DeliveryMode::Network,
            recipient_key: Some("peer".into()),
            chi_warning_enabled: true,
            chi_warning_threshold: -1.0,
            ..Default::default()
        };
        let mut controller = BlockLifecycleController::new(config, Sinks::network(relay)).unwrap();
        let mut collector = FakeCollector::default();

        let stats = |actions: &[Action]| {
            actions.iter().find_map(|a| match a {
                Action::Emit(SessionEvent::Stats(s)) => Some(s.clone()),
                _ => None,
            })
        };

        let actions = controller.tick(&FakeExtractor(0), &mut collector);
        let report = stats(&actions).unwrap();
        assert!(!report.chi_warning);
        assert_eq!(report.chi_square, None);
        assert_eq!(report.buffer_position, None);

        collector.chi = 12.5;
        let actions = controller.tick(&FakeExtractor(100), &mut collector);
        let report = stats(&actions).unwrap();
        assert!(report.chi_warning);
        assert_eq!(report.chi_square, Some(12.5));
        assert_eq!(report.buffer_position, Some(100));
    }

    #[test]
    fn test_close_abandons_in_flight_delivery() {
        let relay = Arc::new(ScriptedRelay::default());
        let mut controller = network(BlockTarget::Unlimited, relay);
        let mut collector = FakeCollector::default();

        collector.offer(vec![1; 8]);
        let mut actions = controller.tick(&FakeExtractor(0), &mut collector);
        let job = take_job(&mut actions).unwrap();
        collector.offer(vec![2; 8]);
        controller.tick(&FakeExtractor(0), &mut collector);

        let closed = controller.close();
        assert!(closed.iter().any(|a| matches!(a, Action::StopCapture)));
        assert!(controller.is_terminated());
        assert_eq!(controller.session().set_aside().len(), 1);

        let done = controller.router().execute(job);
        assert!(controller.complete_delivery(done).is_empty());
        assert!(controller.close().is_empty());
    }

    #[test]
    fn test_walk_runs_across_blocks() {
        let relay = Arc::new(ScriptedRelay::default());
        let mut controller = network(BlockTarget::Unlimited, relay);
        let mut collector = FakeCollector::default();

        produce_and_deliver(&mut controller, &mut collector, vec![0b0000_0001, 0b0000_0010]);
        let first = controller.render_snapshot();
        assert_eq!(first.walk.len(), 8);
        let last = first.walk[7];
        assert!((last.x + 0.6).abs() < 1e-9 && (last.y + 0.6).abs() < 1e-9);

        produce_and_deliver(&mut controller, &mut collector, vec![0xFF]);
        let second = controller.render_snapshot();
        assert_eq!(second.walk.len(), 12);
        assert_eq!(&second.walk[..8], &first.walk[..]);
        assert!((second.walk[8].x + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_progress_reported_per_block() {
        let relay = Arc::new(ScriptedRelay::default());
        let mut controller = network(bounded(4), relay);
        let mut collector = FakeCollector::default();

        let mut seen = Vec::new();
        for i in 0..4u8 {
            let actions = produce_and_deliver(&mut controller, &mut collector, vec![i; 4]);
            seen.extend(events(&actions).iter().filter_map(|e| match e {
                SessionEvent::Progress(p) => Some(*p),
                _ => None,
            }));
        }
        assert_eq!(seen, vec![0.25, 0.5, 0.75, 1.0]);
        assert_eq!(controller.session().progress(), Some(1.0));
        assert!(controller.is_terminated());
    }

    #[test]
    fn test_local_cancel_continues_then_ends_on_target() {
        let tmp = tempfile::tempdir().unwrap();
        let mut controller = local(bounded(2), Arc::new(DismissedShare), tmp.path());
        let mut collector = FakeCollector::default();

        let actions = produce_and_deliver(&mut controller, &mut collector, vec![1; 8]);
        assert!(events(&actions).iter().any(|e| matches!(
            e,
            SessionEvent::DeliveryFinished { index: 1, result: DeliveryResult::Cancelled, .. }
        )));
        assert!(actions.iter().any(|a| matches!(a, Action::ResumeCapture)));
        assert!(!actions.iter().any(|a| matches!(a, Action::StopCapture)));
        assert_eq!(controller.state(), LifecycleState::Generating);

        let actions = produce_and_deliver(&mut controller, &mut collector, vec![2; 8]);
        assert!(actions.iter().any(|a| matches!(a, Action::StopCapture)));
        assert!(!actions.iter().any(|a| matches!(a, Action::ResumeCapture)));
        assert!(events(&actions)
            .iter()
            .any(|e| matches!(e, SessionEvent::Terminated)));
        assert!(controller.is_terminated());
        assert_eq!(controller.session().counts().cancelled, 2);
    }

    #[test]
    fn test_network_cancel_resumes_unless_final() {
        let relay = Arc::new(ScriptedRelay {
            cancel_on: vec![1, 3],
            ..Default::default()
        });
        let mut controller = network(bounded(3), relay.clone());
        let mut collector = FakeCollector::default();

        let actions = produce_and_deliver(&mut controller, &mut collector, vec![1; 8]);
        assert_eq!(controller.state(), LifecycleState::Generating);
        assert!(!actions
            .iter()
            .any(|a| matches!(a, Action::PauseCapture | Action::StopCapture)));

        produce_and_deliver(&mut controller, &mut collector, vec![2; 8]);
        assert_eq!(relay.sent.lock().unwrap().len(), 1);

        let actions = produce_and_deliver(&mut controller, &mut collector, vec![3; 8]);
        assert!(!controller.is_terminated());
        assert!(actions.iter().any(|a| matches!(a, Action::PauseCapture)));
        assert!(events(&actions)
            .iter()
            .any(|e| matches!(e, SessionEvent::Status(s) if s == STATUS_FINAL_BLOCK_NOT_DELIVERED)));
        assert_eq!(controller.session().counts().cancelled, 2);
    }
}
