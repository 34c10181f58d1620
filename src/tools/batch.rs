//! Batch orchestrator.
//!
//! Owns the work queue of one run and drives the item workflow over it, one
//! address at a time against a single browser page. Observers get a
//! [`BatchControl`] handle (pause / resume / stop, snapshots) and, optionally,
//! an event channel. Control requests are honoured at item boundaries only.

use crate::config::{ScoutConfig, WaitTimes};
use crate::error::ScoutError;
use crate::extraction::FieldExtractor;
use crate::features::humanize::{pacer_from_config, ActionKind, Pacer};
use crate::features::session_store::SessionGate;
use crate::scraping::card_browser::ContactCardBrowser;
use crate::tools::workflow::ItemWorkflow;
use crate::types::{BatchCounts, BatchEvent, BatchSnapshot, BatchSummary, ContactRecord, ControlState};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// What the observer last asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Run,
    Pause,
    Stop,
}

/// Observer side of a run.
///
/// Dropping the handle while the run is paused stops it; dropping it while
/// running lets the run finish.
pub struct BatchControl {
    requests: watch::Sender<ControlRequest>,
    snapshots: watch::Receiver<BatchSnapshot>,
}

impl BatchControl {
    pub fn pause(&self) {
        self.request(ControlRequest::Pause);
    }

    pub fn resume(&self) {
        self.request(ControlRequest::Run);
    }

    pub fn stop(&self) {
        self.request(ControlRequest::Stop);
    }

    fn request(&self, request: ControlRequest) {
        // a Stop is final
        self.requests.send_if_modified(|current| {
            if *current == request || *current == ControlRequest::Stop {
                return false;
            }
            *current = request;
            true
        });
    }

    /// Latest published view. Until [`BatchOrchestrator::run`] accepts a
    /// queue this is the placeholder `total: 0, processed: 0, Running`.
    pub fn snapshot(&self) -> BatchSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchSnapshot> {
        self.snapshots.clone()
    }
}

/// Per-run state, owned by the orchestrator.
#[derive(Debug)]
pub struct BatchJob {
    run_id: uuid::Uuid,
    queue: Vec<String>,
    cursor: usize,
    counts: BatchCounts,
    control_state: ControlState,
    started: Instant,
}

impl BatchJob {
    fn new(queue: Vec<String>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4(),
            queue,
            cursor: 0,
            counts: BatchCounts::default(),
            control_state: ControlState::Running,
            started: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            processed: self.cursor,
            total: self.queue.len(),
            counts: self.counts,
            control_state: self.control_state,
        }
    }

    fn summary(&self, stopped_early: bool) -> BatchSummary {
        BatchSummary {
            run_id: self.run_id,
            total: self.queue.len(),
            processed: self.cursor,
            not_started: self.queue.len() - self.cursor,
            counts: self.counts,
            stopped_early,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// Trim, drop blanks, and deduplicate case-insensitively keeping the first
/// spelling seen.
pub fn dedup_identifiers<I, S>(addresses: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    addresses
        .into_iter()
        .filter_map(|a| {
            let trimmed = a.as_ref().trim();
            if trimmed.is_empty() || !seen.insert(trimmed.to_lowercase()) {
                return None;
            }
            Some(trimmed.to_string())
        })
        .collect()
}

pub struct BatchOrchestrator<B: ContactCardBrowser + 'static> {
    browser: B,
    pacer: Arc<dyn Pacer>,
    extractor: FieldExtractor,
    waits: WaitTimes,
    gate: Arc<dyn SessionGate>,
    control: watch::Receiver<ControlRequest>,
    snapshots: watch::Sender<BatchSnapshot>,
    events: Option<mpsc::UnboundedSender<BatchEvent>>,
}

impl<B: ContactCardBrowser + 'static> BatchOrchestrator<B> {
    /// Build an orchestrator and its control handle. An invalid config is a
    /// [`ScoutError::Configuration`].
    pub fn new(
        browser: B,
        config: &ScoutConfig,
        gate: Arc<dyn SessionGate>,
    ) -> Result<(Self, BatchControl), ScoutError> {
        let issues = config.validate();
        if !issues.is_empty() {
            return Err(ScoutError::Configuration(issues.join("; ")));
        }
        let extractor = FieldExtractor::new(&config.extraction)?;

        let (request_tx, request_rx) = watch::channel(ControlRequest::Run);
        let (snapshot_tx, snapshot_rx) = watch::channel(BatchSnapshot {
            processed: 0,
            total: 0,
            counts: BatchCounts::default(),
            control_state: ControlState::Running,
        });

        let orchestrator = Self {
            browser,
            pacer: pacer_from_config(&config.humanize),
            extractor,
            waits: config.wait_times.clone(),
            gate,
            control: request_rx,
            snapshots: snapshot_tx,
            events: None,
        };
        let control = BatchControl {
            requests: request_tx,
            snapshots: snapshot_rx,
        };
        Ok((orchestrator, control))
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<BatchEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Start a run over `addresses`.
    ///
    /// Run-level problems (nothing to process, no valid session) are returned
    /// before any item is touched. Otherwise the records arrive lazily, one per
    /// queued address, until the queue ends or a Stop is observed. The stream
    /// is fused, so polling past its end keeps yielding `None`.
    pub async fn run(
        self,
        addresses: Vec<String>,
    ) -> Result<BoxStream<'static, ContactRecord>, ScoutError> {
        let queue = dedup_identifiers(addresses);
        if queue.is_empty() {
            return Err(ScoutError::Configuration(
                "no addresses to process".to_string(),
            ));
        }
        if !self.gate.is_session_valid().await {
            return Err(ScoutError::Session(
                "authenticated session missing or expired".to_string(),
            ));
        }

        let job = BatchJob::new(queue);
        info!(
            "🚀 batch: run {} started with {} addresses",
            job.run_id,
            job.queue.len()
        );
        self.emit(BatchEvent::StateChanged {
            state: ControlState::Running,
        });
        self.snapshots.send_replace(job.snapshot());

        Ok(stream::unfold((self, job), |(mut orchestrator, mut job)| async move {
            let record = orchestrator.next_record(&mut job).await?;
            Some((record, (orchestrator, job)))
        })
        .fuse()
        .boxed())
    }

    async fn next_record(&mut self, job: &mut BatchJob) -> Option<ContactRecord> {
        if job.cursor >= job.queue.len() {
            self.finish(job, false);
            return None;
        }
        if job.cursor > 0 {
            self.pacer.before_action(ActionKind::BetweenItems).await;
        }
        if !self.observe_control(job).await {
            self.finish(job, true);
            return None;
        }

        let identifier = job.queue[job.cursor].clone();
        let record = ItemWorkflow::new(&self.browser, self.pacer.as_ref(), &self.extractor, &self.waits)
            .run(&identifier)
            .await;

        job.cursor += 1;
        job.counts.record(record.status);
        self.emit(BatchEvent::ItemCompleted {
            record: record.clone(),
        });
        self.emit(BatchEvent::Progress {
            processed: job.cursor,
            total: job.queue.len(),
            counts: job.counts,
        });
        self.snapshots.send_replace(job.snapshot());
        info!(
            "batch: {}/{} done (success={}, not_found={}, error={})",
            job.cursor,
            job.queue.len(),
            job.counts.success,
            job.counts.not_found,
            job.counts.error
        );
        Some(record)
    }

    /// `true` to process the next item, `false` to end the run.
    async fn observe_control(&mut self, job: &mut BatchJob) -> bool {
        loop {
            let request = *self.control.borrow_and_update();
            match request {
                ControlRequest::Run => {
                    if job.control_state == ControlState::Paused {
                        info!("▶️ batch: resumed at {}/{}", job.cursor, job.queue.len());
                        self.set_state(job, ControlState::Running);
                    }
                    return true;
                }
                ControlRequest::Stop => {
                    info!("🛑 batch: stop requested at {}/{}", job.cursor, job.queue.len());
                    self.set_state(job, ControlState::Stopping);
                    return false;
                }
                ControlRequest::Pause => {
                    if job.control_state != ControlState::Paused {
                        info!("⏸️ batch: paused at {}/{}", job.cursor, job.queue.len());
                        self.set_state(job, ControlState::Paused);
                    }
                    if self.control.changed().await.is_err() {
                        warn!("batch: controller dropped while paused, stopping");
                        self.set_state(job, ControlState::Stopping);
                        return false;
                    }
                }
            }
        }
    }

    fn set_state(&self, job: &mut BatchJob, state: ControlState) {
        job.control_state = state;
        self.emit(BatchEvent::StateChanged { state });
        self.snapshots.send_replace(job.snapshot());
    }

    fn finish(&self, job: &mut BatchJob, stopped_early: bool) {
        self.set_state(job, ControlState::Stopped);
        let summary = job.summary(stopped_early);
        info!(
            "✅ batch: run {} finished: {}/{} processed ({} success, {} not found, {} error, {} not started), {}ms",
            summary.run_id,
            summary.processed,
            summary.total,
            summary.counts.success,
            summary.counts.not_found,
            summary.counts.error,
            summary.not_started,
            summary.duration_ms
        );
        self.emit(BatchEvent::Finished { summary });
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_spelling() {
        let queue = dedup_identifiers(["a@x.com", "A@X.COM", "b@x.com"]);
        assert_eq!(queue, vec!["a@x.com".to_string(), "b@x.com".to_string()]);
    }

    #[test]
    fn dedup_trims_and_drops_blanks() {
        let queue = dedup_identifiers(vec!["  B@x.com ", "", "   ", "b@x.com", "c@x.com"]);
        assert_eq!(queue, vec!["B@x.com".to_string(), "c@x.com".to_string()]);
    }

    #[test]
    fn stop_request_is_final() {
        let (tx, rx) = watch::channel(ControlRequest::Run);
        let (_snap_tx, snap_rx) = watch::channel(BatchSnapshot {
            processed: 0,
            total: 0,
            counts: BatchCounts::default(),
            control_state: ControlState::Running,
        });
        let control = BatchControl {
            requests: tx,
            snapshots: snap_rx,
        };
        control.pause();
        assert_eq!(*rx.borrow(), ControlRequest::Pause);
        control.stop();
        control.resume();
        assert_eq!(*rx.borrow(), ControlRequest::Stop);
    }

    #[test]
    fn summary_accounts_for_unstarted_items() {
        let mut job = BatchJob::new(vec!["a".into(), "b".into(), "c".into()]);
        job.cursor = 1;
        job.counts.record(crate::types::ContactStatus::Success);
        let summary = job.summary(true);
        assert_eq!(summary.processed + summary.not_started, summary.total);
        assert_eq!(summary.not_started, 2);
        assert!(summary.stopped_early);
    }
}
