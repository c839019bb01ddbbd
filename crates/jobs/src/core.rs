//! Shared machinery of both job kinds.
//!
//! A job funnels every channel operation it starts through one place,
//! remembers their failures, and folds the whole run down to a single
//! terminal result. `JobCore` is that place; `JobHandle` is the
//! caller-facing side of a started job.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use handoff_channel::{OperationError, PendingOperation};
use handoff_transfer::SpeedMeter;

use crate::error::JobError;
use crate::event::{JobDescription, JobEvent, JobResult};

/// Registering a job with the external tracker too early loses the entry
/// while the tracker is still instantiating, so registration is pushed
/// past that window.
pub(crate) const TRACKER_REGISTRATION_DELAY: Duration = Duration::from_millis(500);

pub(crate) const OP_ACCEPT: &str = "accept";
pub(crate) const OP_PROVIDE: &str = "provide";
pub(crate) const OP_CANCEL: &str = "cancel";

/// Completed channel operation, tagged with what it was.
#[derive(Debug)]
pub(crate) struct OpOutcome {
    pub label: &'static str,
    pub result: Result<(), OperationError>,
}

/// Why a job was torn out of its normal flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    Invalidated,
    Killed,
}

/// Runs `fut` unless the channel is invalidated or the job is killed
/// first. Invalidation wins over a kill racing in at the same moment.
pub(crate) async fn interruptible<F: Future>(
    invalidated: &CancellationToken,
    kill: &CancellationToken,
    fut: F,
) -> Result<F::Output, Interrupt> {
    tokio::select! {
        biased;
        _ = invalidated.cancelled() => Err(Interrupt::Invalidated),
        _ = kill.cancelled() => Err(Interrupt::Killed),
        output = fut => Ok(output),
    }
}

/// Sends the tracker description after the registration delay.
pub(crate) fn schedule_description(events: mpsc::Sender<JobEvent>, description: JobDescription) {
    tokio::spawn(async move {
        tokio::time::sleep(TRACKER_REGISTRATION_DELAY).await;
        let _ = events.send(JobEvent::Description(description)).await;
    });
}

/// Bookkeeping shared by incoming and outgoing jobs: the event stream,
/// outstanding channel operations, the first error, and progress.
pub(crate) struct JobCore {
    events: mpsc::Sender<JobEvent>,
    op_tx: mpsc::Sender<OpOutcome>,
    op_rx: mpsc::Receiver<OpOutcome>,
    outstanding: usize,
    ledger: Vec<OperationError>,
    error: Option<JobError>,
    processed: u64,
    total: u64,
    meter: SpeedMeter,
    finished: Arc<AtomicBool>,
}

impl JobCore {
    pub fn new(total: u64) -> (Self, mpsc::Receiver<JobEvent>) {
        let (events, events_rx) = mpsc::channel(64);
        let (op_tx, op_rx) = mpsc::channel(32);
        let core = Self {
            events,
            op_tx,
            op_rx,
            outstanding: 0,
            ledger: Vec::new(),
            error: None,
            processed: 0,
            total,
            meter: SpeedMeter::new(),
            finished: Arc::new(AtomicBool::new(false)),
        };
        (core, events_rx)
    }

    pub fn events_handle(&self) -> mpsc::Sender<JobEvent> {
        self.events.clone()
    }

    pub fn finished_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.finished)
    }

    /// Tracks a channel operation. Its outcome comes back through
    /// [`next_operation`](Self::next_operation) once the middleware
    /// answers.
    pub fn add_operation(&mut self, label: &'static str, op: PendingOperation) {
        self.outstanding += 1;
        let tx = self.op_tx.clone();
        tokio::spawn(async move {
            let result = op.wait().await;
            let _ = tx.send(OpOutcome { label, result }).await;
        });
    }

    pub async fn next_operation(&mut self) -> Option<OpOutcome> {
        self.op_rx.recv().await
    }

    pub fn has_outstanding(&self) -> bool {
        self.outstanding > 0
    }

    /// Books a completed operation. Failures land in the ledger and, for
    /// the labels that have one, set the dedicated error kind. Returns
    /// true when the failure ends the job.
    pub fn absorb(&mut self, outcome: OpOutcome) -> bool {
        self.outstanding = self.outstanding.saturating_sub(1);
        let error = match outcome.result {
            Ok(()) => return false,
            Err(error) => error,
        };
        tracing::warn!(operation = outcome.label, %error, "channel operation failed");
        match outcome.label {
            OP_ACCEPT => self.set_error(JobError::AcceptFile(error.to_string())),
            OP_PROVIDE => self.set_error(JobError::ProvideFile(error.to_string())),
            OP_CANCEL => self.set_error(JobError::CancelFileTransfer(error.to_string())),
            _ => {}
        }
        self.ledger.push(error);
        matches!(outcome.label, OP_ACCEPT | OP_PROVIDE)
    }

    /// Waits for every outstanding operation to come back, so the
    /// terminal result reflects all of them. Invalidation cuts the wait
    /// short; whatever is still pending will never answer.
    pub async fn drain_operations(&mut self, invalidated: &CancellationToken) {
        while self.has_outstanding() {
            tokio::select! {
                biased;
                _ = invalidated.cancelled() => break,
                outcome = self.op_rx.recv() => match outcome {
                    Some(outcome) => {
                        self.absorb(outcome);
                    }
                    None => break,
                },
            }
        }
    }

    /// Records the job error. The first one sticks; later calls lose.
    pub fn set_error(&mut self, error: JobError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub async fn emit_info(&self, message: impl Into<String>) {
        let _ = self.events.send(JobEvent::Info(message.into())).await;
    }

    /// Re-anchors progress at `offset`, excluding everything before it
    /// from speed calculations.
    pub async fn rebase_progress(&mut self, offset: u64) {
        self.processed = offset.min(self.total);
        self.meter.rebase(self.processed);
        let _ = self
            .events
            .send(JobEvent::Progress { processed: self.processed, total: self.total })
            .await;
    }

    /// Publishes a new processed-byte count. Counts are clamped to the
    /// total and never move backwards; a zero resets the speed clock
    /// without publishing a sample.
    pub async fn record_progress(&mut self, amount: u64) {
        let amount = amount.min(self.total);
        if amount < self.processed && amount != 0 {
            return;
        }
        self.processed = self.processed.max(amount);
        let _ = self
            .events
            .send(JobEvent::Progress { processed: self.processed, total: self.total })
            .await;
        if let Some(speed) = self.meter.record(amount) {
            let _ = self.events.send(JobEvent::Speed(speed)).await;
        }
    }

    /// Emits the terminal result and consumes the core. With no error
    /// set but a non-empty ledger, the ledger is folded into one
    /// aggregate error.
    pub async fn finish(mut self) -> JobResult {
        if self.error.is_none() && !self.ledger.is_empty() {
            self.error = Some(JobError::UnknownChannel(aggregate_errors(&self.ledger)));
        }
        let result: JobResult = match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        };
        self.finished.store(true, Ordering::SeqCst);
        match &result {
            Ok(()) => tracing::debug!("job finished"),
            Err(error) => tracing::warn!(%error, "job finished with error"),
        }
        let _ = self.events.send(JobEvent::Finished(result.clone())).await;
        result
    }
}

/// Folds ledgered operation failures into one human-readable message.
pub(crate) fn aggregate_errors(errors: &[OperationError]) -> String {
    let mut message = if errors.len() == 1 {
        "channel middleware reported an error while performing the requested operation:"
            .to_owned()
    } else {
        format!(
            "channel middleware reported {} errors while performing the requested operation:",
            errors.len()
        )
    };
    for error in errors {
        message.push_str(&format!("\n - {}: {}", error.name, error.message));
    }
    message
}

/// Caller-facing side of a started job.
pub struct JobHandle {
    pub(crate) id: Uuid,
    pub(crate) kill: CancellationToken,
    pub(crate) finished: Arc<AtomicBool>,
    pub(crate) task: JoinHandle<JobResult>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Asks the job to stop. Returns false when the job already finished
    /// or was already killed; the single terminal result still arrives
    /// through the event stream either way.
    pub fn kill(&self) -> bool {
        if self.is_finished() || self.kill.is_cancelled() {
            return false;
        }
        self.kill.cancel();
        true
    }

    /// Waits for the terminal result.
    pub async fn wait(self) -> JobResult {
        match self.task.await {
            Ok(result) => result,
            Err(error) => Err(JobError::Generic(format!("job task failed: {error}"))),
        }
    }
}
