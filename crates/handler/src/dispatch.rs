//! Channel dispatch: from a batch of approved channels to running jobs.

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use handoff_channel::FileTransferChannel;
use handoff_jobs::{
    DecisionOracle, IncomingTransferJob, JobEvent, JobHandle, OutgoingTransferJob,
};

use crate::budget::{JobBudget, JobSlot};
use crate::config::HandlerConfig;
use crate::event::HandlerEvent;

/// Why a channel was turned away. Rejections are per channel; the rest
/// of the batch is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("file transfer handler is at capacity, cannot start job")]
    AtCapacity,
    #[error("cannot handle outgoing file transfer without URI")]
    MissingUri,
    #[error("channel offers neither incoming nor outgoing file transfer")]
    UnknownChannelType,
}

/// Turns approved file-transfer channels into running jobs, within a
/// fixed concurrency budget.
///
/// Every started job gets a forwarder task that folds its events into
/// the handler stream; the job's budget slot lives in that task and
/// frees once the job has reported its terminal result. The stream from
/// [`take_events`](Self::take_events) must therefore be consumed.
pub struct ChannelDispatcher {
    config: HandlerConfig,
    oracle: Arc<dyn DecisionOracle>,
    budget: JobBudget,
    events: mpsc::Sender<HandlerEvent>,
    events_rx: Option<mpsc::Receiver<HandlerEvent>>,
}

impl ChannelDispatcher {
    pub fn new(config: HandlerConfig, oracle: Arc<dyn DecisionOracle>) -> Self {
        let budget = JobBudget::new(config.max_concurrent_jobs);
        let (events, events_rx) = mpsc::channel(256);
        Self {
            config,
            oracle,
            budget,
            events,
            events_rx: Some(events_rx),
        }
    }

    pub fn budget(&self) -> &JobBudget {
        &self.budget
    }

    /// Takes the handler event stream; `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<HandlerEvent>> {
        self.events_rx.take()
    }

    /// Dispatches a batch of channels, one decision per channel.
    pub fn handle(
        &self,
        channels: Vec<Arc<dyn FileTransferChannel>>,
    ) -> Vec<Result<JobHandle, DispatchError>> {
        channels
            .into_iter()
            .map(|channel| self.dispatch(channel))
            .collect()
    }

    fn dispatch(
        &self,
        channel: Arc<dyn FileTransferChannel>,
    ) -> Result<JobHandle, DispatchError> {
        let Some(slot) = self.budget.try_acquire() else {
            tracing::warn!("file transfer handler is at capacity, cannot start job");
            return Err(DispatchError::AtCapacity);
        };

        if channel.requested() {
            // We asked for this transfer; the URI names the local source.
            if channel.details().uri.is_empty() {
                tracing::warn!("cannot handle outgoing file transfer without URI");
                return Err(DispatchError::MissingUri);
            }
            let Some(outgoing) = channel.into_outgoing() else {
                return Err(DispatchError::UnknownChannelType);
            };
            let mut job = OutgoingTransferJob::new(outgoing);
            let events = job.take_events();
            let handle = job.start();
            self.watch(handle.id(), events, slot);
            Ok(handle)
        } else {
            let Some(incoming) = channel.into_incoming() else {
                return Err(DispatchError::UnknownChannelType);
            };
            let mut job = IncomingTransferJob::new(
                incoming,
                self.config.download_directory.clone(),
                self.config.ask_before_saving,
                Arc::clone(&self.oracle),
            );
            let events = job.take_events();
            let handle = job.start();
            self.watch(handle.id(), events, slot);
            Ok(handle)
        }
    }

    /// Forwards one job's events into the handler stream. The slot rides
    /// along and frees exactly when the job is done reporting.
    fn watch(&self, job: Uuid, job_events: Option<mpsc::Receiver<JobEvent>>, slot: JobSlot) {
        let events = self.events.clone();
        tokio::spawn(async move {
            let _slot = slot;
            let Some(mut job_events) = job_events else {
                return;
            };
            while let Some(event) = job_events.recv().await {
                let done = matches!(event, JobEvent::Finished(_));
                let forwarded = match event {
                    JobEvent::Description(description) => {
                        HandlerEvent::JobRegistered { job, description }
                    }
                    JobEvent::Info(message) => {
                        tracing::info!(%job, update = %message, "transfer job update");
                        HandlerEvent::JobInfo { job, message }
                    }
                    JobEvent::Progress { processed, total } => {
                        HandlerEvent::JobProgress { job, processed, total }
                    }
                    JobEvent::Speed(speed) => HandlerEvent::JobSpeed { job, speed },
                    JobEvent::Finished(result) => {
                        if let Err(error) = &result {
                            tracing::warn!(%job, %error, "transfer job failed");
                        }
                        HandlerEvent::JobFinished { job, result }
                    }
                };
                if events.send(forwarded).await.is_err() || done {
                    break;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs::File;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use handoff_channel::{
        ChannelEvent, FileDetails, IncomingFileTransferChannel, OutgoingFileTransferChannel,
        PendingOperation, StateChangeReason, TransferState,
    };
    use handoff_jobs::{AutoDecide, JobError};

    #[derive(Clone, Copy, PartialEq)]
    enum FakeKind {
        Incoming,
        Outgoing,
        Broken,
    }

    struct FakeChannel {
        kind: FakeKind,
        ready: bool,
        uri: String,
        state: Mutex<TransferState>,
        events_tx: mpsc::Sender<ChannelEvent>,
        events_rx: Mutex<Option<mpsc::Receiver<ChannelEvent>>>,
        invalidated: CancellationToken,
        accepts: AtomicUsize,
        cancels: AtomicUsize,
    }

    impl FakeChannel {
        fn build(kind: FakeKind, ready: bool, uri: &str) -> Arc<Self> {
            let (events_tx, events_rx) = mpsc::channel(16);
            Arc::new(Self {
                kind,
                ready,
                uri: uri.to_owned(),
                state: Mutex::new(TransferState::Pending),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                invalidated: CancellationToken::new(),
                accepts: AtomicUsize::new(0),
                cancels: AtomicUsize::new(0),
            })
        }

        fn incoming() -> Arc<Self> {
            Self::build(FakeKind::Incoming, true, "")
        }

        fn unready_incoming() -> Arc<Self> {
            Self::build(FakeKind::Incoming, false, "")
        }

        fn outgoing(uri: &str) -> Arc<Self> {
            Self::build(FakeKind::Outgoing, true, uri)
        }

        fn broken() -> Arc<Self> {
            Self::build(FakeKind::Broken, true, "")
        }

        async fn complete(&self) {
            *self.state.lock().unwrap() = TransferState::Completed;
            self.events_tx
                .send(ChannelEvent::StateChanged {
                    state: TransferState::Completed,
                    reason: StateChangeReason::Requested,
                })
                .await
                .unwrap();
        }
    }

    impl FileTransferChannel for FakeChannel {
        fn details(&self) -> FileDetails {
            FileDetails {
                file_name: "file.bin".into(),
                size: 4,
                content_type: "application/octet-stream".into(),
                uri: self.uri.clone(),
                last_modified: None,
                peer_alias: "peer".into(),
            }
        }

        fn state(&self) -> TransferState {
            *self.state.lock().unwrap()
        }

        fn is_ready(&self) -> bool {
            self.ready
        }

        fn requested(&self) -> bool {
            self.kind == FakeKind::Outgoing
        }

        fn take_events(&self) -> Option<mpsc::Receiver<ChannelEvent>> {
            self.events_rx.lock().unwrap().take()
        }

        fn invalidated(&self) -> CancellationToken {
            self.invalidated.clone()
        }

        fn invalidation_reason(&self) -> Option<String> {
            None
        }

        fn cancel(&self) -> PendingOperation {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            *self.state.lock().unwrap() = TransferState::Cancelled;
            PendingOperation::ready(Ok(()))
        }

        fn into_incoming(self: Arc<Self>) -> Option<Arc<dyn IncomingFileTransferChannel>> {
            (self.kind == FakeKind::Incoming).then_some(self as _)
        }

        fn into_outgoing(self: Arc<Self>) -> Option<Arc<dyn OutgoingFileTransferChannel>> {
            (self.kind == FakeKind::Outgoing).then_some(self as _)
        }
    }

    impl IncomingFileTransferChannel for FakeChannel {
        fn set_uri(&self, _uri: &str) -> PendingOperation {
            PendingOperation::ready(Ok(()))
        }

        fn accept_file(&self, _offset: u64, _sink: File) -> PendingOperation {
            self.accepts.fetch_add(1, Ordering::SeqCst);
            PendingOperation::ready(Ok(()))
        }
    }

    impl OutgoingFileTransferChannel for FakeChannel {
        fn provide_file(&self, _source: File) -> PendingOperation {
            PendingOperation::ready(Ok(()))
        }
    }

    fn dispatcher_with(dir: &std::path::Path, max_concurrent_jobs: usize) -> ChannelDispatcher {
        let config = HandlerConfig {
            download_directory: dir.to_path_buf(),
            ask_before_saving: false,
            max_concurrent_jobs,
        };
        ChannelDispatcher::new(config, Arc::new(AutoDecide::default()))
    }

    async fn eventually(what: &str, check: impl Fn() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test]
    async fn incoming_channel_becomes_a_running_job() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_with(dir.path(), 4);
        let channel = FakeChannel::incoming();

        let mut results = dispatcher.handle(vec![channel.clone() as _]);
        let handle = results.remove(0).expect("job starts");
        assert_eq!(dispatcher.budget().available(), 3);

        eventually("accept call", || channel.accepts.load(Ordering::SeqCst) == 1).await;
        channel.complete().await;
        assert_eq!(handle.wait().await, Ok(()));
        assert!(dir.path().join("file.bin").exists());
    }

    #[tokio::test]
    async fn budget_rejects_the_overflowing_channel() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_with(dir.path(), 1);
        let first = FakeChannel::incoming();
        let second = FakeChannel::incoming();

        let mut results = dispatcher.handle(vec![first.clone() as _, second as _]);
        let overflow = results.pop().unwrap();
        let started = results.pop().unwrap().expect("first job starts");
        assert!(matches!(overflow, Err(DispatchError::AtCapacity)));

        // The slot comes back once the running job is done.
        started.kill();
        assert_eq!(started.wait().await, Err(JobError::FileTransferCancelled));
        eventually("slot release", || dispatcher.budget().available() == 1).await;
        assert!(
            dispatcher
                .handle(vec![FakeChannel::incoming() as _])
                .remove(0)
                .is_ok()
        );
    }

    #[tokio::test]
    async fn outgoing_channel_without_uri_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_with(dir.path(), 2);
        let results = dispatcher.handle(vec![FakeChannel::outgoing("") as _]);
        assert!(matches!(results[..], [Err(DispatchError::MissingUri)]));
        // The reserved slot was handed straight back.
        assert_eq!(dispatcher.budget().available(), 2);
    }

    #[tokio::test]
    async fn unusable_channel_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_with(dir.path(), 2);
        let results = dispatcher.handle(vec![FakeChannel::broken() as _]);
        assert!(matches!(results[..], [Err(DispatchError::UnknownChannelType)]));
        assert_eq!(dispatcher.budget().available(), 2);
    }

    #[tokio::test]
    async fn job_events_flow_through_the_handler_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = dispatcher_with(dir.path(), 2);
        let mut events = dispatcher.take_events().unwrap();
        assert!(dispatcher.take_events().is_none());

        let mut results = dispatcher.handle(vec![FakeChannel::unready_incoming() as _]);
        let handle = results.remove(0).expect("job starts even when doomed");
        let job = handle.id();
        assert_eq!(handle.wait().await, Err(JobError::ChannelNotReady));

        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("no terminal handler event within five seconds")
                .expect("handler stream ended unexpectedly");
            if let HandlerEvent::JobFinished { job: finished, result } = event {
                assert_eq!(finished, job);
                assert_eq!(result, Err(JobError::ChannelNotReady));
                break;
            }
        }
        eventually("slot release", || dispatcher.budget().available() == 2).await;
    }

    #[tokio::test]
    async fn batch_keeps_per_channel_decisions_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher_with(dir.path(), 8);
        let results = dispatcher.handle(vec![
            FakeChannel::incoming() as _,
            FakeChannel::outgoing("") as _,
            FakeChannel::broken() as _,
        ]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DispatchError::MissingUri)));
        assert!(matches!(results[2], Err(DispatchError::UnknownChannelType)));
    }
}
