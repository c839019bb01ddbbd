fn main() {
    println!("Run `cargo test -p transfer-lifecycle` to execute transfer lifecycle tests.");
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use handoff_channel::{
        ChannelEvent, FileDetails, FileTransferChannel, IncomingFileTransferChannel,
        OutgoingFileTransferChannel, PendingOperation, StateChangeReason, TransferState,
    };
    use handoff_handler::{ChannelDispatcher, HandlerConfig, HandlerEvent};
    use handoff_jobs::{AutoDecide, JobError, JobResult};

    struct FakeChannel {
        details: FileDetails,
        state: Mutex<TransferState>,
        events_tx: mpsc::Sender<ChannelEvent>,
        events_rx: Mutex<Option<mpsc::Receiver<ChannelEvent>>>,
        invalidated: CancellationToken,
        accepts: Mutex<Vec<u64>>,
        sink: Mutex<Option<File>>,
        cancels: AtomicUsize,
    }

    impl FakeChannel {
        fn new(file_name: &str, size: u64) -> Arc<Self> {
            let (events_tx, events_rx) = mpsc::channel(16);
            Arc::new(Self {
                details: FileDetails {
                    file_name: file_name.into(),
                    size,
                    content_type: "application/octet-stream".into(),
                    uri: String::new(),
                    last_modified: None,
                    peer_alias: "peer".into(),
                },
                state: Mutex::new(TransferState::Pending),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                invalidated: CancellationToken::new(),
                accepts: Mutex::new(Vec::new()),
                sink: Mutex::new(None),
                cancels: AtomicUsize::new(0),
            })
        }

        async fn push(&self, event: ChannelEvent) {
            self.events_tx.send(event).await.unwrap();
        }

        async fn change_state(&self, state: TransferState, reason: StateChangeReason) {
            *self.state.lock().unwrap() = state;
            self.push(ChannelEvent::StateChanged { state, reason }).await;
        }

        fn write_sink(&self, bytes: &[u8]) {
            let mut guard = self.sink.lock().unwrap();
            guard.as_mut().expect("no sink accepted yet").write_all(bytes).unwrap();
        }

        fn accept_count(&self) -> usize {
            self.accepts.lock().unwrap().len()
        }
    }

    impl FileTransferChannel for FakeChannel {
        fn details(&self) -> FileDetails {
            self.details.clone()
        }

        fn state(&self) -> TransferState {
            *self.state.lock().unwrap()
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn requested(&self) -> bool {
            false
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
            Some(self)
        }

        fn into_outgoing(self: Arc<Self>) -> Option<Arc<dyn OutgoingFileTransferChannel>> {
            None
        }
    }

    impl IncomingFileTransferChannel for FakeChannel {
        fn set_uri(&self, _uri: &str) -> PendingOperation {
            PendingOperation::ready(Ok(()))
        }

        fn accept_file(&self, offset: u64, sink: File) -> PendingOperation {
            self.accepts.lock().unwrap().push(offset);
            *self.sink.lock().unwrap() = Some(sink);
            PendingOperation::ready(Ok(()))
        }
    }

    fn dispatcher_with(dir: &Path, max_concurrent_jobs: usize) -> ChannelDispatcher {
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

    async fn next_event(events: &mut mpsc::Receiver<HandlerEvent>) -> HandlerEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("no handler event within five seconds")
            .expect("handler stream ended unexpectedly")
    }

    /// Reads handler events until `count` progress updates of `job` at
    /// `processed` bytes were seen. Proves the job is done repositioning
    /// before the test writes into the shared sink.
    async fn await_job_progress_at(
        events: &mut mpsc::Receiver<HandlerEvent>,
        job: Uuid,
        processed: u64,
        count: usize,
    ) {
        let mut seen = 0;
        while seen < count {
            if let HandlerEvent::JobProgress { job: id, processed: amount, .. } =
                next_event(events).await
            {
                if id == job && amount == processed {
                    seen += 1;
                }
            }
        }
    }

    async fn await_job_finished(
        events: &mut mpsc::Receiver<HandlerEvent>,
        job: Uuid,
    ) -> JobResult {
        loop {
            if let HandlerEvent::JobFinished { job: id, result } = next_event(events).await {
                if id == job {
                    return result;
                }
            }
        }
    }

    /// A killed transfer leaves its partial file behind; a later channel
    /// for the same file picks it up and finishes the download.
    #[tokio::test]
    async fn killed_transfer_is_finished_by_a_later_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = dispatcher_with(dir.path(), 2);
        let mut events = dispatcher.take_events().unwrap();

        let first = FakeChannel::new("big.bin", 10);
        let handle = dispatcher
            .handle(vec![first.clone() as _])
            .remove(0)
            .expect("first job starts");
        let killed_job = handle.id();
        eventually("first accept call", || first.accept_count() == 1).await;
        assert_eq!(*first.accepts.lock().unwrap(), vec![0]);

        first.write_sink(b"0123");
        assert!(handle.kill());
        assert_eq!(handle.wait().await, Err(JobError::FileTransferCancelled));
        assert_eq!(
            await_job_finished(&mut events, killed_job).await,
            Err(JobError::FileTransferCancelled)
        );
        assert_eq!(first.cancels.load(Ordering::SeqCst), 1);

        let part = dir.path().join("big.bin.part");
        assert_eq!(std::fs::read(&part).unwrap(), b"0123");

        // Same file offered again: the leftover partial is resumed.
        let second = FakeChannel::new("big.bin", 10);
        let resumed = dispatcher
            .handle(vec![second.clone() as _])
            .remove(0)
            .expect("second job starts");
        let resumed_job = resumed.id();
        eventually("second accept call", || second.accept_count() == 1).await;
        assert_eq!(*second.accepts.lock().unwrap(), vec![4]);

        second.push(ChannelEvent::InitialOffsetDefined(4)).await;
        await_job_progress_at(&mut events, resumed_job, 4, 2).await;
        second.write_sink(b"456789");
        second.push(ChannelEvent::TransferredBytesChanged(6)).await;
        second
            .change_state(TransferState::Completed, StateChangeReason::Requested)
            .await;

        assert_eq!(resumed.wait().await, Ok(()));
        assert_eq!(await_job_finished(&mut events, resumed_job).await, Ok(()));
        assert_eq!(std::fs::read(dir.path().join("big.bin")).unwrap(), b"0123456789");
        assert!(!part.exists());
    }

    /// Front ends multiplex the handler stream by the JSON `type` tag.
    #[test]
    fn handler_events_serialize_for_front_ends() {
        let progress = HandlerEvent::JobProgress {
            job: Uuid::new_v4(),
            processed: 5,
            total: 10,
        };
        let json = serde_json::to_string(&progress).unwrap();
        assert!(json.contains("\"type\":\"jobProgress\""));
        assert!(json.contains("\"processed\":5"));

        let failed = HandlerEvent::JobFinished {
            job: Uuid::new_v4(),
            result: Err(JobError::FileTransferCancelled),
        };
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("\"type\":\"jobFinished\""));
        assert!(json.contains("\"Err\":\"fileTransferCancelled\""));
        let back: HandlerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, failed);
    }
}
