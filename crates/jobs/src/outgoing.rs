//! Outgoing transfer job.
//!
//! Waits for the peer to accept, then hands the local source file to the
//! middleware and follows the channel to a terminal state.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use handoff_channel::{ChannelEvent, FileDetails, OutgoingFileTransferChannel, TransferState};
use handoff_transfer::local_path;

use crate::core::{Interrupt, JobCore, JobHandle, OP_CANCEL, OP_PROVIDE, schedule_description};
use crate::error::JobError;
use crate::event::{JobDescription, JobEvent, JobResult};

/// Phases of the outgoing flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutgoingState {
    Init,
    AwaitingAcceptance,
    Providing,
}

/// Job driving one outgoing file-transfer channel.
pub struct OutgoingTransferJob {
    id: Uuid,
    channel: Arc<dyn OutgoingFileTransferChannel>,
    details: FileDetails,
    source_path: PathBuf,
    entry_error: Option<JobError>,
    kill: CancellationToken,
    state: OutgoingState,
    core: JobCore,
    events: Option<mpsc::Receiver<JobEvent>>,
}

impl OutgoingTransferJob {
    /// Wraps a channel in a job. The source URI is resolved here: a
    /// missing URI, a non-local URI or a source that is not a regular
    /// file produces a job that fails as soon as it starts.
    pub fn new(channel: Arc<dyn OutgoingFileTransferChannel>) -> Self {
        let details = channel.details();
        let (source_path, entry_error) = if !channel.is_ready() {
            (PathBuf::new(), Some(JobError::ChannelNotReady))
        } else if details.uri.is_empty() {
            (PathBuf::new(), Some(JobError::UriPropertyMissing))
        } else {
            match local_path(&details.uri) {
                None => (PathBuf::new(), Some(JobError::NotALocalFile(details.uri.clone()))),
                Some(path) => {
                    if path.is_file() {
                        (path, None)
                    } else {
                        let error = JobError::ProvideFile(format!(
                            "{} is not a regular file",
                            path.display()
                        ));
                        (path, Some(error))
                    }
                }
            }
        };
        let (core, events) = JobCore::new(details.size);
        Self {
            id: Uuid::new_v4(),
            channel,
            details,
            source_path,
            entry_error,
            kill: CancellationToken::new(),
            state: OutgoingState::Init,
            core,
            events: Some(events),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Takes the job's event stream; `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<JobEvent>> {
        self.events.take()
    }

    fn description(&self) -> JobDescription {
        JobDescription {
            title: "Outgoing file transfer".into(),
            file_name: self.details.file_name.clone(),
            peer_alias: self.details.peer_alias.clone(),
        }
    }

    /// Starts the job on the current runtime.
    pub fn start(self) -> JobHandle {
        let id = self.id;
        let kill = self.kill.clone();
        let finished = self.core.finished_flag();
        let task = tokio::spawn(self.run());
        JobHandle { id, kill, finished, task }
    }

    async fn run(mut self) -> JobResult {
        schedule_description(self.core.events_handle(), self.description());

        if let Some(error) = self.entry_error.take() {
            tracing::warn!(job = %self.id, %error, "rejecting outgoing transfer channel");
            self.core.set_error(error);
            return self.core.finish().await;
        }

        let invalidated = self.channel.invalidated();
        let Some(mut channel_events) = self.channel.take_events() else {
            self.core
                .set_error(JobError::Generic("channel event stream already claimed".into()));
            return self.core.finish().await;
        };

        match self.drive(&invalidated, &mut channel_events).await {
            Ok(()) => {}
            Err(Interrupt::Invalidated) => self.note_invalidation().await,
            Err(Interrupt::Killed) => self.kill_channel().await,
        }

        self.core.drain_operations(&invalidated).await;
        self.core.finish().await
    }

    async fn drive(
        &mut self,
        invalidated: &CancellationToken,
        channel_events: &mut mpsc::Receiver<ChannelEvent>,
    ) -> Result<(), Interrupt> {
        self.set_state(OutgoingState::AwaitingAcceptance);
        let mut provided = false;
        let mut confirmed_offset = 0u64;

        // The peer may have accepted before the channel was handed over.
        if self.channel.state() == TransferState::Accepted {
            if !self.begin_providing() {
                return Ok(());
            }
            provided = true;
        }

        loop {
            tokio::select! {
                biased;
                _ = invalidated.cancelled() => return Err(Interrupt::Invalidated),
                _ = self.kill.cancelled() => return Err(Interrupt::Killed),
                Some(outcome) = self.core.next_operation() => {
                    if self.core.absorb(outcome) {
                        return Ok(());
                    }
                }
                event = channel_events.recv() => match event {
                    None => {
                        self.core.set_error(JobError::UnknownChannel(
                            "channel event stream closed unexpectedly".into(),
                        ));
                        return Ok(());
                    }
                    Some(ChannelEvent::InitialOffsetDefined(offset)) => {
                        tracing::debug!(job = %self.id, offset, "peer requested transfer offset");
                        confirmed_offset = offset;
                        self.core.rebase_progress(offset).await;
                    }
                    Some(ChannelEvent::TransferredBytesChanged(count)) => {
                        self.core.record_progress(confirmed_offset.saturating_add(count)).await;
                    }
                    Some(ChannelEvent::StateChanged { state, reason }) => {
                        tracing::debug!(job = %self.id, %state, ?reason, "channel state changed");
                        match state {
                            TransferState::Accepted if !provided => {
                                if !self.begin_providing() {
                                    return Ok(());
                                }
                                provided = true;
                            }
                            TransferState::Completed => {
                                self.core.emit_info("Transfer completed!").await;
                                return Ok(());
                            }
                            TransferState::Cancelled => {
                                self.core.set_error(JobError::FileTransferCancelled);
                                self.core.emit_info("Transfer was cancelled").await;
                                return Ok(());
                            }
                            TransferState::None => {
                                self.core.set_error(JobError::UnknownChannel(
                                    "channel reported a protocol-level error".into(),
                                ));
                                return Ok(());
                            }
                            _ => {}
                        }
                    }
                },
            }
        }
    }

    /// Opens the source and hands it to the middleware. Returns false
    /// when the job must stop; the error is already recorded then.
    fn begin_providing(&mut self) -> bool {
        self.set_state(OutgoingState::Providing);
        let source = match std::fs::File::open(&self.source_path) {
            Ok(file) => file,
            Err(error) => {
                self.core.set_error(JobError::ProvideFile(format!(
                    "{}: {error}",
                    self.source_path.display()
                )));
                return false;
            }
        };
        tracing::debug!(job = %self.id, path = %self.source_path.display(), "providing local file");
        self.core.add_operation(OP_PROVIDE, self.channel.provide_file(source));
        true
    }

    async fn note_invalidation(&self) {
        let reason = self
            .channel
            .invalidation_reason()
            .unwrap_or_else(|| "connection to the peer was lost".into());
        tracing::warn!(job = %self.id, %reason, "file transfer channel invalidated");
        self.core
            .emit_info(format!("File transfer invalidated: {reason}"))
            .await;
    }

    async fn kill_channel(&mut self) {
        self.core.set_error(JobError::FileTransferCancelled);
        self.core.emit_info("Transfer was cancelled").await;
        if self.channel.state() != TransferState::Cancelled {
            self.core.add_operation(OP_CANCEL, self.channel.cancel());
        }
    }

    fn set_state(&mut self, next: OutgoingState) {
        tracing::debug!(job = %self.id, from = ?self.state, to = ?next, "job state change");
        self.state = next;
    }
}
