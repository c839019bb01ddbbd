//! Incoming transfer job.
//!
//! Drives one incoming file-transfer channel from handover to a file on
//! disk: resolve where the file goes, negotiate existing and partial
//! files, accept the stream into a `.part` file and finalize it when the
//! channel completes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use handoff_channel::{ChannelEvent, FileDetails, IncomingFileTransferChannel, TransferState};
use handoff_transfer::{
    PartFile, existing_part_size, part_path_for, sanitize_file_name, to_file_uri,
};

use crate::core::{
    Interrupt, JobCore, JobHandle, OP_ACCEPT, OP_CANCEL, interruptible, schedule_description,
};
use crate::error::JobError;
use crate::event::{JobDescription, JobEvent, JobResult};
use crate::oracle::{ConflictChoice, DecisionOracle, PartialChoice};

/// The middleware needs a beat between learning the destination URI and
/// the accept call; accepting immediately can race the accept past the
/// URI publication.
const ACCEPT_AFTER_URI_DELAY: Duration = Duration::from_millis(200);

/// Phases of the incoming flow, in progression order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IncomingState {
    Init,
    ResolvingDestination,
    ResolvingPartialFile,
    Receiving,
}

/// Job driving one incoming file-transfer channel.
///
/// Construct it, take the event stream, then [`start`](Self::start). The
/// job runs as its own task and reports exactly one terminal result.
pub struct IncomingTransferJob {
    id: Uuid,
    channel: Arc<dyn IncomingFileTransferChannel>,
    oracle: Arc<dyn DecisionOracle>,
    download_directory: PathBuf,
    ask_destination: bool,
    details: FileDetails,
    file_name: String,
    entry_error: Option<JobError>,
    kill: CancellationToken,
    state: IncomingState,
    core: JobCore,
    events: Option<mpsc::Receiver<JobEvent>>,
}

impl IncomingTransferJob {
    /// Wraps a channel in a job. Validation happens here: a channel that
    /// is not ready, or reports no usable file name, produces a job that
    /// fails as soon as it starts.
    pub fn new(
        channel: Arc<dyn IncomingFileTransferChannel>,
        download_directory: impl Into<PathBuf>,
        ask_destination: bool,
        oracle: Arc<dyn DecisionOracle>,
    ) -> Self {
        let details = channel.details();
        let (file_name, entry_error) = if !channel.is_ready() {
            (String::new(), Some(JobError::ChannelNotReady))
        } else {
            match sanitize_file_name(&details.file_name) {
                Some(name) => (name, None),
                None => (String::new(), Some(JobError::InvalidChannel)),
            }
        };
        let (core, events) = JobCore::new(details.size);
        Self {
            id: Uuid::new_v4(),
            channel,
            oracle,
            download_directory: download_directory.into(),
            ask_destination,
            details,
            file_name,
            entry_error,
            kill: CancellationToken::new(),
            state: IncomingState::Init,
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
        let file_name = if self.file_name.is_empty() {
            self.details.file_name.clone()
        } else {
            self.file_name.clone()
        };
        JobDescription {
            title: "Incoming file transfer".into(),
            file_name,
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
            tracing::warn!(job = %self.id, %error, "rejecting incoming transfer channel");
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

    /// Runs every phase up to the terminal condition. An `Err` means the
    /// flow was torn out from the outside; the caller translates it.
    async fn drive(
        &mut self,
        invalidated: &CancellationToken,
        channel_events: &mut mpsc::Receiver<ChannelEvent>,
    ) -> Result<(), Interrupt> {
        self.set_state(IncomingState::ResolvingDestination);
        let suggested = self.download_directory.join(&self.file_name);
        let mut destination = if self.ask_destination {
            let choice = interruptible(
                invalidated,
                &self.kill,
                self.oracle.choose_destination(&suggested, &self.details),
            )
            .await?;
            match choice {
                Some(path) => path,
                None => {
                    tracing::debug!(job = %self.id, "destination pick declined");
                    self.cancel_quietly().await;
                    return Ok(());
                }
            }
        } else {
            suggested
        };

        if destination.exists() {
            let choice = interruptible(
                invalidated,
                &self.kill,
                self.oracle.resolve_existing(&destination, &self.details),
            )
            .await?;
            match choice {
                ConflictChoice::Overwrite => {
                    if let Err(error) = std::fs::remove_file(&destination) {
                        tracing::warn!(
                            job = %self.id,
                            path = %destination.display(),
                            %error,
                            "cannot remove existing file"
                        );
                        self.core.set_error(JobError::Generic(format!(
                            "cannot overwrite {}: {error}",
                            destination.display()
                        )));
                        return Ok(());
                    }
                }
                // The renamed target is taken as-is; resolution moves
                // straight on to the partial-file round.
                ConflictChoice::Rename(renamed) => destination = renamed,
                ConflictChoice::Cancel => {
                    self.cancel_quietly().await;
                    return Ok(());
                }
            }
        }

        self.set_state(IncomingState::ResolvingPartialFile);
        let mut part_path = part_path_for(&destination);
        let mut resume_offset = 0u64;
        let mut resuming = false;
        if let Some(size) = existing_part_size(&part_path) {
            let choice = interruptible(
                invalidated,
                &self.kill,
                self.oracle.resolve_partial(&part_path, size, &self.details),
            )
            .await?;
            match choice {
                PartialChoice::Resume => {
                    resume_offset = size;
                    resuming = true;
                }
                PartialChoice::Rename(renamed) => part_path = renamed,
                PartialChoice::Overwrite => {}
            }
        }

        self.set_state(IncomingState::Receiving);
        let part = match PartFile::create(&destination, part_path, resuming) {
            Ok(part) => part,
            Err(error) => {
                self.core
                    .set_error(JobError::Generic(format!("cannot open partial file: {error}")));
                return Ok(());
            }
        };
        self.receive(invalidated, channel_events, part, resume_offset, resuming)
            .await
    }

    /// Accepts the transfer into `part` and follows the channel to a
    /// terminal state. Owns the partial file so every early exit can
    /// decide between discarding and finalizing.
    async fn receive(
        &mut self,
        invalidated: &CancellationToken,
        channel_events: &mut mpsc::Receiver<ChannelEvent>,
        mut part: PartFile,
        resume_offset: u64,
        resuming: bool,
    ) -> Result<(), Interrupt> {
        let sink = match part.sink() {
            Ok(sink) => sink,
            Err(error) => {
                self.core.set_error(JobError::Generic(format!(
                    "cannot share partial file with the middleware: {error}"
                )));
                part.discard();
                return Ok(());
            }
        };

        self.publish_uri(part.destination());
        if let Err(interrupt) = interruptible(
            invalidated,
            &self.kill,
            tokio::time::sleep(ACCEPT_AFTER_URI_DELAY),
        )
        .await
        {
            part.discard();
            return Err(interrupt);
        }

        tracing::debug!(
            job = %self.id,
            offset = resume_offset,
            part = %part.part_path().display(),
            "accepting file transfer"
        );
        self.core
            .add_operation(OP_ACCEPT, self.channel.accept_file(resume_offset, sink));
        if resume_offset > 0 {
            self.core.rebase_progress(resume_offset).await;
        }

        let mut confirmed_offset = resume_offset;
        let mut restart_notified = false;

        loop {
            tokio::select! {
                biased;
                _ = invalidated.cancelled() => {
                    part.discard();
                    return Err(Interrupt::Invalidated);
                }
                _ = self.kill.cancelled() => {
                    part.discard();
                    return Err(Interrupt::Killed);
                }
                Some(outcome) = self.core.next_operation() => {
                    if self.core.absorb(outcome) {
                        part.discard();
                        return Ok(());
                    }
                }
                event = channel_events.recv() => match event {
                    None => {
                        self.core.set_error(JobError::UnknownChannel(
                            "channel event stream closed unexpectedly".into(),
                        ));
                        part.discard();
                        return Ok(());
                    }
                    Some(ChannelEvent::InitialOffsetDefined(offset)) => {
                        tracing::debug!(job = %self.id, offset, "peer confirmed initial offset");
                        if resuming && resume_offset > 0 && offset == 0 && !restart_notified {
                            restart_notified = true;
                            self.core.emit_info("Restarting transfer from the beginning").await;
                        }
                        if let Err(error) = part.reposition(offset) {
                            self.core.set_error(JobError::Generic(format!(
                                "cannot reposition partial file: {error}"
                            )));
                            part.discard();
                            return Ok(());
                        }
                        confirmed_offset = offset;
                        self.core.rebase_progress(offset).await;
                    }
                    Some(ChannelEvent::TransferredBytesChanged(count)) => {
                        self.core.record_progress(confirmed_offset.saturating_add(count)).await;
                    }
                    Some(ChannelEvent::StateChanged { state, reason }) => {
                        tracing::debug!(job = %self.id, %state, ?reason, "channel state changed");
                        match state {
                            TransferState::Completed => {
                                match part.finalize() {
                                    Ok(path) => {
                                        tracing::debug!(
                                            job = %self.id,
                                            path = %path.display(),
                                            "transfer completed"
                                        );
                                        self.core.emit_info("Transfer completed!").await;
                                    }
                                    Err(error) => {
                                        self.core.set_error(JobError::Generic(format!(
                                            "cannot finalize transfer: {error}"
                                        )));
                                    }
                                }
                                return Ok(());
                            }
                            TransferState::Cancelled => {
                                self.core.set_error(JobError::FileTransferCancelled);
                                self.core.emit_info("Transfer was cancelled").await;
                                part.discard();
                                return Ok(());
                            }
                            TransferState::None => {
                                self.core.set_error(JobError::UnknownChannel(
                                    "channel reported a protocol-level error".into(),
                                ));
                                part.discard();
                                return Ok(());
                            }
                            _ => {}
                        }
                    }
                },
            }
        }
    }

    /// Publishes the destination URI to the peer. Failure only warrants
    /// narration; the transfer itself is unaffected.
    fn publish_uri(&self, destination: &Path) {
        let uri = to_file_uri(destination);
        let op = self.channel.set_uri(&uri);
        let events = self.core.events_handle();
        let id = self.id;
        tokio::spawn(async move {
            if let Err(error) = op.wait().await {
                tracing::warn!(job = %id, %error, "unable to publish destination URI");
                let _ = events
                    .send(JobEvent::Info(format!("Could not set the destination URI: {error}")))
                    .await;
            }
        });
    }

    /// Cancellation that nobody counts as an error: the user said no.
    async fn cancel_quietly(&mut self) {
        self.core.emit_info("Transfer was cancelled").await;
        self.request_cancel();
    }

    /// Asks the middleware to cancel unless the channel already is.
    fn request_cancel(&mut self) {
        if self.channel.state() != TransferState::Cancelled {
            self.core.add_operation(OP_CANCEL, self.channel.cancel());
        }
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
        self.request_cancel();
    }

    fn set_state(&mut self, next: IncomingState) {
        tracing::debug!(job = %self.id, from = ?self.state, to = ?next, "job state change");
        self.state = next;
    }
}
