//! Channel traits implemented by the middleware binding.

use std::fs::File;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::event::ChannelEvent;
use crate::metadata::FileDetails;
use crate::operation::PendingOperation;
use crate::state::TransferState;

/// Shared view of one in-progress file transfer.
///
/// The middleware's connection manager owns the channel; jobs hold an
/// `Arc<dyn …>` and must never assume the channel outlives its
/// invalidation signal. All verbs are fire-and-observe: they return a
/// [`PendingOperation`] the caller can await.
pub trait FileTransferChannel: Send + Sync {
    /// Transfer metadata. Only meaningful once [`is_ready`] is true.
    ///
    /// [`is_ready`]: Self::is_ready
    fn details(&self) -> FileDetails;

    /// Current protocol state.
    fn state(&self) -> TransferState;

    /// Whether the middleware has finished preparing the channel's metadata.
    fn is_ready(&self) -> bool;

    /// True when the local side requested the transfer (outgoing direction).
    fn requested(&self) -> bool;

    /// Takes the channel's event stream. Returns `None` after the first
    /// call; there is exactly one subscriber, the job driving the channel.
    fn take_events(&self) -> Option<mpsc::Receiver<ChannelEvent>>;

    /// Token cancelled when the middleware invalidates the channel
    /// (peer disconnect, transport error). Preempts any queued event.
    fn invalidated(&self) -> CancellationToken;

    /// Reason supplied at invalidation, once it happened.
    fn invalidation_reason(&self) -> Option<String>;

    /// Asks the middleware to cancel the transfer.
    fn cancel(&self) -> PendingOperation;

    /// Capability cast for channels that can receive a file.
    fn into_incoming(self: Arc<Self>) -> Option<Arc<dyn IncomingFileTransferChannel>>;

    /// Capability cast for channels that can send a file.
    fn into_outgoing(self: Arc<Self>) -> Option<Arc<dyn OutgoingFileTransferChannel>>;
}

/// Receive side of a transfer offered by the peer.
pub trait IncomingFileTransferChannel: FileTransferChannel {
    /// Publishes the destination URI to the peer before accepting.
    fn set_uri(&self, uri: &str) -> PendingOperation;

    /// Accepts the offer, asking to start at `offset`. The middleware
    /// streams received bytes into `sink`; the job keeps its own handle to
    /// the same file for repositioning and finalization.
    fn accept_file(&self, offset: u64, sink: File) -> PendingOperation;
}

/// Send side of a transfer the local user requested.
pub trait OutgoingFileTransferChannel: FileTransferChannel {
    /// Hands the middleware the opened local file to stream from.
    fn provide_file(&self, source: File) -> PendingOperation;
}
