//! Terminal error kinds for transfer jobs.

use serde::{Deserialize, Serialize};

/// Error a job reports as its terminal result.
///
/// The kind is the machine-checkable outcome; human narration flows
/// through informational events instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
pub enum JobError {
    /// The channel carries no usable file metadata.
    #[error("invalid channel")]
    InvalidChannel,

    /// The channel was handed over before the middleware finished
    /// preparing it.
    #[error("channel is not ready")]
    ChannelNotReady,

    /// The middleware rejected the accept call.
    #[error("cannot accept file: {0}")]
    AcceptFile(String),

    /// The transfer was stopped, either locally or by the peer.
    #[error("file transfer was cancelled")]
    FileTransferCancelled,

    /// An outgoing channel arrived without a source URI.
    #[error("URI property is missing")]
    UriPropertyMissing,

    /// The outgoing source URI does not point at a local file.
    #[error("this is not a local file: {0}")]
    NotALocalFile(String),

    /// The middleware rejected the provide call, or the source cannot
    /// be opened.
    #[error("cannot provide file: {0}")]
    ProvideFile(String),

    /// The middleware rejected the cancel call.
    #[error("cannot cancel file transfer: {0}")]
    CancelFileTransfer(String),

    /// The channel failed in a way that has no dedicated kind.
    #[error("{0}")]
    UnknownChannel(String),

    /// Local failure outside the channel protocol, typically I/O.
    #[error("{0}")]
    Generic(String),
}
