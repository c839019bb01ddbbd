//! Transfer channel states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol state of a file-transfer channel.
///
/// `None` is the middleware's "no valid state" marker and is only ever seen
/// when the transfer failed at the protocol level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferState {
    None,
    Pending,
    Accepted,
    Open,
    Completed,
    Cancelled,
}

impl TransferState {
    /// Whether the transfer can still make progress from this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::None | Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Open => "open",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Reason attached to a state change by the middleware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StateChangeReason {
    #[default]
    None,
    Requested,
    LocalStopped,
    RemoteStopped,
    LocalError,
    RemoteError,
}
