//! Events a channel delivers while a transfer is in flight.

use serde::{Deserialize, Serialize};

use crate::state::{StateChangeReason, TransferState};

/// Ordered event stream of a file-transfer channel.
///
/// Events arrive in the order the transport produced them. Channel
/// invalidation is deliberately *not* an event: it is a separate signal
/// (see [`FileTransferChannel::invalidated`]) because it must be able to
/// overtake anything queued here.
///
/// [`FileTransferChannel::invalidated`]: crate::FileTransferChannel::invalidated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelEvent {
    /// The channel moved to a new protocol state.
    StateChanged {
        state: TransferState,
        reason: StateChangeReason,
    },
    /// Cumulative bytes transferred since the confirmed initial offset.
    TransferredBytesChanged(u64),
    /// The peer confirmed the actual starting offset for the transfer.
    ///
    /// Fired once, after accept: transports that cannot resume report 0
    /// here even when a nonzero offset was requested.
    InitialOffsetDefined(u64),
}
