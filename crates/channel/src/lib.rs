//! File-transfer channel abstraction.
//!
//! The messaging middleware owns the lifetime of every transfer channel;
//! this crate defines the view the handler gets of one: immutable metadata,
//! an ordered event stream, an invalidation signal, and the verbs a job may
//! invoke (set destination URI, accept at an offset, provide a local file,
//! cancel). Verbs complete asynchronously through [`PendingOperation`],
//! which resolves exactly once.
//!
//! Concrete implementations live with the middleware binding; jobs and the
//! dispatch handler only ever see the trait objects defined here.

pub mod channel;
pub mod event;
pub mod metadata;
pub mod operation;
pub mod state;

pub use channel::{FileTransferChannel, IncomingFileTransferChannel, OutgoingFileTransferChannel};
pub use event::ChannelEvent;
pub use metadata::FileDetails;
pub use operation::{OperationCompleter, OperationError, PendingOperation};
pub use state::{StateChangeReason, TransferState};
