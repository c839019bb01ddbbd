//! File-transfer jobs: one state machine per channel.
//!
//! This crate implements the **business logic** for driving file-transfer
//! channels to completion. It is a library crate with no middleware
//! dependencies — the dispatching layer hands in channel trait objects
//! and, for incoming transfers, a [`DecisionOracle`] that answers the
//! questions no policy can answer alone.
//!
//! # Flow
//!
//! 1. **Validate** — reject channels that are not ready or unusable
//! 2. **Resolve** — pick the destination, settle existing and partial files
//! 3. **Transfer** — accept into a `.part` file, or provide the source
//! 4. **Settle** — wait for every channel operation, report one result

pub mod error;
pub mod event;
pub mod incoming;
pub mod oracle;
pub mod outgoing;

mod core;

// Re-export primary types for convenience.
pub use crate::core::JobHandle;
pub use error::JobError;
pub use event::{JobDescription, JobEvent, JobResult};
pub use incoming::IncomingTransferJob;
pub use oracle::{AutoDecide, ConflictChoice, DecisionOracle, OracleFuture, PartialChoice};
pub use outgoing::OutgoingTransferJob;
