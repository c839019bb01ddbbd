//! File-transfer channel handler.
//!
//! The middleware approves a batch of file-transfer channels and hands
//! them here; this crate decides which become jobs, keeps the number of
//! running jobs within a budget, and folds every job's events into one
//! stream front ends can subscribe to.

pub mod budget;
pub mod config;
pub mod dispatch;
pub mod event;

// Re-export primary types for convenience.
pub use budget::{JobBudget, JobSlot};
pub use config::HandlerConfig;
pub use dispatch::{ChannelDispatcher, DispatchError};
pub use event::HandlerEvent;
