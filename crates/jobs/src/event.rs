//! Events a running job publishes.

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Terminal outcome of a job.
pub type JobResult = Result<(), JobError>;

/// What an external job tracker shows for a running transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescription {
    pub title: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub peer_alias: String,
}

/// Event stream of a transfer job.
///
/// `Finished` is the terminal event and arrives exactly once.
/// `Description` is deliberately delayed past tracker startup and can
/// straggle in after `Finished` for very short jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobEvent {
    /// Tracker-facing description, sent once per job.
    Description(JobDescription),
    /// Human-readable narration for transient display.
    Info(String),
    /// Processed bytes out of the channel-reported total.
    Progress { processed: u64, total: u64 },
    /// Published throughput in bytes per second.
    Speed(u64),
    /// Terminal result.
    Finished(JobResult),
}
