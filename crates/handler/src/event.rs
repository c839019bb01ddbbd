//! Events the handler publishes about its jobs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use handoff_jobs::{JobDescription, JobResult};

/// Aggregated stream of everything the handler's jobs report, keyed by
/// job id so front ends can multiplex a single subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum HandlerEvent {
    JobRegistered { job: Uuid, description: JobDescription },
    JobInfo { job: Uuid, message: String },
    JobProgress { job: Uuid, processed: u64, total: u64 },
    JobSpeed { job: Uuid, speed: u64 },
    JobFinished { job: Uuid, result: JobResult },
}
