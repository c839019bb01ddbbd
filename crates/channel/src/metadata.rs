//! Immutable transfer metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of the properties a channel reports for its transfer.
///
/// Everything here is fixed by the middleware once the channel is ready;
/// jobs treat it as read-only. `uri` is only meaningful for outgoing
/// transfers, where it names the local source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDetails {
    pub file_name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Display name of the remote contact, used in narration.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub peer_alias: String,
}
