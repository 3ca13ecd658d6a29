//! User-declared tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{TaskId, TaskStatus};
use crate::window::task_content_hash;
use crate::TaskContentHash;

/// A task the user declared they are working on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    /// Optional hint about relevant apps, sites, or keywords.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub total_elapsed_seconds: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_score_percent: Option<u8>,
}

impl Task {
    /// Digest of the description and context hint, used as half of the cache key.
    pub fn content_hash(&self) -> TaskContentHash {
        task_content_hash(&self.description, self.context.as_deref())
    }

    /// Whether this is the task currently being tracked.
    pub fn is_active(&self) -> bool {
        self.status == TaskStatus::InProgress
    }
}
