//! Aggregated focus segments.

use serde::{Deserialize, Serialize};

use crate::types::{AlignmentScore, ContextHash, TaskId};

/// Time spent in one window context at one alignment score for a task.
///
/// One row per unique (task, context, score) combination; duration accumulates
/// across visits. The same context at a different score is a separate segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusSegment {
    pub task_id: TaskId,
    pub context_hash: ContextHash,
    pub alignment_score: AlignmentScore,
    pub duration_seconds: i64,
    /// Last-seen title, for display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    /// Last-seen process name, for display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
}

impl FocusSegment {
    /// Returns the identity used for upserts.
    pub fn key(&self) -> SegmentKey {
        SegmentKey {
            task_id: self.task_id.clone(),
            context_hash: self.context_hash.clone(),
            alignment_score: self.alignment_score,
        }
    }
}

/// Unique identity of a segment within the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentKey {
    pub task_id: TaskId,
    pub context_hash: ContextHash,
    pub alignment_score: AlignmentScore,
}

/// Duration-weighted average score scaled to 0-100.
///
/// Each item is `(score, weight)`; weights can be in any consistent unit.
/// Returns 0 when the total weight is 0.
pub fn weighted_focus_percent<I>(items: I) -> u8
where
    I: IntoIterator<Item = (AlignmentScore, i64)>,
{
    let mut total: i128 = 0;
    let mut weighted: i128 = 0;
    for (score, weight) in items {
        if weight <= 0 {
            continue;
        }
        total += i128::from(weight);
        weighted += i128::from(score.value()) * i128::from(weight);
    }
    if total == 0 {
        return 0;
    }
    // round(10 * weighted / total), half away from zero
    let percent = (weighted * 20 + total) / (total * 2);
    u8::try_from(percent).unwrap_or(100)
}
