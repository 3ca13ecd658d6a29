//! Storage collaborator contracts.
//!
//! `ft-db` provides the SQLite implementations; tests use in-memory fakes.

use chrono::{DateTime, Utc};

use crate::alignment::AlignmentCacheEntry;
use crate::segment::FocusSegment;
use crate::types::{ContextHash, TaskContentHash, TaskId};
use crate::window::WindowContext;

/// Persistent home of focus segments.
pub trait SegmentRepository {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Inserts or replaces segments keyed by (task, context hash, score).
    ///
    /// The stored duration is set to the given value, not added to it.
    fn upsert_segments(&mut self, segments: &[FocusSegment]) -> Result<usize, Self::Error>;

    /// Returns all stored segments for a task.
    fn segments_for_task(&self, task_id: &TaskId) -> Result<Vec<FocusSegment>, Self::Error>;

    /// Deletes all stored segments for a task, returning how many were removed.
    fn delete_segments_for_task(&mut self, task_id: &TaskId) -> Result<usize, Self::Error>;
}

/// Persistent home of alignment cache entries.
pub trait AlignmentCacheStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn get(
        &self,
        context_hash: &ContextHash,
        task_content_hash: &TaskContentHash,
    ) -> Result<Option<AlignmentCacheEntry>, Self::Error>;

    /// Stores the window context (if new) and the entry.
    fn save(
        &mut self,
        window: &WindowContext,
        entry: &AlignmentCacheEntry,
    ) -> Result<(), Self::Error>;

    /// Deletes entries created strictly before `cutoff`.
    fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<usize, Self::Error>;
}
