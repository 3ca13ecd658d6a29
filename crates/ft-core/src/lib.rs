//! Core domain logic for the focus tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Hashing: content addresses for window contexts and task content
//! - Aggregation: turning observed windows and alignment scores into focus segments
//! - Caching: memoizing classifier verdicts per (window, task) pair
//! - Collaborator contracts: the classifier and storage traits other crates implement

pub mod aggregator;
pub mod alignment;
pub mod cache;
pub mod segment;
pub mod store;
pub mod task;
pub mod types;
pub mod window;

pub use aggregator::{AggregatorState, PendingTicket, SegmentAggregator};
pub use alignment::{
    AlignmentCacheEntry, AlignmentResult, ClassificationRequest, Classifier, ClassifyError,
};
pub use cache::{CacheError, ClassificationCache};
pub use segment::{FocusSegment, SegmentKey, weighted_focus_percent};
pub use store::{AlignmentCacheStore, SegmentRepository};
pub use task::Task;
pub use types::{AlignmentScore, ContextHash, TaskContentHash, TaskId, TaskStatus, ValidationError};
pub use window::{
    MAX_WINDOW_TITLE_CHARS, WindowContext, normalize_window_title, task_content_hash,
    window_context_hash,
};
