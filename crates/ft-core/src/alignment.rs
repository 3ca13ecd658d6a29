//! Alignment classification contracts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AlignmentScore, ContextHash, TaskContentHash};

/// How well a window matches a task, as judged by a classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentResult {
    pub score: AlignmentScore,
    #[serde(default)]
    pub reason: String,
}

/// Memoized classifier output for a (window context, task content) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentCacheEntry {
    pub context_hash: ContextHash,
    pub task_content_hash: TaskContentHash,
    pub score: AlignmentScore,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl AlignmentCacheEntry {
    pub fn result(&self) -> AlignmentResult {
        AlignmentResult {
            score: self.score,
            reason: self.reason.clone(),
        }
    }
}

/// Input for a single classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRequest {
    pub task_description: String,
    pub task_context: Option<String>,
    pub process_name: String,
    pub window_title: String,
}

/// Why a classification produced no result.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// No credentials or backend configured; scoring stays unknown.
    #[error("classifier is not configured")]
    NotConfigured,
    /// The backend failed or returned something unusable.
    #[error("classification failed: {0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ClassifyError {
    /// Wraps a backend error.
    pub fn failed(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Failed(Box::new(err))
    }
}

/// Scores a window against a task.
///
/// Implementations must be safe to call concurrently and must not block
/// indefinitely; callers apply their own timeout.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<AlignmentResult, ClassifyError>;
}

#[async_trait]
impl<C: Classifier + ?Sized> Classifier for std::sync::Arc<C> {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<AlignmentResult, ClassifyError> {
        (**self).classify(request).await
    }
}
