//! Content-addressable memoization of classifier results.
//!
//! Entries are keyed by (window context hash, task content hash). A hit never
//! reaches the classifier; only successful classifications are stored.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::alignment::{
    AlignmentCacheEntry, AlignmentResult, ClassificationRequest, Classifier, ClassifyError,
};
use crate::store::AlignmentCacheStore;
use crate::types::{ContextHash, TaskContentHash};
use crate::window::{WindowContext, task_content_hash};

/// Decorates a [`Classifier`] with a persistent lookup/fill layer.
///
/// The store sits behind a mutex that is only held for the duration of a
/// single store call, never across the classifier await.
pub struct ClassificationCache<C, S> {
    classifier: C,
    store: Arc<Mutex<S>>,
}

impl<C, S> ClassificationCache<C, S>
where
    C: Classifier,
    S: AlignmentCacheStore + Send,
{
    pub const fn new(classifier: C, store: Arc<Mutex<S>>) -> Self {
        Self { classifier, store }
    }

    /// Returns the shared store handle.
    pub const fn store(&self) -> &Arc<Mutex<S>> {
        &self.store
    }

    /// Scores a window against a task, consulting the cache first.
    ///
    /// Classifier errors (including "not configured") pass through unchanged
    /// and are never cached.
    pub async fn classify(
        &self,
        task_description: &str,
        task_context: Option<&str>,
        process_name: &str,
        window_title: &str,
    ) -> Result<AlignmentResult, ClassifyError> {
        self.classify_at(
            task_description,
            task_context,
            process_name,
            window_title,
            Utc::now(),
        )
        .await
    }

    pub async fn classify_at(
        &self,
        task_description: &str,
        task_context: Option<&str>,
        process_name: &str,
        window_title: &str,
        now: DateTime<Utc>,
    ) -> Result<AlignmentResult, ClassifyError> {
        let window = WindowContext::new(process_name, window_title);
        let task_hash = task_content_hash(task_description, task_context);

        if let Some(entry) = self.lookup(&window.context_hash, &task_hash) {
            tracing::debug!(context = %window.context_hash, score = %entry.score, "alignment cache hit");
            return Ok(entry.result());
        }
        tracing::debug!(context = %window.context_hash, process = process_name, "alignment cache miss");

        let request = ClassificationRequest {
            task_description: task_description.to_string(),
            task_context: task_context.map(str::to_string),
            process_name: process_name.to_string(),
            window_title: window_title.to_string(),
        };
        let result = self.classifier.classify(&request).await?;

        let entry = AlignmentCacheEntry {
            context_hash: window.context_hash.clone(),
            task_content_hash: task_hash,
            score: result.score,
            reason: result.reason.clone(),
            created_at: now,
        };
        self.save(&window, &entry);
        Ok(result)
    }

    /// Deletes entries older than `max_age`, returning how many were removed.
    pub fn evict_older_than(&self, max_age: Duration) -> Result<usize, CacheError<S::Error>> {
        self.evict_older_than_at(max_age, Utc::now())
    }

    pub fn evict_older_than_at(
        &self,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<usize, CacheError<S::Error>> {
        let cutoff = now - max_age;
        let mut store = self.store.lock().map_err(|_| CacheError::Poisoned)?;
        let removed = store.delete_older_than(cutoff).map_err(CacheError::Store)?;
        tracing::info!(removed, %cutoff, "evicted alignment cache entries");
        Ok(removed)
    }

    fn lookup(
        &self,
        context_hash: &ContextHash,
        task_hash: &TaskContentHash,
    ) -> Option<AlignmentCacheEntry> {
        let Ok(store) = self.store.lock() else {
            tracing::warn!("alignment cache store lock poisoned; treating as miss");
            return None;
        };
        match store.get(context_hash, task_hash) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "alignment cache lookup failed; treating as miss");
                None
            }
        }
    }

    fn save(&self, window: &WindowContext, entry: &AlignmentCacheEntry) {
        let Ok(mut store) = self.store.lock() else {
            tracing::warn!("alignment cache store lock poisoned; result not cached");
            return;
        };
        if let Err(e) = store.save(window, entry) {
            tracing::warn!(error = %e, "failed to save alignment cache entry");
        }
    }
}

/// Errors from explicit cache maintenance.
#[derive(Debug, thiserror::Error)]
pub enum CacheError<E: std::error::Error + 'static> {
    #[error("cache store error: {0}")]
    Store(#[source] E),

    #[error("cache store lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use crate::types::AlignmentScore;

    #[derive(Debug, thiserror::Error)]
    #[error("store offline")]
    struct StoreOffline;

    #[derive(Default)]
    struct MemoryStore {
        entries: HashMap<(ContextHash, TaskContentHash), AlignmentCacheEntry>,
        windows: HashMap<ContextHash, WindowContext>,
        offline: bool,
    }

    impl AlignmentCacheStore for MemoryStore {
        type Error = StoreOffline;

        fn get(
            &self,
            context_hash: &ContextHash,
            task_content_hash: &TaskContentHash,
        ) -> Result<Option<AlignmentCacheEntry>, StoreOffline> {
            if self.offline {
                return Err(StoreOffline);
            }
            Ok(self
                .entries
                .get(&(context_hash.clone(), task_content_hash.clone()))
                .cloned())
        }

        fn save(
            &mut self,
            window: &WindowContext,
            entry: &AlignmentCacheEntry,
        ) -> Result<(), StoreOffline> {
            if self.offline {
                return Err(StoreOffline);
            }
            self.windows
                .entry(window.context_hash.clone())
                .or_insert_with(|| window.clone());
            self.entries.insert(
                (entry.context_hash.clone(), entry.task_content_hash.clone()),
                entry.clone(),
            );
            Ok(())
        }

        fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<usize, StoreOffline> {
            let before = self.entries.len();
            self.entries.retain(|_, entry| entry.created_at >= cutoff);
            Ok(before - self.entries.len())
        }
    }

    /// Classifier that counts calls and either scores or fails.
    struct CountingClassifier {
        calls: AtomicUsize,
        titles: Mutex<Vec<String>>,
        outcome: Option<i64>,
    }

    impl CountingClassifier {
        fn scoring(score: i64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                titles: Mutex::default(),
                outcome: Some(score),
            }
        }

        fn unconfigured() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                titles: Mutex::default(),
                outcome: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Classifier for CountingClassifier {
        async fn classify(
            &self,
            request: &ClassificationRequest,
        ) -> Result<AlignmentResult, ClassifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.titles.lock().unwrap().push(request.window_title.clone());
            match self.outcome {
                Some(score) => Ok(AlignmentResult {
                    score: AlignmentScore::clamped(score),
                    reason: format!("{} looks relevant", request.process_name),
                }),
                None => Err(ClassifyError::NotConfigured),
            }
        }
    }

    fn cache(
        classifier: CountingClassifier,
        store: MemoryStore,
    ) -> ClassificationCache<Arc<CountingClassifier>, MemoryStore> {
        ClassificationCache::new(Arc::new(classifier), Arc::new(Mutex::new(store)))
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn identical_requests_call_classifier_once() {
        let cache = cache(CountingClassifier::scoring(8), MemoryStore::default());

        let first = cache.classify("Write report", None, "word", "Q3.docx").await.unwrap();
        let second = cache.classify("Write report", None, "word", "Q3.docx").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.score.value(), 8);
        assert_eq!(cache.classifier.calls(), 1);
    }

    #[tokio::test]
    async fn different_task_hint_is_a_separate_entry() {
        let cache = cache(CountingClassifier::scoring(5), MemoryStore::default());

        cache.classify("Write report", None, "word", "Q3.docx").await.unwrap();
        cache
            .classify("Write report", Some("use excel too"), "word", "Q3.docx")
            .await
            .unwrap();

        assert_eq!(cache.classifier.calls(), 2);
    }

    #[tokio::test]
    async fn errors_are_passed_through_and_not_cached() {
        let cache = cache(CountingClassifier::unconfigured(), MemoryStore::default());

        for _ in 0..2 {
            let err = cache.classify("Task", None, "term", "bash").await.unwrap_err();
            assert!(matches!(err, ClassifyError::NotConfigured));
        }

        assert_eq!(cache.classifier.calls(), 2);
        assert!(cache.store().lock().unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn successful_result_persists_window_context() {
        let cache = cache(CountingClassifier::scoring(3), MemoryStore::default());
        let long_title = "x".repeat(300);

        cache.classify("Task", None, "browser", &long_title).await.unwrap();

        let store = cache.store().lock().unwrap();
        assert_eq!(store.windows.len(), 1);
        let window = store.windows.values().next().unwrap();
        assert_eq!(window.process_name, "browser");
        assert_eq!(window.window_title.chars().count(), 200);
    }

    #[tokio::test]
    async fn classifier_sees_the_raw_title() {
        let cache = cache(CountingClassifier::scoring(6), MemoryStore::default());
        let title = "y".repeat(250);

        cache.classify("Task", None, "browser", &title).await.unwrap();

        assert_eq!(*cache.classifier.titles.lock().unwrap(), vec![title]);
        let store = cache.store().lock().unwrap();
        let window = store.windows.values().next().unwrap();
        assert_eq!(window.window_title, "y".repeat(200));
    }

    #[tokio::test]
    async fn store_failures_degrade_to_uncached_classification() {
        let store = MemoryStore {
            offline: true,
            ..MemoryStore::default()
        };
        let cache = cache(CountingClassifier::scoring(7), store);

        let result = cache.classify("Task", None, "code", "main.rs").await.unwrap();
        cache.classify("Task", None, "code", "main.rs").await.unwrap();

        assert_eq!(result.score.value(), 7);
        assert_eq!(cache.classifier.calls(), 2);
    }

    #[tokio::test]
    async fn evict_removes_only_entries_before_cutoff() {
        let cache = cache(CountingClassifier::scoring(9), MemoryStore::default());
        cache.classify_at("Task", None, "a", "old", day(1)).await.unwrap();
        cache.classify_at("Task", None, "b", "edge", day(10)).await.unwrap();
        cache.classify_at("Task", None, "c", "new", day(20)).await.unwrap();

        let removed = cache.evict_older_than_at(Duration::days(10), day(20)).unwrap();

        assert_eq!(removed, 1);
        assert_eq!(cache.store().lock().unwrap().entries.len(), 2);
        // evicted context is classified again
        cache.classify_at("Task", None, "a", "old", day(20)).await.unwrap();
        assert_eq!(cache.classifier.calls(), 4);
    }
}
