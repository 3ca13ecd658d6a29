//! Segment aggregation state machine.
//!
//! Turns window observations and alignment scores into per-task focus
//! segments and a single focus-score percentage.
//!
//! The aggregator is in one of three states:
//! - **Idle**: nothing is accruing time
//! - **Pending**: a context is observed but its score is not known yet
//! - **Scoring**: a (task, context, score) segment is accruing time
//!
//! Pending time that never receives a score is discarded; unscored time is not
//! attributable to any segment.
//!
//! # Thread Safety
//!
//! The aggregator holds no locks. It must have a single writer; the tracker in
//! `ft-monitor` owns it inside one actor task.
//!
//! # Precision
//!
//! Live intervals accumulate in milliseconds so frequent pause/resume cycles
//! keep their sub-second remainders. Reported, scored, and persisted durations
//! are whole seconds.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::segment::{FocusSegment, SegmentKey, weighted_focus_percent};
use crate::store::SegmentRepository;
use crate::types::{AlignmentScore, ContextHash, TaskId};

/// Identifies one pending segment.
///
/// A score can only be applied with the ticket of the live pending segment,
/// so results of superseded classifications are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingTicket(u64);

impl PendingTicket {
    pub const fn generation(self) -> u64 {
        self.0
    }
}

/// Observable state of the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Idle,
    Pending,
    Scoring,
}

#[derive(Debug, Clone)]
struct TrackedSegment {
    window_title: Option<String>,
    process_name: Option<String>,
    duration_ms: i64,
}

#[derive(Debug, Clone)]
struct PendingSegment {
    ticket: PendingTicket,
    task_id: TaskId,
    context_hash: ContextHash,
    window_title: Option<String>,
    process_name: Option<String>,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
enum Active {
    #[default]
    Idle,
    Pending(PendingSegment),
    Scoring {
        key: SegmentKey,
        started_at: DateTime<Utc>,
    },
}

/// In-memory owner of focus segments and the active/pending markers.
#[derive(Debug, Default)]
pub struct SegmentAggregator {
    segments: HashMap<SegmentKey, TrackedSegment>,
    active: Active,
    current_task: Option<TaskId>,
    has_real_score: bool,
    generation: u64,
}

impl SegmentAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    pub const fn state(&self) -> AggregatorState {
        match self.active {
            Active::Idle => AggregatorState::Idle,
            Active::Pending(_) => AggregatorState::Pending,
            Active::Scoring { .. } => AggregatorState::Scoring,
        }
    }

    /// Returns the task of the most recent start/load, if any.
    pub const fn current_task(&self) -> Option<&TaskId> {
        self.current_task.as_ref()
    }

    /// Starts accruing time for a context whose score is already known.
    pub fn start_or_resume_segment(
        &mut self,
        task_id: &TaskId,
        context_hash: &ContextHash,
        score: AlignmentScore,
        window_title: Option<&str>,
        process_name: Option<&str>,
    ) {
        self.start_or_resume_segment_at(
            task_id,
            context_hash,
            score,
            window_title,
            process_name,
            Utc::now(),
        );
    }

    pub fn start_or_resume_segment_at(
        &mut self,
        task_id: &TaskId,
        context_hash: &ContextHash,
        score: AlignmentScore,
        window_title: Option<&str>,
        process_name: Option<&str>,
        now: DateTime<Utc>,
    ) {
        self.pause_current_segment_at(now);
        let key = SegmentKey {
            task_id: task_id.clone(),
            context_hash: context_hash.clone(),
            alignment_score: score,
        };
        self.touch_segment(&key, window_title, process_name);
        tracing::debug!(task = %task_id, context = %context_hash, %score, "segment started");

        self.current_task = Some(task_id.clone());
        self.has_real_score = true;
        self.active = Active::Scoring {
            key,
            started_at: now,
        };
    }

    /// Starts observing a context whose score is not known yet.
    ///
    /// Returns the ticket that must accompany the eventual score.
    pub fn start_pending_segment(
        &mut self,
        task_id: &TaskId,
        context_hash: &ContextHash,
        window_title: Option<&str>,
        process_name: Option<&str>,
    ) -> PendingTicket {
        self.start_pending_segment_at(task_id, context_hash, window_title, process_name, Utc::now())
    }

    pub fn start_pending_segment_at(
        &mut self,
        task_id: &TaskId,
        context_hash: &ContextHash,
        window_title: Option<&str>,
        process_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> PendingTicket {
        self.pause_current_segment_at(now);
        self.generation += 1;
        let ticket = PendingTicket(self.generation);
        tracing::debug!(task = %task_id, context = %context_hash, generation = ticket.0, "pending segment started");

        self.current_task = Some(task_id.clone());
        self.active = Active::Pending(PendingSegment {
            ticket,
            task_id: task_id.clone(),
            context_hash: context_hash.clone(),
            window_title: window_title.map(str::to_string),
            process_name: process_name.map(str::to_string),
            started_at: now,
        });
        ticket
    }

    /// Resolves the pending segment to a concrete score.
    ///
    /// The elapsed pending time is credited to the (task, context, score)
    /// segment, which then becomes the active one. Returns `false` without
    /// changing anything when `ticket` is not the live pending segment.
    pub fn update_pending_segment_score(
        &mut self,
        ticket: PendingTicket,
        score: AlignmentScore,
    ) -> bool {
        self.update_pending_segment_score_at(ticket, score, Utc::now())
    }

    pub fn update_pending_segment_score_at(
        &mut self,
        ticket: PendingTicket,
        score: AlignmentScore,
        now: DateTime<Utc>,
    ) -> bool {
        let pending = match &self.active {
            Active::Pending(pending) if pending.ticket == ticket => pending.clone(),
            _ => {
                tracing::debug!(generation = ticket.0, "ignoring score for stale pending segment");
                return false;
            }
        };

        let key = SegmentKey {
            task_id: pending.task_id,
            context_hash: pending.context_hash,
            alignment_score: score,
        };
        let elapsed_ms = elapsed_ms(pending.started_at, now);
        let segment = self.touch_segment(
            &key,
            pending.window_title.as_deref(),
            pending.process_name.as_deref(),
        );
        segment.duration_ms += elapsed_ms;
        tracing::debug!(
            task = %key.task_id,
            context = %key.context_hash,
            %score,
            credited_ms = elapsed_ms,
            "pending segment scored"
        );

        self.has_real_score = true;
        self.active = Active::Scoring {
            key,
            started_at: now,
        };
        true
    }

    /// Flushes the active segment's elapsed time and returns to idle.
    ///
    /// A pending segment without a score is discarded.
    pub fn pause_current_segment(&mut self) {
        self.pause_current_segment_at(Utc::now());
    }

    pub fn pause_current_segment_at(&mut self, now: DateTime<Utc>) {
        match std::mem::take(&mut self.active) {
            Active::Idle => {}
            Active::Pending(pending) => {
                tracing::debug!(
                    generation = pending.ticket.0,
                    discarded_ms = elapsed_ms(pending.started_at, now),
                    "discarding unscored pending time"
                );
            }
            Active::Scoring { key, started_at } => {
                let elapsed = elapsed_ms(started_at, now);
                if let Some(segment) = self.segments.get_mut(&key) {
                    segment.duration_ms += elapsed;
                }
            }
        }
    }

    /// Live whole seconds of the active scoring segment; 0 otherwise.
    pub fn current_segment_duration_seconds(&self) -> i64 {
        self.current_segment_duration_seconds_at(Utc::now())
    }

    pub fn current_segment_duration_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        self.live_ms_at(now).map_or(0, |(_, ms)| ms / 1000)
    }

    /// Duration-weighted focus score for a task, scaled to 0-100.
    ///
    /// Includes the not-yet-flushed portion of the active segment.
    pub fn focus_score_percent(&self, task_id: &TaskId) -> u8 {
        self.focus_score_percent_at(task_id, Utc::now())
    }

    pub fn focus_score_percent_at(&self, task_id: &TaskId, now: DateTime<Utc>) -> u8 {
        weighted_focus_percent(
            self.segments_at(now)
                .into_iter()
                .filter(|segment| &segment.task_id == task_id)
                .map(|segment| (segment.alignment_score, segment.duration_seconds)),
        )
    }

    /// Whether any (context, score) pair has been resolved for the task.
    ///
    /// Distinguishes "no data yet" from a genuine score of 0.
    pub fn has_real_score(&self, task_id: &TaskId) -> bool {
        (self.has_real_score && self.current_task.as_ref() == Some(task_id))
            || self.segments.keys().any(|key| &key.task_id == task_id)
    }

    /// All segments with their live duration included, keeping only positive ones.
    ///
    /// Sorted by key for deterministic output.
    pub fn segments_at(&self, now: DateTime<Utc>) -> Vec<FocusSegment> {
        let live = self.live_ms_at(now);
        let mut segments: Vec<FocusSegment> = self
            .segments
            .iter()
            .filter_map(|(key, tracked)| {
                let live_ms = match live {
                    Some((active, ms)) if active == key => ms,
                    _ => 0,
                };
                let duration_seconds = (tracked.duration_ms + live_ms) / 1000;
                (duration_seconds > 0).then(|| FocusSegment {
                    task_id: key.task_id.clone(),
                    context_hash: key.context_hash.clone(),
                    alignment_score: key.alignment_score,
                    duration_seconds,
                    window_title: tracked.window_title.clone(),
                    process_name: tracked.process_name.clone(),
                })
            })
            .collect();
        segments.sort_by(|a, b| a.key().cmp(&b.key()));
        segments
    }

    /// Upserts every segment with a positive duration.
    ///
    /// In-memory state is not reset, so repeated flushes store absolute
    /// durations rather than double-counting.
    pub fn persist_segments<R: SegmentRepository>(&self, repo: &mut R) -> Result<usize, R::Error> {
        self.persist_segments_at(repo, Utc::now())
    }

    pub fn persist_segments_at<R: SegmentRepository>(
        &self,
        repo: &mut R,
        now: DateTime<Utc>,
    ) -> Result<usize, R::Error> {
        let segments = self.segments_at(now);
        if segments.is_empty() {
            return Ok(0);
        }
        repo.upsert_segments(&segments)
    }

    /// Replaces in-memory state with the repository's segments for a task.
    pub fn load_segments_for_task<R: SegmentRepository>(
        &mut self,
        repo: &R,
        task_id: &TaskId,
    ) -> Result<(), R::Error> {
        let segments = repo.segments_for_task(task_id)?;
        self.replace_segments(task_id, segments);
        Ok(())
    }

    /// Replaces in-memory state wholesale and clears active/pending markers.
    pub fn replace_segments(&mut self, task_id: &TaskId, segments: Vec<FocusSegment>) {
        self.segments.clear();
        for segment in segments {
            let key = segment.key();
            self.segments.insert(
                key,
                TrackedSegment {
                    window_title: segment.window_title,
                    process_name: segment.process_name,
                    duration_ms: segment.duration_seconds.saturating_mul(1000),
                },
            );
        }
        self.active = Active::Idle;
        self.current_task = Some(task_id.clone());
        self.has_real_score = !self.segments.is_empty();
        tracing::debug!(task = %task_id, segments = self.segments.len(), "segments loaded");
    }

    /// Forgets a task's in-memory segments without touching the repository.
    pub fn clear_task_segments(&mut self, task_id: &TaskId) {
        self.segments.retain(|key, _| &key.task_id != task_id);
        if self.current_task.as_ref() == Some(task_id) {
            self.active = Active::Idle;
            self.has_real_score = false;
        }
    }

    fn touch_segment(
        &mut self,
        key: &SegmentKey,
        window_title: Option<&str>,
        process_name: Option<&str>,
    ) -> &mut TrackedSegment {
        let segment = self
            .segments
            .entry(key.clone())
            .or_insert_with(|| TrackedSegment {
                window_title: None,
                process_name: None,
                duration_ms: 0,
            });
        if let Some(title) = window_title {
            segment.window_title = Some(title.to_string());
        }
        if let Some(process) = process_name {
            segment.process_name = Some(process.to_string());
        }
        segment
    }

    fn live_ms_at(&self, now: DateTime<Utc>) -> Option<(&SegmentKey, i64)> {
        match &self.active {
            Active::Scoring { key, started_at } => Some((key, elapsed_ms(*started_at, now))),
            _ => None,
        }
    }
}

fn elapsed_ms(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(start).num_milliseconds().max(0)
}
