//! Storage layer for the focus tracker.
//!
//! Provides persistence for tasks, focus segments and the alignment cache using
//! `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! This means a `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization. The tracker shares one
//! connection as `Arc<Mutex<Database>>` between its flush task and the
//! classification cache.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in ISO 8601 format with millisecond precision
//! (e.g., `2024-01-15T10:30:00.000Z`). Every writer uses the same format, so
//! lexicographic ordering matches chronological ordering and age-based deletes
//! can compare strings directly.
//!
//! ## Segment Identity
//!
//! `focus_segments` has one row per (task, context hash, alignment score). Upserts
//! replace the stored duration with the caller's absolute value; the aggregator
//! owns the running total.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use ft_core::{
    AlignmentCacheEntry, AlignmentCacheStore, AlignmentScore, ContextHash, FocusSegment,
    SegmentRepository, Task, TaskContentHash, TaskId, TaskStatus, ValidationError, WindowContext,
};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use uuid::Uuid;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored or supplied value failed domain validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp in {table}: {timestamp}")]
    TimestampParse {
        table: &'static str,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// No task matched the given ID.
    #[error("task not found: {0}")]
    TaskNotFound(String),
    /// A task ID prefix matched more than one task.
    #[error("task ID prefix {prefix} is ambiguous ({matches} matches)")]
    AmbiguousTaskId { prefix: String, matches: usize },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                context TEXT,
                status TEXT NOT NULL DEFAULT 'todo',
                created_at TEXT NOT NULL,
                total_elapsed_seconds INTEGER NOT NULL DEFAULT 0,
                focus_score_percent INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);

            -- One row per (task, window context, alignment score)
            CREATE TABLE IF NOT EXISTS focus_segments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                context_hash TEXT NOT NULL,
                alignment_score INTEGER NOT NULL CHECK (alignment_score BETWEEN 1 AND 10),
                duration_seconds INTEGER NOT NULL DEFAULT 0,
                window_title TEXT,
                process_name TEXT,
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_focus_segments_key
                ON focus_segments(task_id, context_hash, alignment_score);

            CREATE TABLE IF NOT EXISTS window_contexts (
                context_hash TEXT PRIMARY KEY,
                process_name TEXT NOT NULL,
                window_title TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS alignment_cache (
                context_hash TEXT NOT NULL,
                task_content_hash TEXT NOT NULL,
                score INTEGER NOT NULL CHECK (score BETWEEN 1 AND 10),
                reason TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                PRIMARY KEY (context_hash, task_content_hash),
                FOREIGN KEY (context_hash) REFERENCES window_contexts(context_hash) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_alignment_cache_created ON alignment_cache(created_at);
            ",
        )?;
        Ok(())
    }

    /// Creates a new task in the `todo` state.
    ///
    /// The description is trimmed and must be non-empty; a blank context hint
    /// is stored as absent.
    pub fn add_task(&mut self, description: &str, context: Option<&str>) -> Result<Task, DbError> {
        self.add_task_at(description, context, Utc::now())
    }

    fn add_task_at(
        &mut self,
        description: &str,
        context: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Task, DbError> {
        let description = normalize_description(description)?;
        let context = normalize_context(context);
        let task = Task {
            id: TaskId::new(Uuid::new_v4().to_string())?,
            description,
            context,
            status: TaskStatus::Todo,
            created_at: now,
            total_elapsed_seconds: 0,
            focus_score_percent: None,
        };
        self.conn.execute(
            "
            INSERT INTO tasks (id, description, context, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            ",
            params![
                task.id.as_str(),
                task.description,
                task.context,
                task.status.as_str(),
                format_timestamp(task.created_at),
            ],
        )?;
        tracing::debug!(task = %task.id, "task created");
        Ok(task)
    }

    /// Fetches a task by exact ID.
    pub fn get_task(&self, id: &TaskId) -> Result<Option<Task>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"),
                [id.as_str()],
                TaskRow::from_row,
            )
            .optional()?;
        row.map(TaskRow::into_task).transpose()
    }

    /// Resolves a full task ID or a unique ID prefix.
    pub fn resolve_task(&self, id_or_prefix: &str) -> Result<Task, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 OR id LIKE ?2 || '%' ESCAPE '\\' ORDER BY id = ?1 DESC"
        ))?;
        let escaped = id_or_prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let rows = stmt.query_map(params![id_or_prefix, escaped], TaskRow::from_row)?;
        let mut matches = Vec::new();
        for row in rows {
            matches.push(row?);
        }
        match matches.len() {
            0 => Err(DbError::TaskNotFound(id_or_prefix.to_string())),
            1 => matches.remove(0).into_task(),
            n if matches[0].id == id_or_prefix => {
                tracing::debug!(matches = n, "exact task ID match shadows prefix matches");
                matches.remove(0).into_task()
            }
            n => Err(DbError::AmbiguousTaskId {
                prefix: id_or_prefix.to_string(),
                matches: n,
            }),
        }
    }

    /// Lists tasks ordered by creation time, optionally filtered by status.
    pub fn list_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<Task>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE ?1 IS NULL OR status = ?1
            ORDER BY created_at ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map([status.map(|s| s.as_str())], TaskRow::from_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?.into_task()?);
        }
        Ok(tasks)
    }

    /// Returns the single task currently in progress, if any.
    pub fn in_progress_task(&self) -> Result<Option<Task>, DbError> {
        Ok(self.list_tasks(Some(TaskStatus::InProgress))?.into_iter().next())
    }

    /// Changes a task's status.
    ///
    /// Setting a task in progress demotes any other in-progress task to `todo`.
    pub fn set_task_status(&mut self, id: &TaskId, status: TaskStatus) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        if status == TaskStatus::InProgress {
            let demoted = tx.execute(
                "UPDATE tasks SET status = ? WHERE status = ? AND id != ?",
                params![
                    TaskStatus::Todo.as_str(),
                    TaskStatus::InProgress.as_str(),
                    id.as_str()
                ],
            )?;
            if demoted > 0 {
                tracing::debug!(demoted, "demoted previously active task");
            }
        }
        let updated = tx.execute(
            "UPDATE tasks SET status = ? WHERE id = ?",
            params![status.as_str(), id.as_str()],
        )?;
        if updated == 0 {
            return Err(DbError::TaskNotFound(id.to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    /// Replaces a task's description and context hint.
    ///
    /// This changes the task content hash, so cached verdicts for the old
    /// content no longer apply.
    pub fn update_task_description(
        &mut self,
        id: &TaskId,
        description: &str,
        context: Option<&str>,
    ) -> Result<(), DbError> {
        let description = normalize_description(description)?;
        let updated = self.conn.execute(
            "UPDATE tasks SET description = ?, context = ? WHERE id = ?",
            params![description, normalize_context(context), id.as_str()],
        )?;
        ensure_updated(updated, id)
    }

    pub fn update_task_elapsed(&mut self, id: &TaskId, seconds: i64) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE tasks SET total_elapsed_seconds = ? WHERE id = ?",
            params![seconds.max(0), id.as_str()],
        )?;
        ensure_updated(updated, id)
    }

    pub fn update_task_focus_score(
        &mut self,
        id: &TaskId,
        percent: Option<u8>,
    ) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE tasks SET focus_score_percent = ? WHERE id = ?",
            params![percent, id.as_str()],
        )?;
        ensure_updated(updated, id)
    }

    /// Deletes a task; its segments are removed by cascade.
    pub fn delete_task(&mut self, id: &TaskId) -> Result<(), DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?", [id.as_str()])?;
        ensure_updated(deleted, id)?;
        tracing::debug!(task = %id, "task deleted");
        Ok(())
    }

    /// Saves a tracking checkpoint in one transaction: segments, elapsed
    /// seconds and focus percentage.
    pub fn save_progress(
        &mut self,
        id: &TaskId,
        segments: &[FocusSegment],
        elapsed_seconds: i64,
        focus_score_percent: Option<u8>,
    ) -> Result<usize, DbError> {
        let tx = self.conn.transaction()?;
        let upserted = upsert_segments_in(&tx, segments)?;
        let updated = tx.execute(
            "UPDATE tasks SET total_elapsed_seconds = ?, focus_score_percent = ? WHERE id = ?",
            params![elapsed_seconds.max(0), focus_score_percent, id.as_str()],
        )?;
        ensure_updated(updated, id)?;
        tx.commit()?;
        Ok(upserted)
    }

    /// Number of alignment cache entries currently stored.
    pub fn cache_entry_count(&self) -> Result<usize, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM alignment_cache", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl SegmentRepository for Database {
    type Error = DbError;

    fn upsert_segments(&mut self, segments: &[FocusSegment]) -> Result<usize, DbError> {
        if segments.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let upserted = upsert_segments_in(&tx, segments)?;
        tx.commit()?;
        Ok(upserted)
    }

    fn segments_for_task(&self, task_id: &TaskId) -> Result<Vec<FocusSegment>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT task_id, context_hash, alignment_score, duration_seconds, window_title, process_name
            FROM focus_segments
            WHERE task_id = ?
            ORDER BY duration_seconds DESC, context_hash ASC, alignment_score ASC
            ",
        )?;
        let rows = stmt.query_map([task_id.as_str()], |row| {
            Ok(SegmentRow {
                task_id: row.get(0)?,
                context_hash: row.get(1)?,
                alignment_score: row.get(2)?,
                duration_seconds: row.get(3)?,
                window_title: row.get(4)?,
                process_name: row.get(5)?,
            })
        })?;
        let mut segments = Vec::new();
        for row in rows {
            segments.push(row?.into_segment()?);
        }
        Ok(segments)
    }

    fn delete_segments_for_task(&mut self, task_id: &TaskId) -> Result<usize, DbError> {
        Ok(self
            .conn
            .execute("DELETE FROM focus_segments WHERE task_id = ?", [task_id.as_str()])?)
    }
}

impl AlignmentCacheStore for Database {
    type Error = DbError;

    fn get(
        &self,
        context_hash: &ContextHash,
        task_content_hash: &TaskContentHash,
    ) -> Result<Option<AlignmentCacheEntry>, DbError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT score, reason, created_at
                FROM alignment_cache
                WHERE context_hash = ? AND task_content_hash = ?
                ",
                [context_hash.as_str(), task_content_hash.as_str()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((score, reason, created_at)) = row else {
            return Ok(None);
        };
        Ok(Some(AlignmentCacheEntry {
            context_hash: context_hash.clone(),
            task_content_hash: task_content_hash.clone(),
            score: AlignmentScore::clamped(score),
            reason,
            created_at: parse_timestamp(&created_at, "alignment_cache")?,
        }))
    }

    fn save(&mut self, window: &WindowContext, entry: &AlignmentCacheEntry) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "
            INSERT OR IGNORE INTO window_contexts (context_hash, process_name, window_title)
            VALUES (?, ?, ?)
            ",
            params![
                window.context_hash.as_str(),
                window.process_name,
                window.window_title
            ],
        )?;
        tx.execute(
            "
            INSERT INTO alignment_cache (context_hash, task_content_hash, score, reason, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(context_hash, task_content_hash) DO UPDATE SET
                score = excluded.score,
                reason = excluded.reason,
                created_at = excluded.created_at
            ",
            params![
                entry.context_hash.as_str(),
                entry.task_content_hash.as_str(),
                i64::from(entry.score),
                entry.reason,
                format_timestamp(entry.created_at),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        Ok(self.conn.execute(
            "DELETE FROM alignment_cache WHERE created_at < ?",
            [format_timestamp(cutoff)],
        )?)
    }
}

const TASK_COLUMNS: &str =
    "id, description, context, status, created_at, total_elapsed_seconds, focus_score_percent";

/// Raw `tasks` row before domain validation.
struct TaskRow {
    id: String,
    description: String,
    context: Option<String>,
    status: String,
    created_at: String,
    total_elapsed_seconds: i64,
    focus_score_percent: Option<i64>,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            description: row.get(1)?,
            context: row.get(2)?,
            status: row.get(3)?,
            created_at: row.get(4)?,
            total_elapsed_seconds: row.get(5)?,
            focus_score_percent: row.get(6)?,
        })
    }

    fn into_task(self) -> Result<Task, DbError> {
        Ok(Task {
            id: TaskId::new(self.id)?,
            description: self.description,
            context: self.context,
            status: self.status.parse()?,
            created_at: parse_timestamp(&self.created_at, "tasks")?,
            total_elapsed_seconds: self.total_elapsed_seconds,
            focus_score_percent: self
                .focus_score_percent
                .and_then(|p| u8::try_from(p.clamp(0, 100)).ok()),
        })
    }
}

/// Raw `focus_segments` row before domain validation.
struct SegmentRow {
    task_id: String,
    context_hash: String,
    alignment_score: i64,
    duration_seconds: i64,
    window_title: Option<String>,
    process_name: Option<String>,
}

impl SegmentRow {
    fn into_segment(self) -> Result<FocusSegment, DbError> {
        Ok(FocusSegment {
            task_id: TaskId::new(self.task_id)?,
            context_hash: ContextHash::new(self.context_hash)?,
            alignment_score: AlignmentScore::clamped(self.alignment_score),
            duration_seconds: self.duration_seconds,
            window_title: self.window_title,
            process_name: self.process_name,
        })
    }
}

fn upsert_segments_in(conn: &Connection, segments: &[FocusSegment]) -> Result<usize, DbError> {
    let mut stmt = conn.prepare(
        "
        INSERT INTO focus_segments
        (task_id, context_hash, alignment_score, duration_seconds, window_title, process_name)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(task_id, context_hash, alignment_score) DO UPDATE SET
            duration_seconds = excluded.duration_seconds,
            window_title = COALESCE(excluded.window_title, window_title),
            process_name = COALESCE(excluded.process_name, process_name)
        ",
    )?;
    let mut upserted = 0;
    for segment in segments {
        upserted += stmt.execute(params![
            segment.task_id.as_str(),
            segment.context_hash.as_str(),
            i64::from(segment.alignment_score),
            segment.duration_seconds,
            segment.window_title,
            segment.process_name,
        ])?;
    }
    Ok(upserted)
}

fn normalize_description(description: &str) -> Result<String, DbError> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty {
            field: "task description",
        }
        .into());
    }
    Ok(trimmed.to_string())
}

fn normalize_context(context: Option<&str>) -> Option<String> {
    context
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

fn ensure_updated(rows: usize, id: &TaskId) -> Result<(), DbError> {
    if rows == 0 {
        return Err(DbError::TaskNotFound(id.to_string()));
    }
    Ok(())
}

fn parse_timestamp(timestamp: &str, table: &'static str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            table,
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
