//! Status command: the in-progress task and its stored focus score.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use ft_core::{SegmentRepository, Task, weighted_focus_percent};
use ft_db::Database;
use serde::Serialize;

use super::util::{format_elapsed, format_focus, short_id};

/// Snapshot of stored tracking state.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub task: Option<Task>,
    /// Recomputed from stored segments; `None` until a window has been scored.
    pub focus_score_percent: Option<u8>,
    pub segment_count: usize,
}

pub fn build_status(db: &Database) -> Result<StatusReport> {
    let Some(task) = db.in_progress_task()? else {
        return Ok(StatusReport {
            task: None,
            focus_score_percent: None,
            segment_count: 0,
        });
    };

    let segments = db.segments_for_task(&task.id)?;
    let focus_score_percent = (!segments.is_empty()).then(|| {
        weighted_focus_percent(
            segments
                .iter()
                .map(|segment| (segment.alignment_score, segment.duration_seconds)),
        )
    });

    Ok(StatusReport {
        task: Some(task),
        focus_score_percent,
        segment_count: segments.len(),
    })
}

pub fn format_status(report: &StatusReport) -> String {
    let mut output = String::new();

    let Some(task) = &report.task else {
        writeln!(output, "No task in progress.").unwrap();
        writeln!(output, "Start one with 'ft task start <id>'.").unwrap();
        return output;
    };

    writeln!(output, "Task: {} ({})", task.description, short_id(&task.id)).unwrap();
    if let Some(context) = &task.context {
        writeln!(output, "Context: {context}").unwrap();
    }
    writeln!(output, "Elapsed: {}", format_elapsed(task.total_elapsed_seconds)).unwrap();
    match report.focus_score_percent {
        Some(_) => writeln!(
            output,
            "Focus: {} across {} segment(s)",
            format_focus(report.focus_score_percent),
            report.segment_count
        )
        .unwrap(),
        None => writeln!(output, "Focus: - (no scored windows yet)").unwrap(),
    }

    output
}

pub fn run<W: Write>(writer: &mut W, db: &Database, json: bool) -> Result<()> {
    let report = build_status(db)?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        write!(writer, "{}", format_status(&report))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use ft_core::{AlignmentScore, FocusSegment, TaskStatus, window_context_hash};
    use insta::assert_snapshot;

    fn segment(task: &Task, process: &str, score: i64, seconds: i64) -> FocusSegment {
        FocusSegment {
            task_id: task.id.clone(),
            context_hash: window_context_hash(process, "window"),
            alignment_score: AlignmentScore::new(score).unwrap(),
            duration_seconds: seconds,
            window_title: Some("window".to_string()),
            process_name: Some(process.to_string()),
        }
    }

    fn render(db: &Database, task: Option<&Task>) -> String {
        let mut output = Vec::new();
        run(&mut output, db, false).unwrap();
        let output = String::from_utf8(output).unwrap();
        match task {
            Some(task) => output.replace(&short_id(&task.id), "TASKID01"),
            None => output,
        }
    }

    #[test]
    fn status_without_task() {
        let db = Database::open_in_memory().unwrap();
        assert_snapshot!(render(&db, None), @r"
        No task in progress.
        Start one with 'ft task start <id>'.
        ");
    }

    #[test]
    fn status_before_any_score() {
        let mut db = Database::open_in_memory().unwrap();
        let task = db.add_task("Write report", Some("docs")).unwrap();
        db.set_task_status(&task.id, TaskStatus::InProgress).unwrap();
        db.update_task_elapsed(&task.id, 42).unwrap();

        assert_snapshot!(render(&db, Some(&task)), @r"
        Task: Write report (TASKID01)
        Context: docs
        Elapsed: 42s
        Focus: - (no scored windows yet)
        ");
    }

    #[test]
    fn status_weights_stored_segments() {
        let mut db = Database::open_in_memory().unwrap();
        let task = db.add_task("Write report", None).unwrap();
        db.set_task_status(&task.id, TaskStatus::InProgress).unwrap();
        db.update_task_elapsed(&task.id, 3723).unwrap();
        db.upsert_segments(&[segment(&task, "code", 10, 50), segment(&task, "firefox", 2, 50)])
            .unwrap();

        assert_snapshot!(render(&db, Some(&task)), @r"
        Task: Write report (TASKID01)
        Elapsed: 1h 02m
        Focus: 60% across 2 segment(s)
        ");
    }

    #[test]
    fn status_json() {
        let mut db = Database::open_in_memory().unwrap();
        let task = db.add_task("Write report", None).unwrap();
        db.set_task_status(&task.id, TaskStatus::InProgress).unwrap();
        db.upsert_segments(&[segment(&task, "code", 8, 60)]).unwrap();

        let mut output = Vec::new();
        run(&mut output, &db, true).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();

        assert_eq!(value["task"]["id"], task.id.as_str());
        assert_eq!(value["task"]["status"], "in_progress");
        assert_eq!(value["focus_score_percent"], 80);
        assert_eq!(value["segment_count"], 1);
    }
}
