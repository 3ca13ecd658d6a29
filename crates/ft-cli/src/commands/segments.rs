//! Segments command: where a task's time went, longest first.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use ft_core::{FocusSegment, SegmentRepository, Task};
use ft_db::Database;
use serde::Serialize;

use super::util::{format_elapsed, short_id, truncate};

const MAX_PROCESS_CHARS: usize = 15;
const MAX_TITLE_CHARS: usize = 60;

#[derive(Debug, Serialize)]
pub struct JsonSegments {
    pub task: Task,
    pub segments: Vec<FocusSegment>,
}

pub fn format_segments(task: &Task, segments: &[FocusSegment]) -> String {
    let mut output = String::new();

    writeln!(output, "Task: {} ({})", task.description, short_id(&task.id)).unwrap();
    writeln!(output).unwrap();

    if segments.is_empty() {
        writeln!(output, "No focus segments recorded for this task.").unwrap();
        return output;
    }

    writeln!(
        output,
        "{:>5}  {:>8}  {:<15}  Window",
        "Score", "Time", "Process"
    )
    .unwrap();
    writeln!(output, "─────  ────────  ───────────────  ──────").unwrap();

    for segment in segments {
        let process = segment.process_name.as_deref().unwrap_or("(unknown)");
        let title = segment.window_title.as_deref().unwrap_or("");
        writeln!(
            output,
            "{:>5}  {:>8}  {:<15}  {}",
            segment.alignment_score.value(),
            format_elapsed(segment.duration_seconds),
            truncate(process, MAX_PROCESS_CHARS),
            truncate(title, MAX_TITLE_CHARS)
        )
        .unwrap();
    }

    output
}

pub fn run<W: Write>(writer: &mut W, db: &Database, task: &str, json: bool) -> Result<()> {
    let task = db.resolve_task(task)?;
    let mut segments = db.segments_for_task(&task.id)?;
    segments.sort_by(|a, b| {
        b.duration_seconds
            .cmp(&a.duration_seconds)
            .then_with(|| b.alignment_score.cmp(&a.alignment_score))
    });

    if json {
        let output = JsonSegments { task, segments };
        writeln!(writer, "{}", serde_json::to_string_pretty(&output)?)?;
    } else {
        write!(writer, "{}", format_segments(&task, &segments))?;
    }
    Ok(())
}
