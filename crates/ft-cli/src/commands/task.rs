//! Task management commands (`ft task ...`).

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result};
use ft_core::{Task, TaskStatus};
use ft_db::Database;

use super::util::{format_elapsed, format_focus, short_id};

pub fn add<W: Write>(
    writer: &mut W,
    db: &mut Database,
    description: &str,
    context: Option<&str>,
) -> Result<()> {
    let task = db
        .add_task(description, context)
        .context("failed to add task")?;
    writeln!(writer, "Added task {}: {}", short_id(&task.id), task.description)?;
    Ok(())
}

pub fn list<W: Write>(writer: &mut W, db: &Database, json: bool) -> Result<()> {
    let tasks = db.list_tasks(None)?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&tasks)?)?;
    } else {
        write!(writer, "{}", format_task_list(&tasks))?;
    }
    Ok(())
}

/// Makes the task the single in-progress task.
pub fn start<W: Write>(writer: &mut W, db: &mut Database, task: &str) -> Result<()> {
    let task = db.resolve_task(task)?;
    db.set_task_status(&task.id, TaskStatus::InProgress)?;
    writeln!(writer, "Started task {}: {}", short_id(&task.id), task.description)?;
    writeln!(writer, "Run 'ft track' to begin tracking.")?;
    Ok(())
}

pub fn done<W: Write>(writer: &mut W, db: &mut Database, task: &str) -> Result<()> {
    let task = db.resolve_task(task)?;
    db.set_task_status(&task.id, TaskStatus::Done)?;
    writeln!(
        writer,
        "Completed task {}: {} ({}, focus {})",
        short_id(&task.id),
        task.description,
        format_elapsed(task.total_elapsed_seconds),
        format_focus(task.focus_score_percent)
    )?;
    Ok(())
}

pub fn delete<W: Write>(writer: &mut W, db: &mut Database, task: &str) -> Result<()> {
    let task = db.resolve_task(task)?;
    db.delete_task(&task.id)?;
    writeln!(writer, "Deleted task {}: {}", short_id(&task.id), task.description)?;
    Ok(())
}

/// Formats tasks as a table for human-readable output.
pub fn format_task_list(tasks: &[Task]) -> String {
    let mut output = String::new();

    if tasks.is_empty() {
        writeln!(output, "No tasks. Add one with 'ft task add <description>'.").unwrap();
        return output;
    }

    writeln!(
        output,
        "{:<8}  {:<11}  {:>7}  {:>5}  Description",
        "ID", "Status", "Elapsed", "Focus"
    )
    .unwrap();
    writeln!(output, "────────  ───────────  ───────  ─────  ───────────").unwrap();

    for task in tasks {
        writeln!(
            output,
            "{:<8}  {:<11}  {:>7}  {:>5}  {}",
            short_id(&task.id),
            task.status.as_str(),
            format_elapsed(task.total_elapsed_seconds),
            format_focus(task.focus_score_percent),
            task.description
        )
        .unwrap();
    }

    output
}
