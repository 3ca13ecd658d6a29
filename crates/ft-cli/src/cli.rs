//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Focus tracker.
///
/// Tracks time against one declared task and scores how well each foreground
/// window aligns with it.
#[derive(Debug, Parser)]
#[command(name = "ft", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage tasks.
    #[command(subcommand)]
    Task(TaskAction),

    /// Track the in-progress task until interrupted.
    Track,

    /// Show the in-progress task and its focus score.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show stored focus segments for a task, longest first.
    Segments {
        /// Task ID or unique prefix.
        task: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Maintain the alignment cache.
    #[command(subcommand)]
    Cache(CacheAction),
}

/// Task subcommands.
#[derive(Debug, Subcommand)]
pub enum TaskAction {
    /// Declare a new task.
    Add {
        /// What you intend to work on.
        description: String,

        /// Hint about relevant apps, sites, or keywords.
        #[arg(long)]
        context: Option<String>,
    },

    /// List tasks.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Make a task the one being tracked.
    Start {
        /// Task ID or unique prefix.
        task: String,
    },

    /// Mark a task as done.
    Done {
        /// Task ID or unique prefix.
        task: String,
    },

    /// Delete a task and its segments.
    Delete {
        /// Task ID or unique prefix.
        task: String,
    },
}

/// Cache subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Evict cached verdicts older than the given age.
    Prune {
        /// Maximum age in days (defaults to `cache_max_age_days`).
        #[arg(long)]
        older_than_days: Option<u32>,
    },
}
