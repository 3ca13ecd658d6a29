//! Focus tracker CLI library.
//!
//! This crate provides the CLI interface for the focus tracker.

mod cli;
pub mod commands;
mod config;

pub use cli::{CacheAction, Cli, Commands, TaskAction};
pub use config::Config;
