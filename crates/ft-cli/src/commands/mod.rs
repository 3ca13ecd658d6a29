//! CLI subcommand implementations.

pub mod cache;
pub mod segments;
pub mod status;
pub mod task;
pub mod track;
mod util;
