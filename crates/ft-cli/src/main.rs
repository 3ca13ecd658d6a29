use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ft_cli::commands::{cache, segments, status, task, track};
use ft_cli::{CacheAction, Cli, Commands, Config, TaskAction};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(ft_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = ft_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so command output stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Some(Commands::Task(action)) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            match action {
                TaskAction::Add {
                    description,
                    context,
                } => task::add(&mut out, &mut db, description, context.as_deref())?,
                TaskAction::List { json } => task::list(&mut out, &db, *json)?,
                TaskAction::Start { task: id } => task::start(&mut out, &mut db, id)?,
                TaskAction::Done { task: id } => task::done(&mut out, &mut db, id)?,
                TaskAction::Delete { task: id } => task::delete(&mut out, &mut db, id)?,
            }
        }
        Some(Commands::Track) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            track::run(&mut out, db, &config)?;
        }
        Some(Commands::Status { json }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            status::run(&mut out, &db, *json)?;
        }
        Some(Commands::Segments { task: id, json }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            segments::run(&mut out, &db, id, *json)?;
        }
        Some(Commands::Cache(CacheAction::Prune { older_than_days })) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            let days = older_than_days.unwrap_or(config.cache_max_age_days);
            cache::prune(&mut out, &mut db, days)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    out.flush()?;
    Ok(())
}
