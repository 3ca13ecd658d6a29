//! Track command: run the focus tracker for the in-progress task until Ctrl-C.

use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use ft_core::AlignmentResult;
use ft_db::Database;
use ft_llm::AlignmentClassifier;
use ft_monitor::{Tracker, TrackerConfig, TrackerSnapshot, XdotoolWindowSource, XprintidleSource};

use super::util::{format_elapsed, format_focus, short_id};
use crate::Config;

pub fn run<W: Write>(writer: &mut W, db: Database, config: &Config) -> Result<()> {
    let Some(task) = db.in_progress_task()? else {
        bail!("no task in progress; start one with 'ft task start <id>'");
    };

    let classifier = AlignmentClassifier::from_api_key(config.api_key.as_deref(), &config.model)
        .context("failed to create LLM client")?;
    if !classifier.is_configured() {
        tracing::warn!("no API key configured (set FT_API_KEY); windows will not be scored");
    }

    let tracker_config = TrackerConfig {
        self_process_names: config.self_process_names.clone(),
        classify_timeout: config.classify_timeout(),
        idle_threshold: config.idle_threshold(),
        cache_max_age: Some(config.cache_max_age()),
        ..TrackerConfig::default()
    };

    writeln!(writer, "Tracking {}: {}", short_id(&task.id), task.description)?;
    writeln!(writer, "Press Ctrl-C to stop.")?;
    writer.flush()?;

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let snapshot = runtime.block_on(async {
        let tracker = Tracker::new(
            Arc::new(Mutex::new(db)),
            classifier,
            Arc::new(XdotoolWindowSource),
            Arc::new(XprintidleSource),
            tracker_config,
        )?;
        let handle = tracker.handle();
        let mut updates = handle.subscribe();
        let running = tokio::spawn(tracker.run());

        let mut last_verdict: Option<AlignmentResult> = None;
        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.context("failed to listen for Ctrl-C")?;
                    break;
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    if snapshot.last_verdict != last_verdict {
                        if let Some(line) = format_verdict(&snapshot) {
                            writeln!(writer, "{line}")?;
                            writer.flush()?;
                        }
                        last_verdict = snapshot.last_verdict;
                    }
                }
            }
        }

        handle.shutdown();
        let snapshot = running.await.context("tracker task failed")??;
        anyhow::Ok(snapshot)
    })?;

    writeln!(writer, "{}", format_summary(&snapshot))?;
    Ok(())
}

/// One line per new verdict: score, current focus and the classifier's reason.
fn format_verdict(snapshot: &TrackerSnapshot) -> Option<String> {
    let verdict = snapshot.last_verdict.as_ref()?;
    let process = snapshot
        .window
        .as_ref()
        .map_or("(unknown)", |window| window.process_name.as_str());
    Some(format!(
        "[{:>2}/10] {process}: {} (focus {}%)",
        verdict.score.value(),
        verdict.reason,
        snapshot.focus_score_percent
    ))
}

fn format_summary(snapshot: &TrackerSnapshot) -> String {
    let focus = snapshot
        .has_real_score
        .then_some(snapshot.focus_score_percent);
    format!(
        "Stopped. Elapsed {}, focus {}.",
        format_elapsed(snapshot.elapsed_seconds),
        format_focus(focus)
    )
}
