//! Alignment cache maintenance (`ft cache prune`).

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use ft_core::AlignmentCacheStore;
use ft_db::Database;

/// Deletes cached verdicts created more than `older_than_days` days before now.
pub fn prune<W: Write>(writer: &mut W, db: &mut Database, older_than_days: u32) -> Result<()> {
    prune_at(writer, db, older_than_days, Utc::now())
}

fn prune_at<W: Write>(
    writer: &mut W,
    db: &mut Database,
    older_than_days: u32,
    now: DateTime<Utc>,
) -> Result<()> {
    let cutoff = now - Duration::days(i64::from(older_than_days));
    let removed = db
        .delete_older_than(cutoff)
        .context("failed to prune alignment cache")?;
    let remaining = db.cache_entry_count()?;
    tracing::info!(removed, remaining, %cutoff, "pruned alignment cache");
    writeln!(
        writer,
        "Removed {removed} cached verdict(s) older than {older_than_days} day(s); {remaining} remaining."
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use ft_core::{AlignmentCacheEntry, AlignmentScore, WindowContext, task_content_hash};

    fn save_entry(db: &mut Database, title: &str, created_at: DateTime<Utc>) {
        let window = WindowContext::new("firefox", title);
        let entry = AlignmentCacheEntry {
            context_hash: window.context_hash.clone(),
            task_content_hash: task_content_hash("Write report", None),
            score: AlignmentScore::new(4).unwrap(),
            reason: "somewhat related".to_string(),
            created_at,
        };
        db.save(&window, &entry).unwrap();
    }

    #[test]
    fn prune_removes_only_old_entries() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut db = Database::open_in_memory().unwrap();
        save_entry(&mut db, "old", now - Duration::days(45));
        save_entry(&mut db, "boundary", now - Duration::days(30));
        save_entry(&mut db, "fresh", now - Duration::days(1));

        let mut output = Vec::new();
        prune_at(&mut output, &mut db, 30, now).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Removed 1 cached verdict(s) older than 30 day(s); 2 remaining.\n"
        );
        assert_eq!(db.cache_entry_count().unwrap(), 2);
    }
}
