//! Shared formatting helpers for CLI commands.

use ft_core::TaskId;

/// Length of the task ID prefix shown in tables.
pub const SHORT_ID_LEN: usize = 8;

/// Formats whole seconds as `1h 02m`, `3m 05s` or `42s`.
pub fn format_elapsed(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs:02}s")
    } else {
        format!("{secs}s")
    }
}

/// First characters of a task ID, enough to address it from the CLI.
pub fn short_id(id: &TaskId) -> String {
    id.as_str().chars().take(SHORT_ID_LEN).collect()
}

/// Truncates by characters, not bytes, appending `...` when shortened.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    } else {
        text.to_string()
    }
}

/// Focus percentage for display; `-` when nothing has been scored.
pub fn format_focus(percent: Option<u8>) -> String {
    percent.map_or_else(|| "-".to_string(), |p| format!("{p}%"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "0s");
        assert_eq!(format_elapsed(42), "42s");
        assert_eq!(format_elapsed(185), "3m 05s");
        assert_eq!(format_elapsed(3723), "1h 02m");
        assert_eq!(format_elapsed(-5), "0s");
    }

    #[test]
    fn test_short_id() {
        let id = TaskId::new("0123456789abcdef").unwrap();
        assert_eq!(short_id(&id), "01234567");
        assert_eq!(short_id(&TaskId::new("abc").unwrap()), "abc");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ünïcödé wïndöw tïtlé", 10), "ünïcödé...");
    }

    #[test]
    fn test_format_focus() {
        assert_eq!(format_focus(None), "-");
        assert_eq!(format_focus(Some(0)), "0%");
        assert_eq!(format_focus(Some(85)), "85%");
    }
}
