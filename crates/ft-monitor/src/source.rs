//! OS queries for the foreground window and input recency.
//!
//! The X11 adapters shell out to `xdotool` and `xprintidle`. Both return
//! `io::Error` on failure; the pollers decide how to absorb it.

use std::io;
use std::process::Command;

/// Identity of the foreground window at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowSample {
    pub process_name: String,
    pub window_title: String,
}

/// Reports the current foreground window.
pub trait ForegroundWindowSource: Send + Sync {
    fn current_foreground_window(&self) -> io::Result<WindowSample>;
}

/// Reports how long ago the user last provided input.
pub trait InputIdleSource: Send + Sync {
    fn millis_since_last_input(&self) -> io::Result<u64>;
}

/// Foreground window lookup via `xdotool` and `/proc/<pid>/comm`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XdotoolWindowSource;

impl ForegroundWindowSource for XdotoolWindowSource {
    fn current_foreground_window(&self) -> io::Result<WindowSample> {
        let window_title = run_command("xdotool", &["getactivewindow", "getwindowname"])?;
        let pid = run_command("xdotool", &["getactivewindow", "getwindowpid"])?;
        let pid: u32 = pid
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("bad pid: {pid}")))?;
        let process_name = std::fs::read_to_string(format!("/proc/{pid}/comm"))?
            .trim()
            .to_string();
        Ok(WindowSample {
            process_name,
            window_title,
        })
    }
}

/// Input idle time via `xprintidle` (milliseconds on stdout).
#[derive(Debug, Clone, Copy, Default)]
pub struct XprintidleSource;

impl InputIdleSource for XprintidleSource {
    fn millis_since_last_input(&self) -> io::Result<u64> {
        let output = run_command("xprintidle", &[])?;
        output.parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected xprintidle output: {output}"),
            )
        })
    }
}

fn run_command(program: &str, args: &[&str]) -> io::Result<String> {
    let output = Command::new(program).args(args).output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(io::Error::other(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_an_io_error() {
        let err = run_command("ft-definitely-not-installed", &[]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn failing_program_reports_status() {
        let err = run_command("sh", &["-c", "echo nope >&2; exit 3"]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("sh exited with"));
        assert!(message.contains("nope"));
    }

    #[test]
    fn stdout_is_trimmed() {
        assert_eq!(run_command("sh", &["-c", "echo '  42  '"]).unwrap(), "42");
    }
}
