//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Claude API key. Without one, windows are tracked but never scored.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model used for alignment classification.
    pub model: String,
    /// Seconds without input before tracking pauses.
    pub idle_threshold_secs: u64,
    /// Upper bound on a single classification call.
    pub classify_timeout_secs: u64,
    /// Age after which cached alignment verdicts are evicted.
    pub cache_max_age_days: u32,
    /// Processes whose windows show the tracker itself, typically the
    /// terminal emulator running `ft track`. Tracking pauses while one is
    /// in the foreground.
    pub self_process_names: Vec<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("idle_threshold_secs", &self.idle_threshold_secs)
            .field("classify_timeout_secs", &self.classify_timeout_secs)
            .field("cache_max_age_days", &self.cache_max_age_days)
            .field("self_process_names", &self.self_process_names)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("ft.db"),
            api_key: None,
            model: ft_llm::DEFAULT_MODEL.to_string(),
            idle_threshold_secs: 300,
            classify_timeout_secs: 30,
            cache_max_age_days: 30,
            self_process_names: vec!["ft".to_string()],
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // FT_API_KEY, FT_DATABASE_PATH, ...
        figment = figment.merge(Env::prefixed("FT_"));

        figment.extract()
    }

    pub const fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub const fn classify_timeout(&self) -> Duration {
        Duration::from_secs(self.classify_timeout_secs)
    }

    pub fn cache_max_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.cache_max_age_days))
    }
}

/// Returns the platform-specific config directory for ft.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ft"))
}

/// Returns the platform-specific data directory for ft.
///
/// On Linux: `~/.local/share/ft`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("ft"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_ft() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "ft");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("ft.db"));
        assert_eq!(config.idle_threshold(), Duration::from_secs(300));
        assert_eq!(config.classify_timeout(), Duration::from_secs(30));
        assert_eq!(config.cache_max_age(), chrono::Duration::days(30));
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "database_path = \"/tmp/focus.db\"\nidle_threshold_secs = 60\napi_key = \"sk-test\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/focus.db"));
        assert_eq!(config.idle_threshold_secs, 60);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, ft_llm::DEFAULT_MODEL);
    }

    #[test]
    fn test_self_process_names_from_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "self_process_names = [\"ft\", \"kitty\"]\n").unwrap();

        let config = Config::load_from(Some(&path)).unwrap();

        assert_eq!(config.self_process_names, ["ft", "kitty"]);
        assert_eq!(Config::default().self_process_names, ["ft"]);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = Config {
            api_key: Some("sk-secret".to_string()),
            ..Config::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
