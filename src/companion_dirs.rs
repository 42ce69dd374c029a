//! Centralized application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/companion/` | `~/.local/share/companion/` |
//! | Config | `~/Library/Application Support/companion/` | `~/.config/companion/` |
//!
//! # Environment Overrides
//!
//! - `COMPANION_DATA_DIR`: overrides [`data_dir`]
//! - `COMPANION_CONFIG_DIR`: overrides [`config_dir`]

use std::path::PathBuf;

/// Default packaged model file name.
pub const DEFAULT_MODEL_FILENAME: &str = "google_gemma-3-1b-it-Q5_K_M.gguf";

/// Application data root directory.
///
/// Holds the message database, exports, logs, and packaged models.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("COMPANION_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("companion"))
        .unwrap_or_else(|| std::env::temp_dir().join("companion-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("COMPANION_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("companion"))
        .unwrap_or_else(|| std::env::temp_dir().join("companion-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Packaged model directory (`data_dir()/models/`).
#[must_use]
pub fn models_dir() -> PathBuf {
    data_dir().join("models")
}

/// Default model file path.
#[must_use]
pub fn default_model_path() -> PathBuf {
    models_dir().join(DEFAULT_MODEL_FILENAME)
}

/// SQLite message database (`data_dir()/companion.db`).
#[must_use]
pub fn database_file() -> PathBuf {
    data_dir().join("companion.db")
}

/// Default conversation export target (`data_dir()/chat_export.json`).
#[must_use]
pub fn export_file() -> PathBuf {
    data_dir().join("chat_export.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_live_under_their_roots() {
        assert!(logs_dir().starts_with(data_dir()));
        assert!(database_file().starts_with(data_dir()));
        assert!(config_file().starts_with(config_dir()));
        assert!(default_model_path().ends_with(DEFAULT_MODEL_FILENAME));
    }

    #[test]
    fn file_names_are_stable() {
        assert_eq!(
            database_file().file_name().and_then(|n| n.to_str()),
            Some("companion.db")
        );
        assert_eq!(
            export_file().file_name().and_then(|n| n.to_str()),
            Some("chat_export.json")
        );
    }
}
