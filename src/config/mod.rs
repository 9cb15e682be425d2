//! Configuration file loading and parsing.
//!
//! # Configuration File Locations
//!
//! 1. Path given as the first CLI argument (must exist)
//! 2. Default location, used only if present:
//!    - **Linux/macOS:** `~/.csv-analyzer-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.csv-analyzer-mcp\config.json`
//!
//! Without a configuration file every setting takes its default, and the CSV
//! directory is `~/Documents/csv_files`.
//!
//! # Example Configuration
//!
//! See `config/example-config.json`.

mod settings;

pub use settings::{Config, LoggingConfig};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.csv-analyzer-mcp/`
/// - **Windows:** `%USERPROFILE%\.csv-analyzer-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".csv-analyzer-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Returns the CSV directory used when none is configured.
#[must_use]
pub fn default_csv_directory() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join("Documents").join("csv_files"))
}

/// Loads and parses the configuration file.
///
/// An explicit `path` must exist. With `None`, the default location is read
/// if a file is there and defaults are used otherwise.
///
/// # Errors
///
/// Returns an error if:
/// - An explicit configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed or has unknown fields
/// - A value fails validation
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(Config::default()),
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_path_exists() {
        let path = default_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("config.json"));
    }

    #[test]
    fn default_csv_directory_is_under_documents() {
        let dir = default_csv_directory().unwrap();
        assert!(dir.ends_with("Documents/csv_files"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = load_config(Some(&dir.path().join("absent.json")));
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn loads_explicit_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"csv_directory": "/srv/csv", "logging": {"level": "debug"}}"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.csv_directory().unwrap(), PathBuf::from("/srv/csv"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"logging": {"level": "loud"}}"#).unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::ValidationError { .. })
        ));
    }
}
