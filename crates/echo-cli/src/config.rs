//! Configuration file handling for echo-cli

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Server used when neither the command line nor the config file names one
pub const DEFAULT_SERVER: &str = "http://localhost:8080";

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Default server URL
    pub server: Option<String>,
    /// Path prefix the service is mounted under
    pub path_prefix: Option<String>,
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("echo-cli");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        server: Option<&str>,
        path_prefix: Option<&str>,
        output: Option<&str>,
        no_color: bool,
    ) -> MergedConfig {
        MergedConfig {
            server: server
                .map(String::from)
                .or_else(|| self.server.clone())
                .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
            path_prefix: path_prefix
                .map(String::from)
                .or_else(|| self.path_prefix.clone()),
            output: output
                .map(String::from)
                .or_else(|| self.output.clone())
                .unwrap_or_else(|| "text".to_string()),
            no_color: no_color || self.no_color.unwrap_or(false),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone, PartialEq)]
pub struct MergedConfig {
    pub server: String,
    pub path_prefix: Option<String>,
    pub output: String,
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server = \"http://echo.local:9000\"").unwrap();
        writeln!(file, "path_prefix = \"/api\"").unwrap();
        writeln!(file, "no_color = true").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(
            config,
            Config {
                server: Some("http://echo.local:9000".into()),
                path_prefix: Some("/api".into()),
                output: None,
                no_color: Some(true),
            }
        );
    }

    #[test]
    fn test_load_from_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server = [").unwrap();
        assert!(Config::load_from(file.path()).is_err());
        assert!(Config::load_from(Path::new("/nonexistent/echo-cli.toml")).is_err());
    }

    #[test]
    fn test_args_override_file() {
        let config = Config {
            server: Some("http://from-file:1".into()),
            path_prefix: Some("/api".into()),
            output: Some("json".into()),
            no_color: None,
        };

        let merged = config.merge_with_args(Some("http://from-args:2"), None, None, false);
        assert_eq!(merged.server, "http://from-args:2");
        assert_eq!(merged.path_prefix.as_deref(), Some("/api"));
        assert_eq!(merged.output, "json");
        assert!(!merged.no_color);
    }

    #[test]
    fn test_defaults() {
        let merged = Config::default().merge_with_args(None, None, None, false);
        assert_eq!(merged.server, DEFAULT_SERVER);
        assert_eq!(merged.path_prefix, None);
        assert_eq!(merged.output, "text");
    }
}
