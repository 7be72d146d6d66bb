use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gateway::RetryPolicy;
use crate::model::{
    DEFAULT_MAX_MESSAGES, DEFAULT_MAX_THREAD_MESSAGES, DEFAULT_PAGE_SIZE,
};
use crate::{AppError, Result};

const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub export: ExportSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExportSettings {
    pub page_size: u16,
    pub max_messages: usize,
    pub max_thread_messages: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for ExportSettings {
    fn default() -> Self {
        ExportSettings {
            page_size: DEFAULT_PAGE_SIZE,
            max_messages: DEFAULT_MAX_MESSAGES,
            max_thread_messages: DEFAULT_MAX_THREAD_MESSAGES,
            max_retries: 5,
            retry_base_delay_ms: 1000,
        }
    }
}

impl ExportSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            ..RetryPolicy::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Read `path`, or `settings.toml` in the current directory. A missing
    /// default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path, true),
            None => (Path::new(SETTINGS_FILE), false),
        };
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| AppError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AppError::TomlParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_file_constant() {
        assert_eq!(SETTINGS_FILE, "settings.toml");
    }

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();

        assert_eq!(settings.export.page_size, 200);
        assert_eq!(settings.export.max_messages, 1000);
        assert_eq!(settings.export.max_thread_messages, 500);
        assert_eq!(settings.export.max_retries, 5);
        assert_eq!(settings.logging.filter, "info");
    }

    #[test]
    fn test_settings_deserialization() {
        let toml_content = r#"
[export]
page-size = 50
max-messages = 300
max-thread-messages = 10
max-retries = 2
retry-base-delay-ms = 250

[logging]
filter = "slack_history=debug"
"#;

        let settings = Settings::parse(toml_content).unwrap();

        assert_eq!(settings.export.page_size, 50);
        assert_eq!(settings.export.max_messages, 300);
        assert_eq!(settings.export.max_thread_messages, 10);
        assert_eq!(settings.logging.filter, "slack_history=debug");

        let policy = settings.export.retry_policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_settings_deserialization_empty() {
        assert_eq!(Settings::parse("").unwrap(), Settings::default());
    }

    #[test]
    fn test_settings_deserialization_partial_export_only() {
        let settings = Settings::parse("[export]\nmax-messages = 20\n").unwrap();

        assert_eq!(settings.export.max_messages, 20);
        assert_eq!(settings.export.page_size, 200);
        assert_eq!(settings.logging, LoggingSettings::default());
    }

    #[test]
    fn test_settings_invalid_toml() {
        let err = Settings::parse("[export\npage-size = 1").unwrap_err();
        assert!(matches!(err, AppError::TomlParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[export]\npage-size = 999\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();

        assert_eq!(settings.export.page_size, 999);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let err = Settings::load(Some(&path)).unwrap_err();

        assert!(matches!(err, AppError::ReadFile { .. }));
    }
}
