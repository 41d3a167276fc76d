// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum TracingError {
    #[error("invalid filter directive: {0}")]
    InvalidFilter(String),
    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TracingConfiguration {
    #[serde(default = "default_log_level")]
    log_level: String,

    #[serde(default = "default_display_thread_names")]
    display_thread_names: bool,

    #[serde(default = "default_display_thread_ids")]
    display_thread_ids: bool,

    /// extra per-target directives, e.g. "micro_broker=debug"
    #[serde(default = "default_filter")]
    filter: String,
}

// default implementation for TracingConfiguration
impl Default for TracingConfiguration {
    fn default() -> Self {
        TracingConfiguration {
            log_level: default_log_level(),
            display_thread_names: default_display_thread_names(),
            display_thread_ids: default_display_thread_ids(),
            filter: default_filter(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_display_thread_names() -> bool {
    true
}

fn default_display_thread_ids() -> bool {
    false
}

fn default_filter() -> String {
    String::new()
}

// function to convert string tracing level to tracing::Level
fn resolve_level(level: &str) -> Level {
    let level = level.to_lowercase();
    match level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO, // default level
    }
}

impl TracingConfiguration {
    pub fn with_log_level(self, log_level: String) -> Self {
        TracingConfiguration { log_level, ..self }
    }

    pub fn with_display_thread_names(self, display_thread_names: bool) -> Self {
        TracingConfiguration {
            display_thread_names,
            ..self
        }
    }

    pub fn with_display_thread_ids(self, display_thread_ids: bool) -> Self {
        TracingConfiguration {
            display_thread_ids,
            ..self
        }
    }

    pub fn with_filter(self, filter: String) -> Self {
        TracingConfiguration { filter, ..self }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn display_thread_names(&self) -> bool {
        self.display_thread_names
    }

    pub fn display_thread_ids(&self) -> bool {
        self.display_thread_ids
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Directives handed to the env filter: the global level first, then the
    /// per-target overrides.
    pub fn directives(&self) -> String {
        let level = resolve_level(&self.log_level).to_string().to_lowercase();
        if self.filter.is_empty() {
            level
        } else {
            format!("{},{}", level, self.filter)
        }
    }

    /// Set up a subscriber that logs to stdout
    pub fn setup_tracing_subscriber(&self) -> Result<(), TracingError> {
        let filter = EnvFilter::try_new(self.directives())
            .map_err(|e| TracingError::InvalidFilter(e.to_string()))?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(self.display_thread_names)
            .with_thread_ids(self.display_thread_ids)
            .try_init()
            .map_err(|e| TracingError::AlreadyInitialized(e.to_string()))
    }
}

// tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tracing_configuration() {
        let config = TracingConfiguration::default();
        assert_eq!(config.log_level, default_log_level());
        assert_eq!(config.display_thread_names, default_display_thread_names());
        assert_eq!(config.display_thread_ids, default_display_thread_ids());
        assert_eq!(config.filter, default_filter());
    }

    #[test]
    fn test_resolve_level() {
        assert_eq!(resolve_level("trace"), Level::TRACE);
        assert_eq!(resolve_level("debug"), Level::DEBUG);
        assert_eq!(resolve_level("info"), Level::INFO);
        assert_eq!(resolve_level("WARN"), Level::WARN);
        assert_eq!(resolve_level("error"), Level::ERROR);
        assert_eq!(resolve_level("invalid"), Level::INFO);
    }

    #[test]
    fn test_directives() {
        let config = TracingConfiguration::default();
        assert_eq!(config.directives(), "info");

        let config = TracingConfiguration::default()
            .with_log_level("debug".to_string())
            .with_filter("micro_broker=trace".to_string());
        assert_eq!(config.directives(), "debug,micro_broker=trace");

        let config = TracingConfiguration::default().with_log_level("bogus".to_string());
        assert_eq!(config.directives(), "info");
    }

    #[test]
    fn test_deserialize() {
        let yaml = r#"
log_level: warn
display_thread_ids: true
"#;
        let config: TracingConfiguration = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.log_level(), "warn");
        assert!(config.display_thread_ids());
        assert!(config.display_thread_names());
        assert_eq!(config.filter(), "");
    }

    #[test]
    fn test_invalid_filter() {
        let config = TracingConfiguration::default().with_filter("micro_broker=notalevel".to_string());
        assert!(matches!(
            config.setup_tracing_subscriber(),
            Err(TracingError::InvalidFilter(_))
        ));
    }
}
