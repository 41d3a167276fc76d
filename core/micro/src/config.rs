// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0
//
// ConfigLoader reads a YAML document once and exposes lazy, cached accessors
// for the tracing and runtime sections. An invalid section falls back to its
// defaults with a warning.

use lazy_static::lazy_static;
use std::collections::HashSet;

use serde_yaml::Value;
use thiserror::Error;
use tracing::{debug, warn};

use micro_config::{Configuration, RuntimeConfiguration};
use micro_tracing::TracingConfiguration;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid configuration - impossible to parse yaml")]
    InvalidYaml,
    #[error("invalid configuration - key {0} not valid")]
    InvalidKey(String),
    #[error("yaml parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

lazy_static! {
    static ref CONFIG_KEYS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("tracing");
        s.insert("runtime");
        s
    };
}

pub struct ConfigLoader {
    root: Value,
    tracing: Option<TracingConfiguration>,
    runtime: Option<RuntimeConfiguration>,
}

impl std::fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let root_keys = self
            .root
            .as_mapping()
            .map(|m| {
                m.keys()
                    .filter_map(|k| k.as_str())
                    .map(|s| s.to_string())
                    .collect::<Vec<String>>()
            })
            .unwrap_or_default();

        f.debug_struct("ConfigLoader")
            .field("root_keys", &root_keys)
            .field("tracing_loaded", &self.tracing.is_some())
            .field("runtime_loaded", &self.runtime.is_some())
            .finish()
    }
}

impl ConfigLoader {
    pub fn new(file_path: &str) -> Result<Self, ConfigError> {
        let config_str =
            std::fs::read_to_string(file_path).map_err(|e| ConfigError::NotFound(e.to_string()))?;
        ConfigLoader::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let root: Value = serde_yaml::from_str(config_str).map_err(|_| ConfigError::InvalidYaml)?;

        // an empty document means "all defaults"
        let root = match root {
            Value::Null => Value::Mapping(Default::default()),
            other => other,
        };

        let mapping = root.as_mapping().ok_or(ConfigError::InvalidYaml)?;
        for key in mapping.keys() {
            let k = key.as_str().ok_or(ConfigError::InvalidYaml)?;
            if !CONFIG_KEYS.contains(k) {
                return Err(ConfigError::InvalidKey(k.to_string()));
            }
        }

        Ok(Self {
            root,
            tracing: None,
            runtime: None,
        })
    }

    pub fn tracing(&mut self) -> &TracingConfiguration {
        let root = &self.root;
        self.tracing.get_or_insert_with(|| {
            let cfg = root
                .get("tracing")
                .cloned()
                .map(|v| {
                    serde_yaml::from_value(v).unwrap_or_else(|e| {
                        warn!(error = ?e, "invalid tracing config, falling back to default");
                        TracingConfiguration::default()
                    })
                })
                .unwrap_or_default();
            debug!(?cfg, "Tracing configuration loaded");
            cfg
        })
    }

    pub fn runtime(&mut self) -> &RuntimeConfiguration {
        let root = &self.root;
        self.runtime.get_or_insert_with(|| {
            let cfg = root
                .get("runtime")
                .cloned()
                .map(|v| {
                    serde_yaml::from_value::<RuntimeConfiguration>(v)
                        .map_err(|e| e.to_string())
                        .and_then(|cfg| cfg.validate().map(|_| cfg).map_err(|e| e.to_string()))
                        .unwrap_or_else(|e| {
                            warn!(error = %e, "invalid runtime config, falling back to default");
                            RuntimeConfiguration::default()
                        })
                })
                .unwrap_or_default();
            debug!(?cfg, "Runtime configuration loaded");
            cfg
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tracing_test::traced_test;

    #[test]
    fn test_defaults_for_missing_sections() {
        let mut loader = ConfigLoader::from_yaml("").unwrap();
        assert_eq!(*loader.tracing(), TracingConfiguration::default());
        assert_eq!(*loader.runtime(), RuntimeConfiguration::default());
    }

    #[test]
    fn test_unknown_key() {
        let err = ConfigLoader::from_yaml("services: {}\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKey(k) if k == "services"));
    }

    #[test]
    fn test_not_a_mapping() {
        assert!(matches!(
            ConfigLoader::from_yaml("- a\n- b\n"),
            Err(ConfigError::InvalidYaml)
        ));
        assert!(matches!(
            ConfigLoader::from_yaml("tracing: [unclosed"),
            Err(ConfigError::InvalidYaml)
        ));
    }

    #[test]
    #[traced_test]
    fn test_invalid_runtime_falls_back() {
        let mut loader = ConfigLoader::from_yaml("runtime:\n  request_timeout: 0s\n").unwrap();
        assert_eq!(*loader.runtime(), RuntimeConfiguration::default());
        assert!(logs_contain("invalid runtime config"));
    }

    #[test]
    fn test_sections_are_cached() {
        let mut loader = ConfigLoader::from_yaml("runtime:\n  request_timeout: 2s\n").unwrap();
        assert_eq!(loader.runtime().request_timeout(), Duration::from_secs(2));
        let first = loader.runtime() as *const RuntimeConfiguration;
        let second = loader.runtime() as *const RuntimeConfiguration;
        assert_eq!(first, second);
    }
}
