// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::time;

use duration_str::deserialize_duration;
use serde::{Deserialize, Serialize};

use crate::configuration::{Configuration, ConfigurationError};

/// Runtime settings shared by brokers, microservices and monitors.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RuntimeConfiguration {
    /// default timeout for single-reply requests
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration"
    )]
    request_timeout: time::Duration,

    /// how long a discovery round collects answers
    #[serde(
        default = "default_discovery_timeout",
        deserialize_with = "deserialize_duration"
    )]
    discovery_timeout: time::Duration,

    /// queue group used for load-balanced method subscriptions
    #[serde(default = "default_queue_group")]
    queue_group: String,

    /// inject the remote stop method into every microservice
    #[serde(default = "default_stop_method")]
    stop_method: bool,
}

impl Default for RuntimeConfiguration {
    fn default() -> Self {
        RuntimeConfiguration {
            request_timeout: default_request_timeout(),
            discovery_timeout: default_discovery_timeout(),
            queue_group: default_queue_group(),
            stop_method: default_stop_method(),
        }
    }
}

fn default_request_timeout() -> time::Duration {
    time::Duration::from_secs(30)
}

fn default_discovery_timeout() -> time::Duration {
    time::Duration::from_secs(5)
}

fn default_queue_group() -> String {
    "q".to_string()
}

fn default_stop_method() -> bool {
    true
}

impl RuntimeConfiguration {
    pub fn new() -> Self {
        RuntimeConfiguration::default()
    }

    pub fn with_request_timeout(self, request_timeout: time::Duration) -> Self {
        RuntimeConfiguration {
            request_timeout,
            ..self
        }
    }

    pub fn with_discovery_timeout(self, discovery_timeout: time::Duration) -> Self {
        RuntimeConfiguration {
            discovery_timeout,
            ..self
        }
    }

    pub fn with_queue_group(self, queue_group: &str) -> Self {
        RuntimeConfiguration {
            queue_group: queue_group.to_string(),
            ..self
        }
    }

    pub fn with_stop_method(self, stop_method: bool) -> Self {
        RuntimeConfiguration {
            stop_method,
            ..self
        }
    }

    pub fn request_timeout(&self) -> time::Duration {
        self.request_timeout
    }

    pub fn discovery_timeout(&self) -> time::Duration {
        self.discovery_timeout
    }

    pub fn queue_group(&self) -> &str {
        &self.queue_group
    }

    pub fn stop_method(&self) -> bool {
        self.stop_method
    }
}

impl Configuration for RuntimeConfiguration {
    type Error = ConfigurationError;

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigurationError::Invalid(
                "request_timeout must be greater than zero".to_string(),
            ));
        }

        if self.discovery_timeout.is_zero() {
            return Err(ConfigurationError::Invalid(
                "discovery_timeout must be greater than zero".to_string(),
            ));
        }

        crate::configuration::validate_token("queue group", &self.queue_group)
    }
}
