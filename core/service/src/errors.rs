// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use micro_broker::BrokerError;
use micro_config::ConfigurationError;
use thiserror::Error;

/// Failure raised by a handler or middleware. The message travels verbatim to
/// the caller, the status (if any) in the `X-Error-Status` header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct MethodError {
    message: String,
    status: Option<String>,
}

impl MethodError {
    pub fn new(message: impl Into<String>) -> Self {
        MethodError {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(status: impl Into<String>, message: impl Into<String>) -> Self {
        MethodError {
            message: message.into(),
            status: Some(status.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

impl From<&str> for MethodError {
    fn from(message: &str) -> Self {
        MethodError::new(message)
    }
}

impl From<String> for MethodError {
    fn from(message: String) -> Self {
        MethodError::new(message)
    }
}

impl From<serde_json::Error> for MethodError {
    fn from(e: serde_json::Error) -> Self {
        MethodError::new(e.to_string())
    }
}

impl From<BrokerError> for MethodError {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::Remote { message, status } => MethodError { message, status },
            other => MethodError::new(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("invalid state: {0}")]
    InvalidState(String),
}
