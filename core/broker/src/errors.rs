// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("malformed subject: {0}")]
    MalformedSubject(String),
    #[error("request to {subject} timed out after {timeout:?}")]
    Timeout { subject: String, timeout: Duration },
    #[error("no responders available for {0}")]
    NoResponders(String),
    #[error("{message}")]
    Remote {
        message: String,
        status: Option<String>,
    },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("broker closed")]
    Closed,
}

impl BrokerError {
    /// Timeouts and missing responders are reported to callers as the same
    /// class of failure.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BrokerError::Timeout { .. } | BrokerError::NoResponders(_)
        )
    }

    /// Status attached by the remote handler, if any.
    pub fn status(&self) -> Option<&str> {
        match self {
            BrokerError::Remote { status, .. } => status.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(e: serde_json::Error) -> Self {
        BrokerError::Codec(e.to_string())
    }
}
