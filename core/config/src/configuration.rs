// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("missing value: {0}")]
    MissingValue(String),
    #[error("invalid {kind} \"{value}\": {reason}")]
    InvalidToken {
        kind: String,
        value: String,
        reason: String,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub trait Configuration {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Validate the configuration
    fn validate(&self) -> Result<(), Self::Error>;
}

/// Check that `value` can be used as a single subject token.
///
/// Service names, instance ids and method names are all embedded into
/// dot-delimited subjects, so they must be non-empty and may not contain
/// separators, whitespace or wildcard characters.
pub fn validate_token(kind: &str, value: &str) -> Result<(), ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidToken {
        kind: kind.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if value.is_empty() {
        return Err(ConfigurationError::MissingValue(kind.to_string()));
    }

    if value.contains('.') {
        return Err(invalid("must not contain '.'"));
    }

    if value.chars().any(char::is_whitespace) {
        return Err(invalid("must not contain whitespace"));
    }

    if value == "*" || value == ">" {
        return Err(invalid("wildcards are not allowed"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_token() {
        assert!(validate_token("name", "hello").is_ok());
        assert!(validate_token("name", "hello-world_2").is_ok());

        assert_eq!(
            validate_token("name", ""),
            Err(ConfigurationError::MissingValue("name".to_string()))
        );
        assert!(matches!(
            validate_token("method", "a.b"),
            Err(ConfigurationError::InvalidToken { .. })
        ));
        assert!(validate_token("method", "a b").is_err());
        assert!(validate_token("method", "*").is_err());
        assert!(validate_token("method", ">").is_err());
    }

    #[test]
    fn test_error_display() {
        let err = validate_token("service name", "a.b").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid service name \"a.b\": must not contain '.'"
        );
    }
}
