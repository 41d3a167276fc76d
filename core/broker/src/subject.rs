// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Display;

use crate::errors::BrokerError;

/// Address of a microservice method: `service.method` or
/// `service.instance.method`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSubject {
    pub microservice: String,
    pub instance: Option<String>,
    pub method: String,
}

impl MethodSubject {
    pub fn new(microservice: &str, method: &str) -> Self {
        MethodSubject {
            microservice: microservice.to_string(),
            instance: None,
            method: method.to_string(),
        }
    }

    pub fn with_instance(self, instance: &str) -> Self {
        MethodSubject {
            instance: Some(instance.to_string()),
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    Raw(String),
    Method(MethodSubject),
}

impl Subject {
    pub fn method(microservice: &str, method: &str) -> Self {
        Subject::Method(MethodSubject::new(microservice, method))
    }

    pub fn local(microservice: &str, instance: &str, method: &str) -> Self {
        Subject::Method(MethodSubject::new(microservice, method).with_instance(instance))
    }

    /// Dot-delimited topic for this subject.
    pub fn to_topic(&self) -> Result<String, BrokerError> {
        match self {
            Subject::Raw(topic) => {
                if topic.is_empty() {
                    return Err(BrokerError::MalformedSubject(
                        "empty subject".to_string(),
                    ));
                }
                Ok(topic.clone())
            }
            Subject::Method(m) => {
                if m.microservice.is_empty() || m.method.is_empty() {
                    return Err(BrokerError::MalformedSubject(format!("{:?}", m)));
                }
                match &m.instance {
                    Some(instance) if !instance.is_empty() => {
                        Ok(format!("{}.{}.{}", m.microservice, instance, m.method))
                    }
                    _ => Ok(format!("{}.{}", m.microservice, m.method)),
                }
            }
        }
    }
}

impl Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_topic() {
            Ok(topic) => write!(f, "{}", topic),
            Err(_) => write!(f, "<malformed>"),
        }
    }
}

impl From<&str> for Subject {
    fn from(topic: &str) -> Self {
        Subject::Raw(topic.to_string())
    }
}

impl From<String> for Subject {
    fn from(topic: String) -> Self {
        Subject::Raw(topic)
    }
}

impl From<&String> for Subject {
    fn from(topic: &String) -> Self {
        Subject::Raw(topic.clone())
    }
}

impl From<MethodSubject> for Subject {
    fn from(m: MethodSubject) -> Self {
        Subject::Method(m)
    }
}

/// Token-wise subject matching: `*` matches exactly one token, a final `>`
/// matches one or more trailing tokens.
pub fn matches(pattern: &str, topic: &str) -> bool {
    if pattern == topic {
        return true;
    }

    let mut pattern_tokens = pattern.split('.');
    let mut topic_tokens = topic.split('.');

    loop {
        match (pattern_tokens.next(), topic_tokens.next()) {
            (Some(">"), Some(_)) => return pattern_tokens.next().is_none(),
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(t)) if p == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
