// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use crate::errors::BrokerError;

pub const ERROR_MESSAGE_HEADER: &str = "X-Error-Message";
pub const ERROR_STATUS_HEADER: &str = "X-Error-Status";
pub const CONTEXT_HEADER_PREFIX: &str = "X-Context-";

/// Ordered multimap of message headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Headers(Vec::new())
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// Replace every value stored under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.0.retain(|(k, _)| *k != key);
        self.0.push((key, value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn remove(&mut self, key: &str) {
        self.0.retain(|(k, _)| k != key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Headers encoding a failure raised by a remote handler.
    pub fn for_error(message: &str, status: Option<&str>) -> Self {
        let mut headers = Headers::new();
        headers.append(ERROR_MESSAGE_HEADER, message);
        if let Some(status) = status {
            headers.append(ERROR_STATUS_HEADER, status);
        }
        headers
    }

    /// Decode a propagated error. The message header alone decides whether
    /// the reply is an error.
    pub fn error(&self) -> Option<BrokerError> {
        self.get(ERROR_MESSAGE_HEADER)
            .map(|message| BrokerError::Remote {
                message: message.to_string(),
                status: self.get(ERROR_STATUS_HEADER).map(str::to_string),
            })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Headers(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Headers {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.0
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

impl IntoIterator for Headers {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_multimap() {
        let mut headers = Headers::new();
        headers.append("a", "1");
        headers.append("b", "2");
        headers.append("a", "3");

        assert_eq!(headers.len(), 3);
        assert_eq!(headers.get("a"), Some("1"));
        assert_eq!(headers.get_all("a").collect::<Vec<_>>(), vec!["1", "3"]);
        assert_eq!(
            headers.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            vec!["a", "b", "a"]
        );

        headers.insert("a", "4");
        assert_eq!(headers.get_all("a").collect::<Vec<_>>(), vec!["4"]);

        headers.remove("b");
        assert!(!headers.contains_key("b"));
    }

    #[test]
    fn test_error_headers() {
        let headers = Headers::for_error("boom", None);
        assert_eq!(
            headers.error(),
            Some(BrokerError::Remote {
                message: "boom".to_string(),
                status: None
            })
        );
        assert!(!headers.contains_key(ERROR_STATUS_HEADER));

        let headers = Headers::for_error("not found", Some("404"));
        assert_eq!(headers.error().unwrap().status(), Some("404"));

        // status without message is not an error
        let headers: Headers = [(ERROR_STATUS_HEADER, "500")].into_iter().collect();
        assert!(headers.error().is_none());
    }
}
