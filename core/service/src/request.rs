// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use micro_broker::Headers;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::MethodError;

/// The method being executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerInfo {
    pub microservice: String,
    pub instance: String,
    pub method: String,
}

impl HandlerInfo {
    pub fn new(microservice: &str, instance: &str, method: &str) -> Self {
        HandlerInfo {
            microservice: microservice.to_string(),
            instance: instance.to_string(),
            method: method.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub data: Value,
    pub subject: String,
    pub headers: Headers,
    pub handler: HandlerInfo,
}

impl Request {
    /// Deserialize the payload into `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, MethodError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}
