// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Wire shapes of the discovery protocol.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stats::MethodStats;

pub const PING_RESPONSE_TYPE: &str = "io.nats.micro.v1.ping_response";
pub const INFO_RESPONSE_TYPE: &str = "io.nats.micro.v1.info_response";
pub const SCHEMA_RESPONSE_TYPE: &str = "io.nats.micro.v1.schema_response";
pub const STATS_RESPONSE_TYPE: &str = "io.nats.micro.v1.stats_response";

pub const SRV_PING: &str = "$SRV.PING";
pub const SRV_INFO: &str = "$SRV.INFO";
pub const SRV_SCHEMA: &str = "$SRV.SCHEMA";
pub const SRV_STATS: &str = "$SRV.STATS";
pub const SRV_REGISTER: &str = "$SRV.REGISTER";

pub const METADATA_LIBRARY: &str = "_nats.client.created.library";
pub const METADATA_LIBRARY_VERSION: &str = "_nats.client.created.version";
pub const METADATA_CLIENT_ID: &str = "_nats.client.id";
pub const METADATA_LOCAL: &str = "nats.micro.ext.v1.method.local";
pub const METADATA_UNBALANCED: &str = "nats.micro.ext.v1.method.unbalanced";
pub const METADATA_FEATURE: &str = "nats.micro.ext.v1.feature";
pub const METADATA_FEATURE_PARAMS: &str = "nats.micro.ext.v1.feature.params";

/// Fields shared by every discovery answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    #[serde(flatten)]
    pub identity: ServiceIdentity,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub name: String,
    pub subject: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResponse {
    #[serde(flatten)]
    pub identity: ServiceIdentity,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaPair {
    pub request: Value,
    pub response: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSchema {
    pub name: String,
    pub subject: String,
    pub schema: SchemaPair,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaResponse {
    #[serde(flatten)]
    pub identity: ServiceIdentity,
    #[serde(rename = "type")]
    pub kind: String,
    pub endpoints: Vec<EndpointSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointStats {
    pub name: String,
    pub subject: String,
    #[serde(flatten)]
    pub stats: MethodStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub identity: ServiceIdentity,
    #[serde(rename = "type")]
    pub kind: String,
    /// ISO-8601 start time
    pub started: String,
    pub endpoints: Vec<EndpointStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationState {
    Up,
    Down,
}

/// Published on `$SRV.REGISTER` when an instance starts, restarts or stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub info: InfoResponse,
    pub state: RegistrationState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ping_wire_shape() {
        let ping = PingResponse {
            identity: ServiceIdentity {
                id: "abc".to_string(),
                name: "hello".to_string(),
                version: "5.5.5".to_string(),
                metadata: BTreeMap::new(),
            },
            kind: PING_RESPONSE_TYPE.to_string(),
        };

        assert_eq!(
            serde_json::to_value(&ping).unwrap(),
            json!({
                "id": "abc",
                "name": "hello",
                "version": "5.5.5",
                "metadata": {},
                "type": "io.nats.micro.v1.ping_response"
            })
        );
    }

    #[test]
    fn test_stats_endpoint_flattened() {
        let endpoint = EndpointStats {
            name: "m".to_string(),
            subject: "svc.m".to_string(),
            stats: MethodStats::default(),
        };
        let value = serde_json::to_value(&endpoint).unwrap();
        assert_eq!(value["num_requests"], json!(0));
        assert_eq!(value["last_error"], json!(""));
    }

    #[test]
    fn test_registration_state() {
        let value = json!({
            "info": {
                "id": "x",
                "name": "svc",
                "version": "1.0.0",
                "type": INFO_RESPONSE_TYPE,
                "endpoints": []
            },
            "state": "down"
        });
        let registration: Registration = serde_json::from_value(value).unwrap();
        assert_eq!(registration.state, RegistrationState::Down);
        assert!(registration.info.identity.metadata.is_empty());
    }
}
