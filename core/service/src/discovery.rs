// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, SecondsFormat, Utc};
use micro_broker::{Broker, MessageHandler, PublishOptions};
use parking_lot::Mutex;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::{LiveConfig, MethodConfig, MicroserviceConfig};
use crate::dispatch;
use crate::errors::{MethodError, ServiceError};
use crate::handler::Handler;
use crate::protocol::*;
use crate::request::HandlerInfo;
use crate::stats::StatsRegistry;

const INSTANCE_ID_LEN: usize = 16;

pub fn random_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(INSTANCE_ID_LEN)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Ping,
    Info,
    Schema,
    Stats,
}

impl Verb {
    const ALL: [Verb; 4] = [Verb::Ping, Verb::Info, Verb::Schema, Verb::Stats];

    fn subject(&self) -> &'static str {
        match self {
            Verb::Ping => SRV_PING,
            Verb::Info => SRV_INFO,
            Verb::Schema => SRV_SCHEMA,
            Verb::Stats => SRV_STATS,
        }
    }

    fn method(&self) -> &'static str {
        match self {
            Verb::Ping => "ping",
            Verb::Info => "info",
            Verb::Schema => "schema",
            Verb::Stats => "stats",
        }
    }
}

struct DiscoveryInner {
    broker: Arc<dyn Broker>,
    config: LiveConfig,
    id: String,
    started_at: DateTime<Utc>,
    stats: StatsRegistry,
    subscriptions: Mutex<Vec<(String, MessageHandler)>>,
}

/// Identity of one microservice instance and the answers to the discovery
/// subjects. The configuration is resolved again for every answer.
#[derive(Clone)]
pub struct Discovery {
    inner: Arc<DiscoveryInner>,
}

impl Discovery {
    pub fn new(broker: Arc<dyn Broker>, config: LiveConfig) -> Self {
        Discovery {
            inner: Arc::new(DiscoveryInner {
                broker,
                config,
                id: random_id(),
                started_at: Utc::now(),
                stats: StatsRegistry::new(),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn stats(&self) -> &StatsRegistry {
        &self.inner.stats
    }

    pub fn config(&self) -> MicroserviceConfig {
        self.inner.config.resolve()
    }

    /// Subject a method is served on: the explicit subject if any, otherwise
    /// `service.instance.method` for local methods and `service.method`.
    pub fn method_subject(
        &self,
        config: &MicroserviceConfig,
        name: &str,
        method: &MethodConfig,
    ) -> String {
        if let Some(subject) = method.subject() {
            return subject.to_string();
        }
        if method.local() {
            return format!("{}.{}.{}", config.name(), self.inner.id, name);
        }
        format!("{}.{}", config.name(), name)
    }

    fn identity(&self, config: &MicroserviceConfig) -> ServiceIdentity {
        let mut metadata = BTreeMap::new();
        metadata.insert(METADATA_LIBRARY.to_string(), "nats-micro".to_string());
        metadata.insert(
            METADATA_LIBRARY_VERSION.to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        metadata.insert(METADATA_CLIENT_ID.to_string(), self.inner.broker.client_id());
        metadata.extend(config.metadata().clone());

        ServiceIdentity {
            id: self.inner.id.clone(),
            name: config.name().to_string(),
            version: config.version().to_string(),
            metadata,
        }
    }

    pub fn ping(&self) -> PingResponse {
        let config = self.config();
        PingResponse {
            identity: self.identity(&config),
            kind: PING_RESPONSE_TYPE.to_string(),
        }
    }

    pub fn info(&self) -> InfoResponse {
        let config = self.config();
        let endpoints = config
            .methods()
            .iter()
            .map(|(name, method)| {
                let mut metadata = method.metadata().clone();
                if method.unbalanced() {
                    metadata.insert(METADATA_UNBALANCED.to_string(), "true".to_string());
                }
                if method.local() {
                    metadata.insert(METADATA_LOCAL.to_string(), "true".to_string());
                }
                EndpointInfo {
                    name: name.clone(),
                    subject: self.method_subject(&config, name, method),
                    metadata,
                }
            })
            .collect();

        InfoResponse {
            identity: self.identity(&config),
            kind: INFO_RESPONSE_TYPE.to_string(),
            description: config.description().to_string(),
            endpoints,
        }
    }

    pub fn schema(&self) -> SchemaResponse {
        let config = self.config();
        let describe = |schema: Option<&Arc<dyn crate::schema::Schema>>| {
            schema.map(|s| s.describe()).unwrap_or_else(|| json!({}))
        };
        let endpoints = config
            .methods()
            .iter()
            .map(|(name, method)| EndpointSchema {
                name: name.clone(),
                subject: self.method_subject(&config, name, method),
                schema: SchemaPair {
                    request: describe(method.request_schema()),
                    response: describe(method.response_schema()),
                },
            })
            .collect();

        SchemaResponse {
            identity: self.identity(&config),
            kind: SCHEMA_RESPONSE_TYPE.to_string(),
            endpoints,
        }
    }

    pub fn stats_response(&self) -> StatsResponse {
        let config = self.config();
        let endpoints = config
            .methods()
            .iter()
            .map(|(name, method)| EndpointStats {
                name: name.clone(),
                subject: self.method_subject(&config, name, method),
                stats: self.inner.stats.get(name),
            })
            .collect();

        StatsResponse {
            identity: self.identity(&config),
            kind: STATS_RESPONSE_TYPE.to_string(),
            started: self
                .inner
                .started_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            endpoints,
        }
    }

    fn answer(&self, verb: Verb) -> Result<Value, MethodError> {
        let value = match verb {
            Verb::Ping => serde_json::to_value(self.ping())?,
            Verb::Info => serde_json::to_value(self.info())?,
            Verb::Schema => serde_json::to_value(self.schema())?,
            Verb::Stats => serde_json::to_value(self.stats_response())?,
        };
        Ok(value)
    }

    fn verb_handler(&self, service: &str, verb: Verb) -> MessageHandler {
        let weak: Weak<DiscoveryInner> = Arc::downgrade(&self.inner);
        let handler = Handler::returning(move |_req| {
            let weak = weak.clone();
            async move {
                let inner = weak
                    .upgrade()
                    .ok_or_else(|| MethodError::new("microservice dropped"))?;
                Discovery { inner }.answer(verb)
            }
        });

        dispatch::wrap(
            self.inner.broker.clone(),
            HandlerInfo::new(service, &self.inner.id, verb.method()),
            MethodConfig::new(handler),
            None,
        )
    }

    /// Subscribe the discovery subjects and announce the instance.
    pub async fn start(&self) -> Result<(), ServiceError> {
        if !self.inner.subscriptions.lock().is_empty() {
            debug!(id = %self.inner.id, "discovery already started");
            return Ok(());
        }

        let service = self.config().name().to_string();
        let mut subscriptions = Vec::new();

        for verb in Verb::ALL {
            let handler = self.verb_handler(&service, verb);
            let subjects = [
                verb.subject().to_string(),
                format!("{}.{}", verb.subject(), service),
                format!("{}.{}.{}", verb.subject(), service, self.inner.id),
            ];
            for subject in subjects {
                if let Err(e) = self
                    .inner
                    .broker
                    .subscribe(subject.clone().into(), handler.clone(), None)
                    .await
                {
                    let _ = self.release(subscriptions).await;
                    return Err(e.into());
                }
                subscriptions.push((subject, handler.clone()));
            }
        }

        *self.inner.subscriptions.lock() = subscriptions;
        debug!(id = %self.inner.id, service = %service, "discovery started");

        self.publish_registration(RegistrationState::Up).await
    }

    /// Announce the shutdown and drop the discovery subscriptions. The
    /// subscriptions are released even if the announcement fails.
    pub async fn stop(&self) -> Result<(), ServiceError> {
        let subscriptions = std::mem::take(&mut *self.inner.subscriptions.lock());
        if subscriptions.is_empty() {
            return Ok(());
        }

        let announced = self.publish_registration(RegistrationState::Down).await;
        if let Err(e) = &announced {
            warn!(id = %self.inner.id, error = %e, "failed to announce shutdown");
        }
        let released = self.release(subscriptions).await;

        debug!(id = %self.inner.id, "discovery stopped");
        announced.and(released)
    }

    async fn release(&self, subscriptions: Vec<(String, MessageHandler)>) -> Result<(), ServiceError> {
        let mut result = Ok(());
        for (subject, handler) in subscriptions {
            if let Err(e) = self
                .inner
                .broker
                .unsubscribe(subject.clone().into(), &handler)
                .await
            {
                warn!(subject = %subject, error = %e, "failed to unsubscribe discovery subject");
                if result.is_ok() {
                    result = Err(e.into());
                }
            }
        }
        result
    }

    pub async fn publish_registration(&self, state: RegistrationState) -> Result<(), ServiceError> {
        let registration = Registration {
            info: self.info(),
            state,
        };
        let data = serde_json::to_value(&registration).map_err(micro_broker::BrokerError::from)?;

        self.inner
            .broker
            .publish(SRV_REGISTER.into(), data, PublishOptions::default())
            .await?;
        Ok(())
    }
}
