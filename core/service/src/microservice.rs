// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Weak};

use micro_broker::{Broker, MessageHandler};
use micro_config::{Configuration, validate_token};
use serde_json::{Value, json};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::config::{ConfigSource, LiveConfig, MethodConfig, MicroserviceConfig, MicroserviceOptions};
use crate::discovery::Discovery;
use crate::dispatch;
use crate::errors::{MethodError, ServiceError};
use crate::handler::Handler;
use crate::protocol::{METADATA_FEATURE, METADATA_FEATURE_PARAMS, RegistrationState};
use crate::request::HandlerInfo;
use crate::response::Response;
use crate::schema::VoidSchema;

/// Name of the injected remote-shutdown method.
pub const STOP_METHOD: &str = "microservice_stop";

const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Started,
    Restarted,
    Stopped,
}

struct StartedMethod {
    name: String,
    subject: String,
    handler: MessageHandler,
}

enum State {
    Created,
    Started(Vec<StartedMethod>),
    Stopped,
}

struct MicroserviceInner {
    broker: Arc<dyn Broker>,
    config: LiveConfig,
    discovery: Discovery,
    options: MicroserviceOptions,
    state: Mutex<State>,
    events: broadcast::Sender<LifecycleEvent>,
}

/// A set of methods served under one service name, plus its discovery
/// identity.
#[derive(Clone)]
pub struct Microservice {
    inner: Arc<MicroserviceInner>,
}

impl Microservice {
    pub fn new(broker: Arc<dyn Broker>, config: impl Into<ConfigSource>) -> Self {
        Microservice::new_with_options(broker, config, MicroserviceOptions::default())
    }

    pub fn new_with_options(
        broker: Arc<dyn Broker>,
        config: impl Into<ConfigSource>,
        options: MicroserviceOptions,
    ) -> Self {
        let config = LiveConfig::new(config.into());
        let discovery = Discovery::new(broker.clone(), config.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let inner = Arc::new_cyclic(|weak: &Weak<MicroserviceInner>| {
            if options.stop_method() {
                config.add_method(STOP_METHOD, stop_method_config(weak.clone(), &config, &discovery));
            }

            MicroserviceInner {
                broker,
                config,
                discovery,
                options,
                state: Mutex::new(State::Created),
                events,
            }
        });

        Microservice { inner }
    }

    /// Create and start a microservice.
    pub async fn create(
        broker: Arc<dyn Broker>,
        config: impl Into<ConfigSource>,
    ) -> Result<Self, ServiceError> {
        let ms = Microservice::new(broker, config);
        ms.start().await?;
        Ok(ms)
    }

    pub async fn create_with_options(
        broker: Arc<dyn Broker>,
        config: impl Into<ConfigSource>,
        options: MicroserviceOptions,
    ) -> Result<Self, ServiceError> {
        let ms = Microservice::new_with_options(broker, config, options);
        ms.start().await?;
        Ok(ms)
    }

    pub fn id(&self) -> &str {
        self.inner.discovery.id()
    }

    pub fn discovery(&self) -> &Discovery {
        &self.inner.discovery
    }

    /// Current configuration, including added and injected methods.
    pub fn config(&self) -> MicroserviceConfig {
        self.inner.config.resolve()
    }

    pub fn events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    pub async fn is_started(&self) -> bool {
        matches!(*self.inner.state.lock().await, State::Started(_))
    }

    pub async fn start(&self) -> Result<(), ServiceError> {
        let mut state = self.inner.state.lock().await;
        if matches!(*state, State::Started(_)) {
            return Err(ServiceError::InvalidState(
                "microservice already started".to_string(),
            ));
        }

        let config = self.config();
        config.validate()?;

        info!(
            service = %config.name(),
            id = %self.id(),
            methods = ?config.methods().keys().collect::<Vec<_>>(),
            "starting microservice"
        );

        let started = self.start_methods(&config).await?;
        if let Err(e) = self.inner.discovery.start().await {
            let _ = self.stop_methods(started).await;
            let _ = self.inner.discovery.stop().await;
            return Err(e);
        }

        *state = State::Started(started);
        let _ = self.inner.events.send(LifecycleEvent::Started);
        Ok(())
    }

    /// Release every method and discovery subscription. All of them are
    /// attempted; the first failure is returned.
    pub async fn stop(&self) -> Result<(), ServiceError> {
        let mut state = self.inner.state.lock().await;
        let methods = match std::mem::replace(&mut *state, State::Stopped) {
            State::Started(methods) => methods,
            other => {
                *state = other;
                debug!(id = %self.id(), "microservice not running");
                return Ok(());
            }
        };

        info!(id = %self.id(), "stopping microservice");

        let methods_stopped = self.stop_methods(methods).await;
        let discovery_stopped = self.inner.discovery.stop().await;

        let _ = self.inner.events.send(LifecycleEvent::Stopped);
        methods_stopped.and(discovery_stopped)
    }

    /// Re-read the configuration and subscribe its methods again.
    ///
    /// An invalid configuration is rejected while the current methods keep
    /// serving. If re-subscribing fails, the microservice ends up stopped.
    pub async fn restart(&self) -> Result<(), ServiceError> {
        let mut state = self.inner.state.lock().await;
        if !matches!(*state, State::Started(_)) {
            return Err(ServiceError::InvalidState(
                "microservice is not running".to_string(),
            ));
        }

        let config = self.config();
        config.validate()?;
        info!(service = %config.name(), id = %self.id(), "restarting microservice");

        let methods = match std::mem::replace(&mut *state, State::Stopped) {
            State::Started(methods) => methods,
            _ => Vec::new(),
        };

        let restarted = match self.stop_methods(methods).await {
            Ok(()) => self.start_methods(&config).await,
            Err(e) => Err(e),
        };
        let started = match restarted {
            Ok(started) => started,
            Err(e) => {
                warn!(id = %self.id(), error = %e, "restart failed, stopping microservice");
                let _ = self.inner.discovery.stop().await;
                let _ = self.inner.events.send(LifecycleEvent::Stopped);
                return Err(e);
            }
        };
        *state = State::Started(started);

        self.inner
            .discovery
            .publish_registration(RegistrationState::Up)
            .await?;

        let _ = self.inner.events.send(LifecycleEvent::Restarted);
        Ok(())
    }

    /// Register a method; it is served right away if the microservice runs.
    pub async fn add_method(&self, name: &str, method: MethodConfig) -> Result<(), ServiceError> {
        validate_token("method name", name)?;
        self.inner.config.add_method(name, method.clone());

        let mut state = self.inner.state.lock().await;
        if let State::Started(methods) = &mut *state {
            let config = self.config();
            if let Some(pos) = methods.iter().position(|m| m.name == name) {
                let previous = methods.remove(pos);
                self.inner
                    .broker
                    .unsubscribe(previous.subject.into(), &previous.handler)
                    .await?;
            }
            methods.push(self.start_method(&config, name, &method).await?);
        }
        Ok(())
    }

    async fn start_method(
        &self,
        config: &MicroserviceConfig,
        name: &str,
        method: &MethodConfig,
    ) -> Result<StartedMethod, ServiceError> {
        let subject = self.inner.discovery.method_subject(config, name, method);
        let queue_group = if method.unbalanced() || method.local() {
            None
        } else {
            Some(self.inner.options.queue_group().to_string())
        };

        let handler = dispatch::wrap(
            self.inner.broker.clone(),
            HandlerInfo::new(config.name(), self.id(), name),
            method.clone(),
            Some(self.inner.discovery.stats().clone()),
        );

        debug!(method = %name, subject = %subject, queue_group = ?queue_group, "subscribing method");
        self.inner
            .broker
            .subscribe(subject.clone().into(), handler.clone(), queue_group)
            .await?;

        Ok(StartedMethod {
            name: name.to_string(),
            subject,
            handler,
        })
    }

    /// Subscribe every method of `config`, releasing the ones already
    /// subscribed if one fails.
    async fn start_methods(
        &self,
        config: &MicroserviceConfig,
    ) -> Result<Vec<StartedMethod>, ServiceError> {
        let mut started = Vec::new();
        for (name, method) in config.methods() {
            match self.start_method(config, name, method).await {
                Ok(method) => started.push(method),
                Err(e) => {
                    let _ = self.stop_methods(started).await;
                    return Err(e);
                }
            }
        }
        Ok(started)
    }

    async fn stop_methods(&self, methods: Vec<StartedMethod>) -> Result<(), ServiceError> {
        let mut result = Ok(());
        for method in methods {
            debug!(method = %method.name, subject = %method.subject, "unsubscribing method");
            if let Err(e) = self
                .inner
                .broker
                .unsubscribe(method.subject.clone().into(), &method.handler)
                .await
            {
                warn!(method = %method.name, subject = %method.subject, error = %e, "failed to unsubscribe method");
                if result.is_ok() {
                    result = Err(e.into());
                }
            }
        }
        result
    }
}

fn stop_method_config(
    weak: Weak<MicroserviceInner>,
    config: &LiveConfig,
    discovery: &Discovery,
) -> MethodConfig {
    let params = json!({
        "name": config.resolve().name(),
        "id": discovery.id(),
    });

    let handler = Handler::new(move |_req, res: Response| {
        let weak = weak.clone();
        async move {
            let inner = weak
                .upgrade()
                .ok_or_else(|| MethodError::new("microservice dropped"))?;
            res.send(Value::Null);
            Microservice { inner }
                .stop()
                .await
                .map_err(|e| MethodError::new(e.to_string()))
        }
    });

    MethodConfig::new(handler)
        .with_request_schema(VoidSchema)
        .with_response_schema(VoidSchema)
        .with_local(true)
        .with_unbalanced(true)
        .with_metadata(METADATA_FEATURE, STOP_METHOD)
        .with_metadata(METADATA_FEATURE_PARAMS, &params.to_string())
}
