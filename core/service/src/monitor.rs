// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use micro_broker::{Broker, Message, MessageHandler, RequestManyOptions};
use micro_config::RuntimeConfiguration;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::ServiceError;
use crate::protocol::{InfoResponse, Registration, RegistrationState, SRV_INFO, SRV_REGISTER};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredService {
    pub info: InfoResponse,
    pub first_found_at: DateTime<Utc>,
    pub last_found_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Added(InfoResponse),
    Removed(InfoResponse),
    /// full table after any change
    Changed(Vec<DiscoveredService>),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoverOptions {
    /// keep services found by earlier rounds
    pub do_not_clear: bool,
}

struct MonitorInner {
    broker: Arc<dyn Broker>,
    discovery_timeout: Duration,
    services: RwLock<Vec<DiscoveredService>>,
    events: broadcast::Sender<MonitorEvent>,
    registrations: Mutex<Option<MessageHandler>>,
    periodic: Mutex<Option<CancellationToken>>,
}

impl MonitorInner {
    fn save(&self, info: InfoResponse) {
        let now = Utc::now();
        let added = {
            let mut services = self.services.write();
            match services
                .iter_mut()
                .find(|s| s.info.identity.id == info.identity.id)
            {
                Some(known) => {
                    known.info = info.clone();
                    known.last_found_at = now;
                    false
                }
                None => {
                    services.push(DiscoveredService {
                        info: info.clone(),
                        first_found_at: now,
                        last_found_at: now,
                    });
                    true
                }
            }
        };

        debug!(
            service = %info.identity.name,
            id = %info.identity.id,
            new = added,
            "found microservice"
        );

        if added {
            let _ = self.events.send(MonitorEvent::Added(info));
        }
        self.notify_changed();
    }

    fn remove(&self, id: &str) {
        let removed = {
            let mut services = self.services.write();
            services
                .iter()
                .position(|s| s.info.identity.id == id)
                .map(|pos| services.remove(pos))
        };

        if let Some(service) = removed {
            debug!(service = %service.info.identity.name, id = %id, "microservice gone");
            let _ = self.events.send(MonitorEvent::Removed(service.info));
            self.notify_changed();
        }
    }

    fn notify_changed(&self) {
        let services = self.services.read().clone();
        let _ = self.events.send(MonitorEvent::Changed(services));
    }

    fn handle_registration(&self, msg: Message) {
        match serde_json::from_value::<Registration>(msg.data) {
            Ok(registration) => match registration.state {
                RegistrationState::Up => self.save(registration.info),
                RegistrationState::Down => self.remove(&registration.info.identity.id),
            },
            Err(e) => warn!(error = %e, "ignoring malformed registration"),
        }
    }
}

/// Keeps track of the microservices visible on the bus, from registration
/// events and active discovery rounds.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

impl Monitor {
    /// Create a monitor listening on `$SRV.REGISTER`.
    pub async fn new(broker: Arc<dyn Broker>) -> Result<Self, ServiceError> {
        Monitor::new_with_config(broker, &RuntimeConfiguration::default()).await
    }

    /// Same as `new`, taking the default discovery round duration from
    /// `runtime`.
    pub async fn new_with_config(
        broker: Arc<dyn Broker>,
        runtime: &RuntimeConfiguration,
    ) -> Result<Self, ServiceError> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(MonitorInner {
            broker,
            discovery_timeout: runtime.discovery_timeout(),
            services: RwLock::new(Vec::new()),
            events,
            registrations: Mutex::new(None),
            periodic: Mutex::new(None),
        });

        let weak: Weak<MonitorInner> = Arc::downgrade(&inner);
        let handler = MessageHandler::new(move |msg| {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_registration(msg);
                }
            }
        });

        inner
            .broker
            .subscribe(SRV_REGISTER.into(), handler.clone(), None)
            .await?;
        *inner.registrations.lock() = Some(handler);

        Ok(Monitor { inner })
    }

    pub fn services(&self) -> Vec<DiscoveredService> {
        self.inner.services.read().clone()
    }

    pub fn events(&self) -> broadcast::Receiver<MonitorEvent> {
        self.inner.events.subscribe()
    }

    pub fn discovery_timeout(&self) -> Duration {
        self.inner.discovery_timeout
    }

    /// `discover` with the configured discovery timeout.
    pub async fn discover_with_defaults(&self, options: DiscoverOptions) -> Result<(), ServiceError> {
        self.discover(self.inner.discovery_timeout, options).await
    }

    /// Ask every instance for its info and collect the answers for `timeout`.
    /// The table is cleared first unless `do_not_clear` is set.
    pub async fn discover(
        &self,
        timeout: Duration,
        options: DiscoverOptions,
    ) -> Result<(), ServiceError> {
        if !options.do_not_clear {
            let forgotten = std::mem::take(&mut *self.inner.services.write());
            if !forgotten.is_empty() {
                info!(count = forgotten.len(), "forgetting known microservices");
                self.inner.notify_changed();
            }
        }

        let mut replies = self
            .inner
            .broker
            .request_many(
                SRV_INFO.into(),
                json!(""),
                RequestManyOptions::default().with_timeout(timeout),
            )
            .await?;

        while let Some(reply) = replies.next().await {
            match serde_json::from_value::<InfoResponse>(reply.data) {
                Ok(info) => self.inner.save(info),
                Err(e) => warn!(error = %e, "ignoring malformed info response"),
            }
        }

        Ok(())
    }

    /// Run `discover` every `interval` on a background task, replacing any
    /// periodic discovery already running.
    pub fn start_periodic_discovery(&self, interval: Duration, timeout: Duration) {
        self.stop_periodic_discovery();

        let token = CancellationToken::new();
        *self.inner.periodic.lock() = Some(token.clone());

        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("periodic discovery stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        let monitor = Monitor { inner };
                        let round = monitor.discover(timeout, DiscoverOptions::default());
                        tokio::select! {
                            _ = token.cancelled() => break,
                            res = round => {
                                if let Err(e) = res {
                                    warn!(error = %e, "periodic discovery failed");
                                }
                            }
                        }
                    }
                }
            }
        });
    }

    pub fn stop_periodic_discovery(&self) {
        if let Some(token) = self.inner.periodic.lock().take() {
            token.cancel();
        }
    }

    /// Stop periodic discovery and the registration subscription.
    pub async fn close(&self) -> Result<(), ServiceError> {
        self.stop_periodic_discovery();
        let handler = self.inner.registrations.lock().take();
        if let Some(handler) = handler {
            self.inner
                .broker
                .unsubscribe(SRV_REGISTER.into(), &handler)
                .await?;
        }
        Ok(())
    }
}
