// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use micro_broker::{
    Broker, BrokerError, InMemoryBroker, Message, MessageHandler, PublishOptions, ReplyStream,
    RequestManyOptions, RequestOptions, Subject,
};
use micro_service::{Handler, MethodConfig, MethodError, MicroserviceConfig};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

pub fn shared(broker: &InMemoryBroker) -> Arc<dyn Broker> {
    Arc::new(broker.clone())
}

pub fn hello_config() -> MicroserviceConfig {
    MicroserviceConfig::new("hello")
        .with_description("Hello service")
        .with_version("5.5.5")
        .with_method(
            "method1",
            MethodConfig::new(Handler::returning(|_req| async { Ok::<_, MethodError>(1) })),
        )
}

pub async fn call(
    broker: &InMemoryBroker,
    subject: impl Into<Subject>,
    data: Value,
) -> Result<Message, BrokerError> {
    broker
        .request(
            subject.into(),
            data,
            RequestOptions::default().with_timeout(Duration::from_millis(500)),
        )
        .await
}

pub async fn discover<T: DeserializeOwned>(broker: &InMemoryBroker, subject: &str) -> T {
    let reply = call(broker, subject, json!("")).await.unwrap();
    serde_json::from_value(reply.data).unwrap()
}

/// In-memory broker whose registration publishes and unsubscribes can be
/// made to fail.
#[derive(Clone, Default)]
pub struct FlakyBroker {
    pub inner: InMemoryBroker,
    fail_registrations: Arc<AtomicBool>,
    fail_unsubscribe: Arc<AtomicBool>,
}

impl FlakyBroker {
    pub fn new() -> Self {
        FlakyBroker::default()
    }

    pub fn fail_registrations(&self, fail: bool) {
        self.fail_registrations.store(fail, Ordering::SeqCst);
    }

    pub fn fail_unsubscribe(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Broker for FlakyBroker {
    fn client_id(&self) -> String {
        self.inner.client_id()
    }

    async fn publish(
        &self,
        subject: Subject,
        data: Value,
        options: PublishOptions,
    ) -> Result<(), BrokerError> {
        if self.fail_registrations.load(Ordering::SeqCst) && subject.to_string() == "$SRV.REGISTER" {
            return Err(BrokerError::Closed);
        }
        self.inner.publish(subject, data, options).await
    }

    async fn subscribe(
        &self,
        subject: Subject,
        handler: MessageHandler,
        queue_group: Option<String>,
    ) -> Result<(), BrokerError> {
        self.inner.subscribe(subject, handler, queue_group).await
    }

    async fn unsubscribe(
        &self,
        subject: Subject,
        handler: &MessageHandler,
    ) -> Result<(), BrokerError> {
        // the subscription goes away, the caller still sees a failure
        self.inner.unsubscribe(subject, handler).await?;
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        Ok(())
    }

    async fn request_many(
        &self,
        subject: Subject,
        data: Value,
        options: RequestManyOptions,
    ) -> Result<ReplyStream, BrokerError> {
        self.inner.request_many(subject, data, options).await
    }
}
