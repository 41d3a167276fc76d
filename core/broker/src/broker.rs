// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use crate::errors::BrokerError;
use crate::message::{
    Message, MessageHandler, PublishOptions, RequestManyOptions, RequestOptions,
};
use crate::stream::ReplyStream;
use crate::subject::Subject;

/// Transport contract used by microservices, discovery and monitors.
///
/// Implementations merge the current call context into the headers of every
/// published message.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Identifier of the underlying client connection.
    fn client_id(&self) -> String;

    /// Timeout applied when a request does not carry its own.
    fn default_timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn publish(
        &self,
        subject: Subject,
        data: Value,
        options: PublishOptions,
    ) -> Result<(), BrokerError>;

    /// Register `handler` on `subject`. Subscriptions to the same literal
    /// subject share one underlying subscription.
    async fn subscribe(
        &self,
        subject: Subject,
        handler: MessageHandler,
        queue_group: Option<String>,
    ) -> Result<(), BrokerError>;

    async fn unsubscribe(
        &self,
        subject: Subject,
        handler: &MessageHandler,
    ) -> Result<(), BrokerError>;

    async fn request_many(
        &self,
        subject: Subject,
        data: Value,
        options: RequestManyOptions,
    ) -> Result<ReplyStream, BrokerError>;

    /// Single-reply request. Replies carrying error headers are turned into
    /// `BrokerError::Remote`.
    async fn request(
        &self,
        subject: Subject,
        data: Value,
        options: RequestOptions,
    ) -> Result<Message, BrokerError> {
        let topic = subject.to_topic()?;
        let timeout = options.timeout.unwrap_or_else(|| self.default_timeout());

        let many = RequestManyOptions {
            timeout: Some(timeout),
            limit: Some(1),
            headers: options.headers,
        };
        let mut replies = self.request_many(subject, data, many).await?;

        match replies.next().await {
            Some(reply) => reply.into_result(),
            None if replies.is_no_responders() => Err(BrokerError::NoResponders(topic)),
            None => Err(BrokerError::Timeout {
                subject: topic,
                timeout,
            }),
        }
    }
}
