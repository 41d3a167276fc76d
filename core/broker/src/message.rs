// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::errors::BrokerError;
use crate::headers::Headers;

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub subject: String,
    pub data: Value,
    pub headers: Headers,
    /// absent for fire-and-forget messages
    pub reply_to: Option<String>,
}

impl Message {
    pub fn new(subject: &str, data: Value) -> Self {
        Message {
            subject: subject.to_string(),
            data,
            headers: Headers::new(),
            reply_to: None,
        }
    }

    pub fn with_headers(self, headers: Headers) -> Self {
        Message { headers, ..self }
    }

    pub fn with_reply_to(self, reply_to: &str) -> Self {
        Message {
            reply_to: Some(reply_to.to_string()),
            ..self
        }
    }

    /// Turn a reply carrying error headers into the corresponding error.
    pub fn into_result(self) -> Result<Message, BrokerError> {
        match self.headers.error() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

type Callback = dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync;

/// Raw subscription callback. Two handlers are equal when they were created by
/// the same `MessageHandler::new` call, so a clone can be used to unsubscribe.
#[derive(Clone)]
pub struct MessageHandler {
    id: u64,
    callback: Arc<Callback>,
}

impl MessageHandler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        MessageHandler {
            id: NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed),
            callback: Arc::new(move |msg| f(msg).boxed()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn call(&self, msg: Message) -> BoxFuture<'static, ()> {
        (self.callback)(msg)
    }
}

impl PartialEq for MessageHandler {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageHandler {}

impl Debug for MessageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageHandler").field("id", &self.id).finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub headers: Headers,
    pub reply_to: Option<String>,
}

impl PublishOptions {
    pub fn with_headers(self, headers: Headers) -> Self {
        PublishOptions { headers, ..self }
    }

    pub fn with_reply_to(self, reply_to: &str) -> Self {
        PublishOptions {
            reply_to: Some(reply_to.to_string()),
            ..self
        }
    }
}

/// Options of a single-reply request. Without a timeout the broker default
/// applies.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub headers: Headers,
}

impl RequestOptions {
    pub fn with_timeout(self, timeout: Duration) -> Self {
        RequestOptions {
            timeout: Some(timeout),
            ..self
        }
    }

    pub fn with_headers(self, headers: Headers) -> Self {
        RequestOptions { headers, ..self }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestManyOptions {
    pub timeout: Option<Duration>,
    /// stop after this many replies; `None` (or zero) collects until timeout
    pub limit: Option<usize>,
    pub headers: Headers,
}

impl RequestManyOptions {
    pub fn with_timeout(self, timeout: Duration) -> Self {
        RequestManyOptions {
            timeout: Some(timeout),
            ..self
        }
    }

    pub fn with_limit(self, limit: usize) -> Self {
        RequestManyOptions {
            limit: Some(limit),
            ..self
        }
    }

    pub fn with_headers(self, headers: Headers) -> Self {
        RequestManyOptions { headers, ..self }
    }
}
