// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Turns a method configuration into a raw subscription handler.
//!
//! Each delivery runs request validation, the pre-middlewares, the handler
//! and the post-middlewares, records the outcome in the method stats and
//! publishes the reply. Failures (panics included) become error replies and
//! never reach the broker.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use micro_broker::{Broker, CallContext, Headers, Message, MessageHandler, PublishOptions};
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use crate::config::MethodConfig;
use crate::errors::MethodError;
use crate::request::{HandlerInfo, Request};
use crate::response::{Response, ResponseData};
use crate::stats::StatsRegistry;

/// Payload of every error reply.
pub const ERROR_PAYLOAD: &str = "ERROR";

/// Wrap `method` into a message handler. When `stats` is given, every call is
/// recorded under the method name.
pub fn wrap(
    broker: Arc<dyn Broker>,
    info: HandlerInfo,
    method: MethodConfig,
    stats: Option<StatsRegistry>,
) -> MessageHandler {
    let info = Arc::new(info);
    let method = Arc::new(method);

    MessageHandler::new(move |msg: Message| {
        let broker = broker.clone();
        let info = info.clone();
        let method = method.clone();
        let stats = stats.clone();
        async move { dispatch(broker, &info, &method, stats.as_ref(), msg).await }
    })
}

async fn dispatch(
    broker: Arc<dyn Broker>,
    info: &HandlerInfo,
    method: &MethodConfig,
    stats: Option<&StatsRegistry>,
    msg: Message,
) {
    debug!(method = %info.method, subject = %msg.subject, "executing method");

    let started = Instant::now();
    let response = Response::new();
    let ctx = CallContext::from_headers(&msg.headers);

    let request = Request {
        data: msg.data,
        subject: msg.subject,
        headers: msg.headers,
        handler: info.clone(),
    };

    let pipeline = AssertUnwindSafe(run_pipeline(method, request, response.clone()));
    let outcome = match ctx.scope(pipeline.catch_unwind()).await {
        Ok(result) => result,
        Err(panic) => Err(MethodError::new(panic_message(panic))),
    };

    let reply = outcome.and_then(|_| validate_reply(method, &response));

    // measured up to the close transition, post-middlewares excluded
    let closed_at = response.closed_at().unwrap_or_else(Instant::now);
    let elapsed_ns = (closed_at.saturating_duration_since(started).as_nanos() as u64).max(1);
    if let Some(stats) = stats {
        let error = reply.as_ref().err().map(|e| e.message().to_string());
        stats.record(&info.method, error.as_deref(), elapsed_ns);
    }

    let reply_to = msg.reply_to;
    match reply {
        Ok(None) => {
            debug!(method = %info.method, "closed without reply");
        }
        Ok(Some(data)) => {
            if let Some(reply_to) = reply_to {
                let options = PublishOptions::default().with_headers(response.headers());
                if let Err(e) = broker.publish(reply_to.into(), data, options).await {
                    error!(method = %info.method, error = %e, "failed to publish reply");
                }
            }
        }
        Err(e) => match reply_to {
            None => {
                error!(method = %info.method, error = %e, "method failed without a reply subject");
            }
            Some(reply_to) => {
                warn!(method = %info.method, error = %e, "method failed");
                let headers = Headers::for_error(e.message(), e.status());
                let options = PublishOptions::default().with_headers(headers);
                if let Err(e) = broker
                    .publish(reply_to.into(), json!(ERROR_PAYLOAD), options)
                    .await
                {
                    error!(method = %info.method, error = %e, "failed to publish error reply");
                }
            }
        },
    }
}

async fn run_pipeline(
    method: &MethodConfig,
    mut request: Request,
    response: Response,
) -> Result<(), MethodError> {
    if let Some(schema) = method.request_schema() {
        request.data = if schema.is_void() {
            Value::Null
        } else {
            schema
                .parse(request.data)
                .map_err(|e| MethodError::new(format!("Invalid request type: {}", e)))?
        };
    }

    for middleware in method.middlewares() {
        middleware.call(request.clone(), response.clone()).await?;
        if response.is_closed() {
            break;
        }
    }

    if !response.is_closed() {
        method.handler().call(request.clone(), response.clone()).await?;
    }

    for middleware in method.post_middlewares() {
        middleware.call(request.clone(), response.clone()).await?;
    }

    // a response left open answers with an empty reply
    if !response.is_closed() {
        response.send(Value::Null);
    }

    Ok(())
}

/// Reply payload after response validation, `None` when no reply is due.
fn validate_reply(method: &MethodConfig, response: &Response) -> Result<Option<Value>, MethodError> {
    let data = match response.data() {
        ResponseData::NoResponse => return Ok(None),
        ResponseData::Sent(data) => data,
        ResponseData::Pending => Value::Null,
    };

    match method.response_schema() {
        Some(schema) if schema.is_void() => Ok(Some(Value::Null)),
        Some(schema) => schema
            .parse(data)
            .map(Some)
            .map_err(|e| MethodError::new(format!("Invalid response type: {}", e))),
        None => Ok(Some(data)),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "method panicked".to_string()
    }
}
