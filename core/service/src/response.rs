// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Instant;

use micro_broker::Headers;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::errors::MethodError;

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Pending,
    Sent(Value),
    /// closed without a reply
    NoResponse,
}

#[derive(Debug)]
struct ResponseState {
    data: ResponseData,
    headers: Headers,
    closed_at: Option<Instant>,
}

/// Reply under construction for one invocation.
///
/// Starts open; the first `send` or `send_no_response` closes it and every
/// later transition is ignored. Clones share the same state.
#[derive(Debug, Clone)]
pub struct Response {
    state: Arc<Mutex<ResponseState>>,
    closed: Arc<watch::Sender<bool>>,
}

impl Default for Response {
    fn default() -> Self {
        Response::new()
    }
}

impl Response {
    pub fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Response {
            state: Arc::new(Mutex::new(ResponseState {
                data: ResponseData::Pending,
                headers: Headers::new(),
                closed_at: None,
            })),
            closed: Arc::new(closed),
        }
    }

    pub fn send(&self, data: Value) {
        self.close_with(ResponseData::Sent(data));
    }

    pub fn send_json<T: Serialize>(&self, data: &T) -> Result<(), MethodError> {
        let value = serde_json::to_value(data)?;
        self.send(value);
        Ok(())
    }

    pub fn send_no_response(&self) {
        self.close_with(ResponseData::NoResponse);
    }

    /// Replace the accumulated headers.
    pub fn set_headers(&self, headers: Headers) {
        self.state.lock().headers = headers;
    }

    pub fn append_header(&self, key: &str, value: &str) {
        self.state.lock().headers.append(key, value);
    }

    pub fn headers(&self) -> Headers {
        self.state.lock().headers.clone()
    }

    pub fn data(&self) -> ResponseData {
        self.state.lock().data.clone()
    }

    /// When the first transition closed the response.
    pub fn closed_at(&self) -> Option<Instant> {
        self.state.lock().closed_at
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the response is closed.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    fn close_with(&self, data: ResponseData) {
        let mut state = self.state.lock();
        if !matches!(state.data, ResponseData::Pending) {
            return;
        }
        state.data = data;
        state.closed_at = Some(Instant::now());
        drop(state);
        self.closed.send_replace(true);
    }
}
