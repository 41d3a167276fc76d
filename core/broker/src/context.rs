// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

//! Per-call ambient context.
//!
//! A `CallContext` is installed for the duration of one inbound dispatch.
//! Code awaited inside that dispatch can attach headers and context fields
//! which are then merged into every outgoing message.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::headers::{CONTEXT_HEADER_PREFIX, Headers};

tokio::task_local! {
    static CALL_CONTEXT: CallContext;
}

#[derive(Debug, Default)]
struct ContextStore {
    headers: Headers,
    fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    store: Arc<Mutex<ContextStore>>,
}

impl CallContext {
    pub fn new() -> Self {
        CallContext::default()
    }

    /// Rebuild the context fields carried by an inbound message.
    pub fn from_headers(headers: &Headers) -> Self {
        let ctx = CallContext::new();
        for (key, value) in headers.iter() {
            if let Some(field) = key.strip_prefix(CONTEXT_HEADER_PREFIX) {
                let value = serde_json::from_str(value)
                    .unwrap_or_else(|_| Value::String(value.to_string()));
                ctx.set_field(field, value);
            }
        }
        ctx
    }

    /// Context of the current task, if one is installed.
    pub fn current() -> Option<CallContext> {
        CALL_CONTEXT.try_with(|ctx| ctx.clone()).ok()
    }

    /// Run `fut` with this context installed.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CALL_CONTEXT.scope(self, fut).await
    }

    pub fn add_header(&self, key: &str, value: &str) {
        self.store.lock().headers.append(key, value);
    }

    pub fn set_field(&self, key: &str, value: Value) {
        self.store.lock().fields.insert(key.to_string(), value);
    }

    pub fn field(&self, key: &str) -> Option<Value> {
        self.store.lock().fields.get(key).cloned()
    }

    pub fn fields(&self) -> BTreeMap<String, Value> {
        self.store.lock().fields.clone()
    }

    /// Additional headers followed by one `X-Context-<field>` header per field.
    pub fn to_headers(&self) -> Headers {
        let store = self.store.lock();
        let mut headers = store.headers.clone();
        for (key, value) in store.fields.iter() {
            headers.append(format!("{}{}", CONTEXT_HEADER_PREFIX, key), value.to_string());
        }
        headers
    }
}

/// Merge the current call context into `explicit`. Keys already present in
/// `explicit` are left untouched.
pub fn merge_outgoing(explicit: Headers) -> Headers {
    let Some(ctx) = CallContext::current() else {
        return explicit;
    };

    let mut merged = explicit.clone();
    for (key, value) in ctx.to_headers() {
        if !explicit.contains_key(&key) {
            merged.append(key, value);
        }
    }
    merged
}
