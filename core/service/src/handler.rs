// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;

use crate::errors::MethodError;
use crate::request::Request;
use crate::response::Response;

pub type HandlerResult = Result<(), MethodError>;

type HandlerFn = dyn Fn(Request, Response) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// Method handler. Answers through the `Response`; an error is turned into an
/// error reply by the dispatch pipeline.
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

/// Middlewares share the handler signature.
pub type Middleware = Handler;

impl Handler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Handler(Arc::new(move |req, res| f(req, res).boxed()))
    }

    /// Handler whose return value becomes the reply. Returning `null` leaves
    /// the response open.
    pub fn returning<F, Fut, T>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, MethodError>> + Send + 'static,
        T: Serialize,
    {
        Handler::new(move |req, res: Response| {
            let fut = f(req);
            async move {
                let value = serde_json::to_value(fut.await?)?;
                if !value.is_null() {
                    res.send(value);
                }
                Ok(())
            }
        })
    }

    pub fn call(&self, req: Request, res: Response) -> BoxFuture<'static, HandlerResult> {
        (self.0)(req, res)
    }
}

impl Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Handler")
    }
}
