// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::sync::Arc;

use micro_broker::InMemoryBroker;
use micro_service::{
    Handler, MethodConfig, MethodError, Microservice, MicroserviceConfig, Request, Response,
    ResponseData,
};
use parking_lot::Mutex;
use serde_json::json;

use common::{call, shared};

type Trace = Arc<Mutex<Vec<String>>>;

fn step(trace: &Trace, name: &'static str) -> Handler {
    let trace = trace.clone();
    Handler::new(move |_req, _res| {
        let trace = trace.clone();
        async move {
            trace.lock().push(name.to_string());
            Ok(())
        }
    })
}

fn answer(trace: &Trace) -> Handler {
    let trace = trace.clone();
    Handler::new(move |_req, res: Response| {
        let trace = trace.clone();
        async move {
            trace.lock().push("handler".to_string());
            res.send(json!("handled"));
            Ok(())
        }
    })
}

async fn serve(broker: &InMemoryBroker, method: MethodConfig) -> Microservice {
    Microservice::create(
        shared(broker),
        MicroserviceConfig::new("mw").with_method("m", method),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_pipeline_order() {
    let broker = InMemoryBroker::new();
    let trace = Trace::default();
    let method = MethodConfig::new(answer(&trace))
        .with_middleware(step(&trace, "pre1"))
        .with_middleware(step(&trace, "pre2"))
        .with_post_middleware(step(&trace, "post1"))
        .with_post_middleware(step(&trace, "post2"));
    let _ms = serve(&broker, method).await;

    let reply = call(&broker, "mw.m", json!("")).await.unwrap();
    assert_eq!(reply.data, json!("handled"));
    assert_eq!(
        *trace.lock(),
        vec!["pre1", "pre2", "handler", "post1", "post2"]
    );
}

#[tokio::test]
async fn test_closing_pre_middleware_short_circuits() {
    let broker = InMemoryBroker::new();
    let trace = Trace::default();

    let reject = {
        let trace = trace.clone();
        Handler::new(move |req: Request, res: Response| {
            let trace = trace.clone();
            async move {
                trace.lock().push("auth".to_string());
                if req.headers.get("Authorization").is_none() {
                    res.send(json!({"denied": true}));
                }
                Ok(())
            }
        })
    };

    let post = {
        let trace = trace.clone();
        Handler::new(move |_req, res: Response| {
            let trace = trace.clone();
            async move {
                trace.lock().push("post".to_string());
                assert!(matches!(res.data(), ResponseData::Sent(_)));
                res.append_header("X-Post", "seen");
                Ok(())
            }
        })
    };

    let method = MethodConfig::new(answer(&trace))
        .with_middleware(reject)
        .with_middleware(step(&trace, "pre2"))
        .with_post_middleware(post);
    let _ms = serve(&broker, method).await;

    let reply = call(&broker, "mw.m", json!("")).await.unwrap();
    assert_eq!(reply.data, json!({"denied": true}));
    assert_eq!(reply.headers.get("X-Post"), Some("seen"));
    assert_eq!(*trace.lock(), vec!["auth", "post"]);
}

#[tokio::test]
async fn test_failing_middleware_aborts_pipeline() {
    let broker = InMemoryBroker::new();
    let trace = Trace::default();

    let failing = Handler::new(|_req, _res| async {
        Err(MethodError::with_status("401", "unauthorized"))
    });
    let method = MethodConfig::new(answer(&trace))
        .with_middleware(failing)
        .with_post_middleware(step(&trace, "post"));
    let ms = serve(&broker, method).await;

    let err = call(&broker, "mw.m", json!("")).await.unwrap_err();
    assert_eq!(err.to_string(), "unauthorized");
    assert_eq!(err.status(), Some("401"));
    assert!(trace.lock().is_empty());

    let stats = ms.discovery().stats().get("m");
    assert_eq!(stats.num_errors, 1);
    assert_eq!(stats.last_error, "unauthorized");
}

#[tokio::test]
async fn test_post_middleware_answers_open_response() {
    let broker = InMemoryBroker::new();
    let trace = Trace::default();

    let fallback = Handler::new(|_req, res: Response| async move {
        res.send(json!("from post"));
        Ok(())
    });
    let method = MethodConfig::new(step(&trace, "handler")).with_post_middleware(fallback);
    let _ms = serve(&broker, method).await;

    let reply = call(&broker, "mw.m", json!("")).await.unwrap();
    assert_eq!(reply.data, json!("from post"));
}
