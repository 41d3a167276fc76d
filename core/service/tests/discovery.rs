// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

mod common;

use micro_broker::InMemoryBroker;
use micro_service::protocol::{
    InfoResponse, SCHEMA_RESPONSE_TYPE, STATS_RESPONSE_TYPE, SchemaResponse, StatsResponse,
};
use micro_service::{
    Handler, MethodConfig, MethodError, Microservice, MicroserviceConfig, TypedSchema,
};
use serde_json::json;

use common::{call, discover, shared};

fn echo() -> Handler {
    Handler::returning(|req: micro_service::Request| async move { Ok::<_, MethodError>(req.data) })
}

fn config() -> MicroserviceConfig {
    MicroserviceConfig::new("subjects")
        .with_metadata("team", "core")
        .with_method("plain", MethodConfig::new(echo()))
        .with_method("local", MethodConfig::new(echo()).with_local(true))
        .with_method(
            "explicit",
            MethodConfig::new(echo()).with_subject("custom.explicit.subject"),
        )
        .with_method(
            "typed",
            MethodConfig::new(echo()).with_request_schema(TypedSchema::<i32>::new()),
        )
}

#[tokio::test]
async fn test_reported_subjects_are_subscribed() {
    let broker = InMemoryBroker::new();
    let ms = Microservice::create(shared(&broker), config()).await.unwrap();

    let info: InfoResponse = discover(&broker, &format!("$SRV.INFO.subjects.{}", ms.id())).await;
    assert_eq!(info.identity.metadata["team"], "core");
    assert_eq!(info.identity.metadata["_nats.client.created.library"], "nats-micro");

    for endpoint in info.endpoints.iter() {
        assert!(
            broker.has_subscription(&endpoint.subject),
            "{} not subscribed",
            endpoint.subject
        );
    }

    let subject = |name: &str| {
        info.endpoints
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.subject.clone())
            .unwrap()
    };
    assert_eq!(subject("plain"), "subjects.plain");
    assert_eq!(subject("local"), format!("subjects.{}.local", ms.id()));
    assert_eq!(subject("explicit"), "custom.explicit.subject");

    let reply = call(&broker, "custom.explicit.subject", json!({"x": 1}))
        .await
        .unwrap();
    assert_eq!(reply.data, json!({"x": 1}));
}

#[tokio::test]
async fn test_schema_and_stats_shapes() {
    let broker = InMemoryBroker::new();
    let _ms = Microservice::create(shared(&broker), config()).await.unwrap();

    let schema: SchemaResponse = discover(&broker, "$SRV.SCHEMA.subjects").await;
    assert_eq!(schema.kind, SCHEMA_RESPONSE_TYPE);
    let typed = schema.endpoints.iter().find(|e| e.name == "typed").unwrap();
    assert_eq!(typed.schema.request["type"], json!("integer"));
    assert_eq!(typed.schema.response, json!({}));

    let err = call(&broker, "subjects.typed", json!("nope")).await.unwrap_err();
    assert!(err.to_string().starts_with("Invalid request type"));

    let stats: StatsResponse = discover(&broker, "$SRV.STATS.subjects").await;
    assert_eq!(stats.kind, STATS_RESPONSE_TYPE);
    let typed = stats.endpoints.iter().find(|e| e.name == "typed").unwrap();
    assert_eq!(typed.stats.num_requests, 1);
    assert_eq!(typed.stats.num_errors, 1);

    // never called: zeroed
    let plain = stats.endpoints.iter().find(|e| e.name == "plain").unwrap();
    assert_eq!(plain.stats.num_requests, 0);
    assert_eq!(plain.stats.last_error, "");
}
