// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};

use futures::StreamExt;
use serde_json::json;

use micro_broker::{
    Broker, InMemoryBroker, Message, MessageHandler, PublishOptions, RequestManyOptions,
};

async fn responder(broker: &InMemoryBroker, subject: &str, answer: i64) {
    let b = broker.clone();
    let handler = MessageHandler::new(move |msg: Message| {
        let b = b.clone();
        async move {
            if let Some(reply_to) = msg.reply_to {
                let _ = b
                    .publish(reply_to.into(), json!(answer), PublishOptions::default())
                    .await;
            }
        }
    });
    broker.subscribe(subject.into(), handler, None).await.unwrap();
}

#[tokio::test]
async fn test_collects_until_timeout() {
    let broker = InMemoryBroker::new();
    responder(&broker, "$SRV.PING", 1).await;
    responder(&broker, "$SRV.PING", 2).await;

    let start = Instant::now();
    let replies: Vec<Message> = broker
        .request_many(
            "$SRV.PING".into(),
            json!(""),
            RequestManyOptions::default().with_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(replies.len(), 2);
    let mut values: Vec<i64> = replies.iter().filter_map(|m| m.data.as_i64()).collect();
    values.sort();
    assert_eq!(values, vec![1, 2]);
    assert!(start.elapsed() >= Duration::from_millis(100));

    // only the two responders remain subscribed
    assert_eq!(broker.subscription_count(), 2);
}

#[tokio::test]
async fn test_limit_closes_before_timeout() {
    let broker = InMemoryBroker::new();
    responder(&broker, "$SRV.PING", 1).await;
    responder(&broker, "$SRV.PING", 2).await;

    let start = Instant::now();
    let replies: Vec<Message> = broker
        .request_many(
            "$SRV.PING".into(),
            json!(""),
            RequestManyOptions::default()
                .with_timeout(Duration::from_secs(5))
                .with_limit(1),
        )
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(replies.len(), 1);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(broker.subscription_count(), 2);
}

#[tokio::test]
async fn test_early_drop_releases_inbox() {
    let broker = InMemoryBroker::new();
    responder(&broker, "svc.m", 1).await;

    let mut replies = broker
        .request_many(
            "svc.m".into(),
            json!(""),
            RequestManyOptions::default().with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();
    assert!(broker.has_subscription(replies.inbox()));

    let first = replies.next().await.unwrap();
    assert_eq!(first.data, json!(1));

    let inbox = replies.inbox().to_string();
    drop(replies);
    assert!(!broker.has_subscription(&inbox));
}
