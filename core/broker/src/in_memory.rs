// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use micro_config::RuntimeConfiguration;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{Instrument, debug, error};
use uuid::Uuid;

use crate::broker::Broker;
use crate::codec;
use crate::context;
use crate::errors::BrokerError;
use crate::headers::Headers;
use crate::message::{Message, MessageHandler, PublishOptions, RequestManyOptions};
use crate::stream::{Inbox, ReplyStream};
use crate::subject::{Subject, matches};

/// How a message is routed to subscriptions sharing a queue group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueueGroupMode {
    /// one member of each queue group receives the message, in turn
    #[default]
    Balanced,
    /// every member receives the message
    FanOut,
}

struct Subscription {
    handler: MessageHandler,
    queue_group: Option<String>,
}

#[derive(Default)]
struct SubjectEntry {
    subscriptions: Vec<Subscription>,
    cursors: HashMap<String, usize>,
}

impl SubjectEntry {
    fn route(&mut self, mode: QueueGroupMode, targets: &mut Vec<MessageHandler>) {
        let SubjectEntry {
            subscriptions,
            cursors,
        } = self;

        let mut groups: BTreeMap<&str, Vec<&MessageHandler>> = BTreeMap::new();
        for sub in subscriptions.iter() {
            match (&sub.queue_group, mode) {
                (Some(group), QueueGroupMode::Balanced) => {
                    groups.entry(group.as_str()).or_default().push(&sub.handler)
                }
                _ => targets.push(sub.handler.clone()),
            }
        }

        for (group, members) in groups {
            let cursor = cursors.entry(group.to_string()).or_insert(0);
            targets.push(members[*cursor % members.len()].clone());
            *cursor = cursor.wrapping_add(1);
        }
    }
}

type SubjectTable = Arc<Mutex<HashMap<String, SubjectEntry>>>;

fn remove_subscription(table: &SubjectTable, topic: &str, handler: &MessageHandler) -> bool {
    let mut table = table.lock();
    let Some(entry) = table.get_mut(topic) else {
        return false;
    };

    let before = entry.subscriptions.len();
    entry.subscriptions.retain(|s| s.handler != *handler);
    let removed = entry.subscriptions.len() != before;

    if entry.subscriptions.is_empty() {
        table.remove(topic);
    }
    removed
}

/// Process-local broker honouring the same contract as a real transport.
/// Subscriptions may use `*` and `>` wildcards; every delivery runs on its
/// own task.
#[derive(Clone)]
pub struct InMemoryBroker {
    subjects: SubjectTable,
    config: RuntimeConfiguration,
    mode: QueueGroupMode,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        InMemoryBroker::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        InMemoryBroker {
            subjects: Arc::new(Mutex::new(HashMap::new())),
            config: RuntimeConfiguration::default(),
            mode: QueueGroupMode::default(),
        }
    }

    pub fn with_config(self, config: RuntimeConfiguration) -> Self {
        InMemoryBroker { config, ..self }
    }

    pub fn with_queue_group_mode(self, mode: QueueGroupMode) -> Self {
        InMemoryBroker { mode, ..self }
    }

    pub fn config(&self) -> &RuntimeConfiguration {
        &self.config
    }

    pub fn queue_group_mode(&self) -> QueueGroupMode {
        self.mode
    }

    /// Drop every subscription.
    pub fn unsubscribe_all(&self) {
        self.subjects.lock().clear();
    }

    /// Total number of registered handlers.
    pub fn subscription_count(&self) -> usize {
        self.subjects
            .lock()
            .values()
            .map(|e| e.subscriptions.len())
            .sum()
    }

    /// Whether a subscription exists on this literal subject.
    pub fn has_subscription(&self, subject: &str) -> bool {
        self.subjects.lock().contains_key(subject)
    }

    pub fn subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self.subjects.lock().keys().cloned().collect();
        subjects.sort();
        subjects
    }

    fn add_subscription(&self, topic: &str, handler: MessageHandler, queue_group: Option<String>) {
        self.subjects
            .lock()
            .entry(topic.to_string())
            .or_default()
            .subscriptions
            .push(Subscription {
                handler,
                queue_group,
            });
    }

    fn route(&self, topic: &str) -> Vec<MessageHandler> {
        let mut targets = Vec::new();
        let mut table = self.subjects.lock();
        for (pattern, entry) in table.iter_mut() {
            if matches(pattern, topic) {
                entry.route(self.mode, &mut targets);
            }
        }
        targets
    }

    /// Deliver to every matching subscription and return how many handlers
    /// were scheduled.
    fn deliver(
        &self,
        topic: &str,
        data: &Value,
        headers: Headers,
        reply_to: Option<String>,
    ) -> Result<usize, BrokerError> {
        let payload = codec::encode(data)?;
        let targets = self.route(topic);

        debug!(subject = %topic, targets = targets.len(), "publishing message");
        if targets.is_empty() {
            return Ok(0);
        }

        let data = codec::decode(&payload)?;
        let msg = Message {
            subject: topic.to_string(),
            data,
            headers,
            reply_to,
        };

        // deliveries run inside the publisher's span
        for handler in targets.iter() {
            let fut = handler.call(msg.clone());
            tokio::spawn(fut.in_current_span());
        }

        Ok(targets.len())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    fn client_id(&self) -> String {
        "0".to_string()
    }

    fn default_timeout(&self) -> Duration {
        self.config.request_timeout()
    }

    async fn publish(
        &self,
        subject: Subject,
        data: Value,
        options: PublishOptions,
    ) -> Result<(), BrokerError> {
        let topic = subject.to_topic()?;
        let headers = context::merge_outgoing(options.headers);
        self.deliver(&topic, &data, headers, options.reply_to)?;
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: Subject,
        handler: MessageHandler,
        queue_group: Option<String>,
    ) -> Result<(), BrokerError> {
        let topic = subject.to_topic()?;
        debug!(subject = %topic, queue_group = ?queue_group, handler = handler.id(), "subscribe");
        self.add_subscription(&topic, handler, queue_group);
        Ok(())
    }

    async fn unsubscribe(
        &self,
        subject: Subject,
        handler: &MessageHandler,
    ) -> Result<(), BrokerError> {
        let topic = subject.to_topic()?;
        if remove_subscription(&self.subjects, &topic, handler) {
            debug!(subject = %topic, handler = handler.id(), "unsubscribe");
        } else {
            debug!(subject = %topic, handler = handler.id(), "unsubscribe: handler not registered");
        }
        Ok(())
    }

    async fn request_many(
        &self,
        subject: Subject,
        data: Value,
        options: RequestManyOptions,
    ) -> Result<ReplyStream, BrokerError> {
        let topic = subject.to_topic()?;
        let timeout = options.timeout.unwrap_or_else(|| self.default_timeout());

        let name = format!("_INBOX.{}", Uuid::new_v4().simple());
        let (inbox, receiver) = Inbox::new(&name);

        let feeder = {
            let inbox = inbox.clone();
            MessageHandler::new(move |msg| {
                let inbox = inbox.clone();
                async move { inbox.deliver(msg) }
            })
        };
        self.add_subscription(&name, feeder.clone(), None);
        {
            let table = self.subjects.clone();
            let name = name.clone();
            inbox.on_close(move || {
                remove_subscription(&table, &name, &feeder);
            });
        }
        inbox.arm_timer(timeout);

        let headers = context::merge_outgoing(options.headers);
        let delivered = match self.deliver(&topic, &data, headers, Some(name.clone())) {
            Ok(delivered) => delivered,
            Err(e) => {
                error!(subject = %topic, error = %e, "request failed");
                inbox.close();
                return Err(e);
            }
        };

        if delivered == 0 {
            debug!(subject = %topic, "no responders");
            return Ok(ReplyStream::no_responders(inbox, receiver));
        }

        Ok(ReplyStream::new(inbox, receiver, options.limit))
    }
}
