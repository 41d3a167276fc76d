// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

pub mod broker;
pub mod codec;
pub mod context;
pub mod errors;
pub mod headers;
pub mod in_memory;
pub mod message;
pub mod stream;
pub mod subject;

pub use broker::Broker;
pub use context::CallContext;
pub use errors::BrokerError;
pub use headers::{CONTEXT_HEADER_PREFIX, ERROR_MESSAGE_HEADER, ERROR_STATUS_HEADER, Headers};
pub use in_memory::{InMemoryBroker, QueueGroupMode};
pub use message::{Message, MessageHandler, PublishOptions, RequestManyOptions, RequestOptions};
pub use stream::ReplyStream;
pub use subject::{MethodSubject, Subject, matches};
