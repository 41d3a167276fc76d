// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

pub mod config;

pub use config::{ConfigError, ConfigLoader};

pub use micro_broker as broker;
pub use micro_config as configuration;
pub use micro_service as service;

pub use micro_broker::{
    Broker, BrokerError, CallContext, Headers, InMemoryBroker, Message, MessageHandler,
    PublishOptions, QueueGroupMode, ReplyStream, RequestManyOptions, RequestOptions, Subject,
};
pub use micro_config::RuntimeConfiguration;
pub use micro_service::{
    ConfigSource, Handler, LifecycleEvent, MethodConfig, MethodError, Microservice,
    MicroserviceConfig, MicroserviceOptions, Monitor, MonitorEvent, Request, Response,
    ServiceError,
};
pub use micro_tracing::TracingConfiguration;
