// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod errors;
pub mod handler;
pub mod microservice;
pub mod monitor;
pub mod protocol;
pub mod request;
pub mod response;
pub mod schema;
pub mod stats;

pub use config::{ConfigSource, LiveConfig, MethodConfig, MicroserviceConfig, MicroserviceOptions};
pub use discovery::Discovery;
pub use errors::{MethodError, ServiceError};
pub use handler::{Handler, HandlerResult, Middleware};
pub use microservice::{LifecycleEvent, Microservice, STOP_METHOD};
pub use monitor::{DiscoverOptions, DiscoveredService, Monitor, MonitorEvent};
pub use request::{HandlerInfo, Request};
pub use response::{Response, ResponseData};
pub use schema::{AnySchema, Schema, TypedSchema, VoidSchema};
pub use stats::{MethodStats, StatsRegistry};
