// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use micro_config::{Configuration, ConfigurationError, RuntimeConfiguration, validate_token};
use parking_lot::RwLock;

use crate::handler::{Handler, Middleware};
use crate::schema::Schema;

#[derive(Clone)]
pub struct MethodConfig {
    handler: Handler,
    middlewares: Vec<Middleware>,
    post_middlewares: Vec<Middleware>,
    subject: Option<String>,
    request: Option<Arc<dyn Schema>>,
    response: Option<Arc<dyn Schema>>,
    metadata: BTreeMap<String, String>,
    unbalanced: bool,
    local: bool,
}

impl MethodConfig {
    pub fn new(handler: Handler) -> Self {
        MethodConfig {
            handler,
            middlewares: Vec::new(),
            post_middlewares: Vec::new(),
            subject: None,
            request: None,
            response: None,
            metadata: BTreeMap::new(),
            unbalanced: false,
            local: false,
        }
    }

    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn with_post_middleware(mut self, middleware: Middleware) -> Self {
        self.post_middlewares.push(middleware);
        self
    }

    /// Subscribe on `subject` instead of the derived method subject.
    pub fn with_subject(self, subject: &str) -> Self {
        MethodConfig {
            subject: Some(subject.to_string()),
            ..self
        }
    }

    pub fn with_request_schema(self, schema: impl Schema + 'static) -> Self {
        MethodConfig {
            request: Some(Arc::new(schema)),
            ..self
        }
    }

    pub fn with_response_schema(self, schema: impl Schema + 'static) -> Self {
        MethodConfig {
            response: Some(Arc::new(schema)),
            ..self
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Every instance receives each call instead of one per queue group.
    pub fn with_unbalanced(self, unbalanced: bool) -> Self {
        MethodConfig { unbalanced, ..self }
    }

    /// Only reachable through the instance-qualified subject.
    pub fn with_local(self, local: bool) -> Self {
        MethodConfig { local, ..self }
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn middlewares(&self) -> &[Middleware] {
        &self.middlewares
    }

    pub fn post_middlewares(&self) -> &[Middleware] {
        &self.post_middlewares
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn request_schema(&self) -> Option<&Arc<dyn Schema>> {
        self.request.as_ref()
    }

    pub fn response_schema(&self) -> Option<&Arc<dyn Schema>> {
        self.response.as_ref()
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn unbalanced(&self) -> bool {
        self.unbalanced
    }

    pub fn local(&self) -> bool {
        self.local
    }
}

impl Debug for MethodConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodConfig")
            .field("middlewares", &self.middlewares.len())
            .field("post_middlewares", &self.post_middlewares.len())
            .field("subject", &self.subject)
            .field("metadata", &self.metadata)
            .field("unbalanced", &self.unbalanced)
            .field("local", &self.local)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct MicroserviceConfig {
    name: String,
    description: String,
    version: String,
    metadata: BTreeMap<String, String>,
    methods: BTreeMap<String, MethodConfig>,
}

impl MicroserviceConfig {
    pub fn new(name: &str) -> Self {
        MicroserviceConfig {
            name: name.to_string(),
            description: String::new(),
            version: "0.0.0".to_string(),
            metadata: BTreeMap::new(),
            methods: BTreeMap::new(),
        }
    }

    pub fn with_description(self, description: &str) -> Self {
        MicroserviceConfig {
            description: description.to_string(),
            ..self
        }
    }

    pub fn with_version(self, version: &str) -> Self {
        MicroserviceConfig {
            version: version.to_string(),
            ..self
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_method(mut self, name: &str, method: MethodConfig) -> Self {
        self.methods.insert(name.to_string(), method);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn methods(&self) -> &BTreeMap<String, MethodConfig> {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodConfig> {
        self.methods.get(name)
    }
}

impl Configuration for MicroserviceConfig {
    type Error = ConfigurationError;

    fn validate(&self) -> Result<(), ConfigurationError> {
        validate_token("service name", &self.name)?;

        for (name, method) in self.methods.iter() {
            validate_token("method name", name)?;
            if let Some(subject) = method.subject()
                && subject.is_empty()
            {
                return Err(ConfigurationError::MissingValue(format!(
                    "subject of method {}",
                    name
                )));
            }
        }

        Ok(())
    }
}

type ConfigProducer = dyn Fn() -> MicroserviceConfig + Send + Sync;

/// Where a microservice reads its configuration from. A dynamic source is
/// re-evaluated every time the configuration is needed.
#[derive(Clone)]
pub enum ConfigSource {
    Static(MicroserviceConfig),
    Dynamic(Arc<ConfigProducer>),
}

impl ConfigSource {
    pub fn dynamic<F>(producer: F) -> Self
    where
        F: Fn() -> MicroserviceConfig + Send + Sync + 'static,
    {
        ConfigSource::Dynamic(Arc::new(producer))
    }

    pub fn resolve(&self) -> MicroserviceConfig {
        match self {
            ConfigSource::Static(config) => config.clone(),
            ConfigSource::Dynamic(producer) => producer(),
        }
    }
}

impl From<MicroserviceConfig> for ConfigSource {
    fn from(config: MicroserviceConfig) -> Self {
        ConfigSource::Static(config)
    }
}

impl Debug for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Static(config) => f.debug_tuple("Static").field(config).finish(),
            ConfigSource::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

/// A config source plus the methods added at runtime. Clones share the
/// added methods.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    source: ConfigSource,
    overlay: Arc<RwLock<BTreeMap<String, MethodConfig>>>,
}

impl LiveConfig {
    pub fn new(source: ConfigSource) -> Self {
        LiveConfig {
            source,
            overlay: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn add_method(&self, name: &str, method: MethodConfig) {
        self.overlay.write().insert(name.to_string(), method);
    }

    /// Current configuration; added methods win over the source's.
    pub fn resolve(&self) -> MicroserviceConfig {
        let mut config = self.source.resolve();
        for (name, method) in self.overlay.read().iter() {
            config.methods.insert(name.clone(), method.clone());
        }
        config
    }
}

/// Per-microservice options.
#[derive(Debug, Clone, PartialEq)]
pub struct MicroserviceOptions {
    stop_method: bool,
    queue_group: String,
}

impl Default for MicroserviceOptions {
    fn default() -> Self {
        MicroserviceOptions::from_runtime(&RuntimeConfiguration::default())
    }
}

impl MicroserviceOptions {
    pub fn from_runtime(runtime: &RuntimeConfiguration) -> Self {
        MicroserviceOptions {
            stop_method: runtime.stop_method(),
            queue_group: runtime.queue_group().to_string(),
        }
    }

    /// Inject the remote `microservice_stop` method.
    pub fn with_stop_method(self, stop_method: bool) -> Self {
        MicroserviceOptions {
            stop_method,
            ..self
        }
    }

    pub fn with_queue_group(self, queue_group: &str) -> Self {
        MicroserviceOptions {
            queue_group: queue_group.to_string(),
            ..self
        }
    }

    pub fn stop_method(&self) -> bool {
        self.stop_method
    }

    pub fn queue_group(&self) -> &str {
        &self.queue_group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::VoidSchema;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop() -> Handler {
        Handler::new(|_req, _res| async { Ok(()) })
    }

    #[test]
    fn test_method_config_builder() {
        let method = MethodConfig::new(noop())
            .with_middleware(noop())
            .with_post_middleware(noop())
            .with_post_middleware(noop())
            .with_subject("custom.subject")
            .with_request_schema(VoidSchema)
            .with_metadata("k", "v")
            .with_unbalanced(true)
            .with_local(true);

        assert_eq!(method.middlewares().len(), 1);
        assert_eq!(method.post_middlewares().len(), 2);
        assert_eq!(method.subject(), Some("custom.subject"));
        assert!(method.request_schema().unwrap().is_void());
        assert!(method.response_schema().is_none());
        assert_eq!(method.metadata().get("k").map(String::as_str), Some("v"));
        assert!(method.unbalanced());
        assert!(method.local());
    }

    #[test]
    fn test_validate() {
        let config = MicroserviceConfig::new("hello")
            .with_version("5.5.5")
            .with_method("method1", MethodConfig::new(noop()));
        assert!(config.validate().is_ok());
        assert_eq!(config.version(), "5.5.5");

        assert!(MicroserviceConfig::new("").validate().is_err());
        assert!(MicroserviceConfig::new("a.b").validate().is_err());

        let config = MicroserviceConfig::new("hello").with_method("bad name", MethodConfig::new(noop()));
        assert!(config.validate().is_err());

        let config = MicroserviceConfig::new("hello")
            .with_method("m", MethodConfig::new(noop()).with_subject(""));
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingValue(_))
        ));
    }

    #[test]
    fn test_dynamic_source_reevaluated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let source = ConfigSource::dynamic(move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            MicroserviceConfig::new("dyn").with_version(&format!("{}.0.0", n))
        });

        assert_eq!(source.resolve().version(), "0.0.0");
        assert_eq!(source.resolve().version(), "1.0.0");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_live_config_overlay() {
        let live = LiveConfig::new(
            MicroserviceConfig::new("svc")
                .with_method("a", MethodConfig::new(noop()))
                .into(),
        );
        let shared = live.clone();
        shared.add_method("b", MethodConfig::new(noop()).with_local(true));

        let config = live.resolve();
        assert_eq!(config.methods().keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(config.method("b").unwrap().local());
    }

    #[test]
    fn test_options() {
        let options = MicroserviceOptions::default();
        assert!(options.stop_method());
        assert_eq!(options.queue_group(), "q");

        let runtime = RuntimeConfiguration::default()
            .with_stop_method(false)
            .with_queue_group("workers");
        let options = MicroserviceOptions::from_runtime(&runtime);
        assert!(!options.stop_method());
        assert_eq!(options.queue_group(), "workers");
        assert!(options.with_stop_method(true).stop_method());
    }
}
