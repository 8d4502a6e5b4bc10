use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;

use crate::{
    error::ErrorKind,
    spec::{ArgMap, ToolSpec},
};

/// Executable body bound to a tool at registration.
///
/// Handlers are pure with respect to the executor: they return a value or
/// fail, and they never invoke other tools. Composition of tools is
/// expressed as a plan.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Runs the handler with already-coerced arguments.
    async fn invoke(&self, args: &ArgMap) -> Result<Value, ErrorKind>;
}

/// Errors raised while loading the registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two tools were registered under the same name.
    #[error("duplicate tool name: {0}")]
    Duplicate(String),
    /// A spec named a handler id that resolves to nothing.
    #[error("unresolvable handler id: {0}")]
    UnknownHandler(String),
}

#[derive(Clone)]
struct ToolEntry {
    spec: ToolSpec,
    handler: Arc<dyn ToolHandler>,
    fallback: Option<Arc<dyn ToolHandler>>,
}

/// A tool resolved for execution.
#[derive(Clone)]
pub struct ResolvedTool {
    /// The declarative spec.
    pub spec: ToolSpec,
    /// Primary handler.
    pub handler: Arc<dyn ToolHandler>,
    /// Cross-platform fallback handler, when registered.
    pub fallback: Option<Arc<dyn ToolHandler>>,
}

/// Immutable view over the registered specs.
///
/// The router and planner work exclusively against snapshots so a
/// classification stays consistent for the duration of one utterance.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    specs: IndexMap<String, ToolSpec>,
}

impl RegistrySnapshot {
    /// Looks up a spec by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.get(name)
    }

    /// Whether a tool exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    /// Iterates specs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolSpec> {
        self.specs.values()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Catalog of named tools with handler bindings.
///
/// Registration happens at process start (the builtin catalog) and through
/// capability promotion; duplicate names fail loudly at registration.
#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<IndexMap<String, ToolEntry>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool with its primary handler.
    pub fn register(
        &self,
        spec: ToolSpec,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistryError> {
        self.register_with_fallback(spec, handler, None)
    }

    /// Registers a tool with a cross-platform fallback handler.
    pub fn register_with_fallback(
        &self,
        spec: ToolSpec,
        handler: Arc<dyn ToolHandler>,
        fallback: Option<Arc<dyn ToolHandler>>,
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        if entries.contains_key(&spec.name) {
            return Err(RegistryError::Duplicate(spec.name.clone()));
        }
        entries.insert(
            spec.name.clone(),
            ToolEntry {
                spec,
                handler,
                fallback,
            },
        );
        Ok(())
    }

    /// Returns the spec registered under `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ToolSpec> {
        self.entries.read().get(name).map(|entry| entry.spec.clone())
    }

    /// Resolves a tool for execution.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<ResolvedTool> {
        self.entries.read().get(name).map(|entry| ResolvedTool {
            spec: entry.spec.clone(),
            handler: Arc::clone(&entry.handler),
            fallback: entry.fallback.clone(),
        })
    }

    /// Immutable snapshot of all specs in registration order.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            specs: self
                .entries
                .read()
                .iter()
                .map(|(name, entry)| (name.clone(), entry.spec.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl ToolHandler for EchoHandler {
        async fn invoke(&self, args: &ArgMap) -> Result<Value, ErrorKind> {
            Ok(json!({ "echo": args }))
        }
    }

    fn sample_spec(name: &str) -> ToolSpec {
        ToolSpec::builder(name, "sample", "test.echo").build()
    }

    #[test]
    fn lookup_returns_registered_spec() {
        let registry = ToolRegistry::new();
        let spec = sample_spec("mute");
        registry.register(spec.clone(), Arc::new(EchoHandler)).unwrap();
        assert_eq!(registry.lookup("mute"), Some(spec));
        assert!(registry.lookup("unknown").is_none());
    }

    #[test]
    fn duplicate_names_fail_at_registration() {
        let registry = ToolRegistry::new();
        registry
            .register(sample_spec("mute"), Arc::new(EchoHandler))
            .unwrap();
        let err = registry
            .register(sample_spec("mute"), Arc::new(EchoHandler))
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("mute".into()));
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let registry = ToolRegistry::new();
        for name in ["set_volume", "mute", "open_app"] {
            registry
                .register(sample_spec(name), Arc::new(EchoHandler))
                .unwrap();
        }
        let snapshot = registry.snapshot();
        let names: Vec<&str> = snapshot
            .iter()
            .map(|spec| spec.name.as_str())
            .collect();
        assert_eq!(names, vec!["set_volume", "mute", "open_app"]);
    }
}
