//! Catalog of feature definitions.
//!
//! The registry is built explicitly, populated once by
//! [`FeatureRegistry::with_builtin_features`] (plus any extra plug-ins) and
//! handed to the orchestrator, which only reads it.
use std::any::TypeId;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::{Feature, MAX_PRIORITY, builtin_features};
use crate::config::environment::Environment;
use crate::config::schema::Schema;
use crate::error::RegistryError;

/// Immutable description of a registered feature.
#[derive(Clone)]
pub struct FeatureDefinition {
    name: String,
    priority: u8,
    environments: BTreeSet<String>,
    schema: Schema,
    handler: Arc<dyn Feature>,
}

impl fmt::Debug for FeatureDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureDefinition")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("environments", &self.environments)
            .finish_non_exhaustive()
    }
}

impl FeatureDefinition {
    /// Capture the declaration of `handler`.
    #[must_use]
    pub fn new(handler: Arc<dyn Feature>) -> Self {
        Self {
            name: handler.name().to_string(),
            priority: handler.priority(),
            environments: handler
                .environments()
                .iter()
                .map(|e| (*e).to_string())
                .collect(),
            schema: handler.schema(),
            handler,
        }
    }

    /// Feature name (top-level document key).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execution priority.
    #[must_use]
    pub const fn priority(&self) -> u8 {
        self.priority
    }

    /// Supported environments; empty means all.
    #[must_use]
    pub const fn environments(&self) -> &BTreeSet<String> {
        &self.environments
    }

    /// Declared schema.
    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The handler.
    #[must_use]
    pub fn handler(&self) -> &dyn Feature {
        self.handler.as_ref()
    }

    /// Whether the feature runs in `environment`.
    #[must_use]
    pub fn supports(&self, environment: &Environment) -> bool {
        self.environments.is_empty() || self.environments.contains(environment.as_str())
    }

    fn handler_id(&self) -> TypeId {
        self.handler.feature_id()
    }

    fn same_as(&self, other: &Self) -> bool {
        self.name == other.name
            && self.priority == other.priority
            && self.environments == other.environments
            && self.schema == other.schema
            && self.handler_id() == other.handler_id()
    }
}

/// Saved registry contents, for tests that need to reset state.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot(Vec<FeatureDefinition>);

/// Ordered set of feature definitions, unique by name.
#[derive(Debug, Clone, Default)]
pub struct FeatureRegistry {
    definitions: Vec<FeatureDefinition>,
}

impl FeatureRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the shipped features.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if two shipped features conflict.
    pub fn with_builtin_features() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for feature in builtin_features() {
            registry.register(FeatureDefinition::new(Arc::from(feature)))?;
        }
        Ok(registry)
    }

    /// Add a definition.
    ///
    /// Registering an identical definition again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidPriority`] for priorities above 10 and
    /// [`RegistryError::Duplicate`] when a different definition already uses
    /// the name.
    pub fn register(&mut self, definition: FeatureDefinition) -> Result<(), RegistryError> {
        if definition.priority > MAX_PRIORITY {
            return Err(RegistryError::InvalidPriority {
                name: definition.name,
                priority: definition.priority,
            });
        }
        match self.lookup(&definition.name) {
            Some(existing) if existing.same_as(&definition) => Ok(()),
            Some(_) => Err(RegistryError::Duplicate(definition.name)),
            None => {
                self.definitions.push(definition);
                Ok(())
            }
        }
    }

    /// Convenience for registering a handler value.
    ///
    /// # Errors
    ///
    /// See [`FeatureRegistry::register`].
    pub fn register_feature(&mut self, feature: impl Feature) -> Result<(), RegistryError> {
        self.register(FeatureDefinition::new(Arc::new(feature)))
    }

    /// Definitions in registration order.
    #[must_use]
    pub fn all(&self) -> &[FeatureDefinition] {
        &self.definitions
    }

    /// Definition registered under `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&FeatureDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Capture the current contents.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot(self.definitions.clone())
    }

    /// Replace the contents with a previous snapshot.
    pub fn restore(&mut self, snapshot: RegistrySnapshot) {
        self.definitions = snapshot.0;
    }
}
