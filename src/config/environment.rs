//! Environment resolution: which execution mode a run uses and the merged
//! configuration view for it.
use std::fmt;

use serde_yaml::{Mapping, Value};

use super::Document;
use crate::error::EnvironmentError;

/// A named execution mode.
///
/// `noop` is the only restricted environment: features must not perform
/// mutating collaborator calls while it is active.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Environment(String);

impl Environment {
    /// Name of the environment that applies changes for real.
    pub const PRODUCTION: &'static str = "production";
    /// Name of the non-production environment used for trial runs.
    pub const TESTING: &'static str = "testing";
    /// Name of the restricted, non-mutating environment.
    pub const NOOP: &'static str = "noop";

    /// Validate and wrap an environment name.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::InvalidName`] unless the name matches
    /// `[a-z][a-z0-9_-]*`.
    pub fn new(name: &str) -> Result<Self, EnvironmentError> {
        let mut chars = name.chars();
        let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase())
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if valid {
            Ok(Self(name.to_string()))
        } else {
            Err(EnvironmentError::InvalidName(name.to_string()))
        }
    }

    /// The production environment.
    #[must_use]
    pub fn production() -> Self {
        Self(Self::PRODUCTION.to_string())
    }

    /// The restricted no-op environment.
    #[must_use]
    pub fn noop() -> Self {
        Self(Self::NOOP.to_string())
    }

    /// Environment selected by the invocation: `noop` when mutation is
    /// disabled, otherwise `production`.
    #[must_use]
    pub fn from_invocation(noop: bool) -> Self {
        if noop { Self::noop() } else { Self::production() }
    }

    /// Environment name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the production environment.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.0 == Self::PRODUCTION
    }

    /// Whether mutating calls are forbidden.
    #[must_use]
    pub fn is_restricted(&self) -> bool {
        self.0 == Self::NOOP
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve the run environment from the invocation and the document.
///
/// The document's `meta.environment` replaces `base` unless that would raise
/// the run's privilege: a restricted run may not become a mutating one, and
/// only a production invocation may resolve to `production`.
///
/// # Errors
///
/// Returns [`EnvironmentError::Escalation`] when the document requests a
/// higher-privilege environment than `base` grants, and
/// [`EnvironmentError::InvalidName`] for malformed names.
pub fn resolve(base: &Environment, document: &Document) -> Result<Environment, EnvironmentError> {
    let Some(requested) = document.meta().environment.as_deref() else {
        return Ok(base.clone());
    };
    let requested = Environment::new(requested)?;

    if (base.is_restricted() && !requested.is_restricted())
        || (requested.is_production() && !base.is_production())
    {
        return Err(EnvironmentError::Escalation {
            base: base.to_string(),
            requested: requested.to_string(),
        });
    }
    Ok(requested)
}

/// The feature sections as seen from `environment`: top-level sections with
/// that environment's overrides deep-merged on top.
#[must_use]
pub fn view_for(document: &Document, environment: &Environment) -> Mapping {
    let mut sections = document.sections().clone();
    if let Some(overlay) = document.overrides_for(environment.as_str()) {
        for (key, value) in overlay {
            match sections.get_mut(key) {
                Some(existing) => deep_merge(existing, value.clone()),
                None => {
                    sections.insert(key.clone(), value.clone());
                }
            }
        }
    }
    sections
}

/// Merge `overlay` into `base`: mappings merge key by key, anything else
/// replaces.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
