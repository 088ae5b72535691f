//! Domain-specific error types for the asfyaml engine.
//!
//! This module provides a structured error hierarchy using [`thiserror`].
//! Library modules return typed errors (e.g., [`DocumentError`],
//! [`ValidationErrors`]) while command handlers at the CLI boundary convert
//! them to [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! AsfYamlError
//! ├── Document(DocumentError)         - malformed .asf.yaml
//! ├── Environment(EnvironmentError)   - escalation, bad environment names
//! ├── Repository(RepositoryError)     - git metadata unavailable
//! ├── Registry(RegistryError)         - duplicate or invalid feature definitions
//! ├── Validation(ValidationErrors)    - every schema violation of a run
//! ├── Feature(FeatureExecutionError)  - a feature failed while running
//! └── Service(ServiceError)           - collaborator (GitHub, state store) failures
//! ```

use std::fmt;

use thiserror::Error;

/// Top-level error type for the asfyaml engine.
#[derive(Error, Debug)]
pub enum AsfYamlError {
    /// The configuration document could not be parsed.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// The requested environment could not be granted.
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// The target repository could not be described.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A feature definition could not be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// One or more feature sections failed schema validation.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// A feature failed while executing.
    #[error(transparent)]
    Feature(#[from] FeatureExecutionError),

    /// A collaborator service call failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Errors raised while loading the configuration document.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The document is not syntactically valid YAML.
    #[error("malformed document {source_name}: {message}")]
    Parse {
        /// File name or label of the document.
        source_name: String,
        /// Parser message, including line and column when available.
        message: String,
    },

    /// The document parsed, but its root is not a mapping of feature names.
    #[error("document {source_name} must be a mapping of feature names, found {found}")]
    NotAMapping {
        /// File name or label of the document.
        source_name: String,
        /// Kind of YAML node found at the root.
        found: String,
    },

    /// The reserved `meta` section is malformed.
    #[error("invalid meta section at {path}: {message}")]
    Meta {
        /// Dotted path to the offending key.
        path: String,
        /// Human-readable description.
        message: String,
    },

    /// The document could not be read from disk.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path of the document.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors raised while resolving the run environment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    /// The document asked for more privilege than the invocation grants.
    #[error(
        "environment escalation refused: invocation runs as '{base}' but the document requests '{requested}'"
    )]
    Escalation {
        /// Environment granted by the invocation.
        base: String,
        /// Environment requested by the document.
        requested: String,
    },

    /// The environment identifier is not well-formed.
    #[error("invalid environment name '{0}': expected lowercase letters, digits, '-' or '_'")]
    InvalidName(String),
}

/// Errors raised while reading repository metadata from git.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// No git repository was found at or above the path.
    #[error("no git repository at {path}: {message}")]
    Open {
        /// Path that was searched.
        path: String,
        /// Message from git.
        message: String,
    },

    /// The repository is bare, so there is no working tree to read.
    #[error("repository at {0} has no working tree")]
    Bare(String),

    /// The organisation or name could not be determined.
    #[error("cannot determine repository {what}; pass it explicitly")]
    Unnamed {
        /// Which part is missing (`name` or `organisation`).
        what: &'static str,
    },
}

/// Errors raised while registering feature definitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A different definition already uses this name.
    #[error("feature '{0}' is already registered with a different definition")]
    Duplicate(String),

    /// The declared priority is outside `0..=10`.
    #[error("feature '{name}' declares priority {priority}, expected 0..=10")]
    InvalidPriority {
        /// Feature name.
        name: String,
        /// Offending priority.
        priority: u8,
    },
}

/// A single schema violation inside one feature's configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{feature}: {path}: {message}")]
pub struct SchemaValidationError {
    /// Feature whose section is invalid.
    pub feature: String,
    /// Dotted key path, rooted at the feature name.
    pub path: String,
    /// Human-readable description of the problem.
    pub message: String,
}

/// Every schema violation found in a document.
///
/// Validation never stops at the first problem: all features are checked
/// and the complete list is surfaced at once.
#[derive(Error, Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors {
    /// Violations in document order.
    pub errors: Vec<SchemaValidationError>,
}

impl ValidationErrors {
    /// Number of violations.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.errors.len()
    }

    /// `true` when no violation was recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Names of the features with at least one violation, deduplicated.
    #[must_use]
    pub fn features(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.errors.iter().map(|e| e.feature.as_str()).collect();
        names.dedup();
        names
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} configuration error(s) in {} feature(s)",
            self.errors.len(),
            self.features().len()
        )?;
        for error in &self.errors {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

/// A feature failed while executing.
///
/// Carries enough context to attribute the failure without a backtrace.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("feature '{feature}' failed on {repository} ({environment}): {message}")]
pub struct FeatureExecutionError {
    /// Name of the failed feature.
    pub feature: String,
    /// Full repository name (`org/name`).
    pub repository: String,
    /// Environment the run resolved to.
    pub environment: String,
    /// Error chain rendered as text.
    pub message: String,
}

/// Errors raised by collaborator services.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The remote API answered with an unexpected status code.
    #[error("{method} {url} returned HTTP {status}")]
    Status {
        /// HTTP method.
        method: &'static str,
        /// Request URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// The request could not be sent or the response could not be read.
    #[error("{method} {url} failed: {message}")]
    Transport {
        /// HTTP method.
        method: &'static str,
        /// Request URL.
        url: String,
        /// Transport-level failure.
        message: String,
    },

    /// No API token was supplied for a call that needs one.
    #[error("no GitHub token configured; pass --token or set ASFYAML_TOKEN")]
    MissingToken,

    /// The state store could not be read or written.
    #[error("state store error at {path}: {message}")]
    Store {
        /// Path of the state file.
        path: String,
        /// Human-readable failure.
        message: String,
    },
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::io;

    fn violation(feature: &str, path: &str) -> SchemaValidationError {
        SchemaValidationError {
            feature: feature.to_string(),
            path: path.to_string(),
            message: "expected a string".to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // DocumentError
    // -----------------------------------------------------------------------

    #[test]
    fn document_parse_display() {
        let e = DocumentError::Parse {
            source_name: ".asf.yaml".to_string(),
            message: "did not find expected key at line 3 column 1".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "malformed document .asf.yaml: did not find expected key at line 3 column 1"
        );
    }

    #[test]
    fn document_not_a_mapping_display() {
        let e = DocumentError::NotAMapping {
            source_name: ".asf.yaml".to_string(),
            found: "a sequence".to_string(),
        };
        assert!(e.to_string().contains("found a sequence"));
    }

    #[test]
    fn document_io_has_source() {
        use std::error::Error as StdError;
        let e = DocumentError::Io {
            path: "/repo/.asf.yaml".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert!(e.source().is_some());
        assert!(e.to_string().contains("/repo/.asf.yaml"));
    }

    // -----------------------------------------------------------------------
    // EnvironmentError
    // -----------------------------------------------------------------------

    #[test]
    fn escalation_display_names_both_environments() {
        let e = EnvironmentError::Escalation {
            base: "noop".to_string(),
            requested: "production".to_string(),
        };
        let text = e.to_string();
        assert!(text.contains("'noop'"));
        assert!(text.contains("'production'"));
    }

    // -----------------------------------------------------------------------
    // RegistryError
    // -----------------------------------------------------------------------

    #[test]
    fn duplicate_feature_display() {
        let e = RegistryError::Duplicate("github".to_string());
        assert_eq!(
            e.to_string(),
            "feature 'github' is already registered with a different definition"
        );
    }

    #[test]
    fn invalid_priority_display() {
        let e = RegistryError::InvalidPriority {
            name: "late".to_string(),
            priority: 11,
        };
        assert_eq!(
            e.to_string(),
            "feature 'late' declares priority 11, expected 0..=10"
        );
    }

    // -----------------------------------------------------------------------
    // ValidationErrors
    // -----------------------------------------------------------------------

    #[test]
    fn validation_errors_lists_every_violation() {
        let errors = ValidationErrors {
            errors: vec![
                violation("github", "github.description"),
                violation("github", "github.homepage"),
                violation("publish", "publish.whoami"),
            ],
        };
        let text = errors.to_string();
        assert!(text.starts_with("3 configuration error(s) in 2 feature(s)"));
        assert!(text.contains("github: github.homepage: expected a string"));
        assert!(text.contains("publish: publish.whoami"));
    }

    #[test]
    fn validation_errors_features_deduplicates_adjacent() {
        let errors = ValidationErrors {
            errors: vec![violation("a", "a.x"), violation("a", "a.y"), violation("b", "b")],
        };
        assert_eq!(errors.features(), vec!["a", "b"]);
        assert_eq!(errors.len(), 3);
        assert!(!errors.is_empty());
    }

    // -----------------------------------------------------------------------
    // FeatureExecutionError
    // -----------------------------------------------------------------------

    #[test]
    fn feature_execution_error_is_attributed() {
        let e = FeatureExecutionError {
            feature: "github".to_string(),
            repository: "apache/foo".to_string(),
            environment: "production".to_string(),
            message: "PATCH failed".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "feature 'github' failed on apache/foo (production): PATCH failed"
        );
    }

    // -----------------------------------------------------------------------
    // ServiceError
    // -----------------------------------------------------------------------

    #[test]
    fn service_status_display() {
        let e = ServiceError::Status {
            method: "GET",
            url: "https://api.github.com/repos/apache/foo".to_string(),
            status: 502,
        };
        assert_eq!(
            e.to_string(),
            "GET https://api.github.com/repos/apache/foo returned HTTP 502"
        );
    }

    // -----------------------------------------------------------------------
    // Conversions
    // -----------------------------------------------------------------------

    #[test]
    fn asfyaml_error_is_transparent() {
        let e: AsfYamlError = RegistryError::Duplicate("x".to_string()).into();
        assert_eq!(
            e.to_string(),
            "feature 'x' is already registered with a different definition"
        );
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn all_error_types_are_send_sync() {
        assert_send_sync::<AsfYamlError>();
        assert_send_sync::<DocumentError>();
        assert_send_sync::<EnvironmentError>();
        assert_send_sync::<RepositoryError>();
        assert_send_sync::<RegistryError>();
        assert_send_sync::<ValidationErrors>();
        assert_send_sync::<FeatureExecutionError>();
        assert_send_sync::<ServiceError>();
    }

    #[test]
    fn errors_convert_to_anyhow() {
        let _a: anyhow::Error = ValidationErrors::default().into();
        let _b: anyhow::Error = EnvironmentError::InvalidName("X".to_string()).into();
        let _c: anyhow::Error = ServiceError::MissingToken.into();
    }
}
