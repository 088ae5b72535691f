//! Loading of the `.asf.yaml` configuration document.
//!
//! The document is a mapping from feature name to an arbitrary subtree. The
//! `meta` key is reserved for engine directives (requested environment and
//! environment-scoped overrides) and is split off at parse time.
pub mod environment;
pub mod schema;
pub mod validation;

use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::error::DocumentError;
use environment::Environment;
use schema::{Field, Schema};

/// Conventional file name of the configuration document.
pub const DOCUMENT_NAME: &str = ".asf.yaml";

/// Reserved top-level key holding engine directives.
pub const META_KEY: &str = "meta";

/// A parsed configuration document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    source_name: String,
    sections: Mapping,
    meta: Meta,
}

/// Engine directives from the `meta` section.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Meta {
    /// Environment requested by the document, if any.
    pub environment: Option<String>,
    /// Feature overrides keyed by environment name, in document order.
    pub overrides: Vec<(String, Mapping)>,
}

fn meta_schema() -> Schema {
    Schema::map([
        Field::optional("environment", Schema::NonEmptyStr),
        Field::optional("overrides", Schema::map_of(Schema::map_of(Schema::Any))),
    ])
}

impl Document {
    /// Parse a document from YAML text.
    ///
    /// An empty document is an empty mapping.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Parse`] for malformed YAML,
    /// [`DocumentError::NotAMapping`] when the root is not a mapping with string
    /// keys, and [`DocumentError::Meta`] for a malformed `meta` section.
    pub fn parse(source: &str, source_name: &str) -> Result<Self, DocumentError> {
        let root: Value = serde_yaml::from_str(source).map_err(|e| DocumentError::Parse {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;

        let mapping = match root {
            Value::Null => Mapping::new(),
            Value::Mapping(m) => m,
            other => {
                return Err(DocumentError::NotAMapping {
                    source_name: source_name.to_string(),
                    found: schema::kind(&other).to_string(),
                });
            }
        };

        if let Some(key) = mapping.keys().find(|k| !k.is_string()) {
            return Err(DocumentError::NotAMapping {
                source_name: source_name.to_string(),
                found: format!("a mapping with {} keys", schema::kind(key)),
            });
        }

        let mut meta_raw = None;
        let mut sections = Mapping::new();
        for (key, value) in mapping {
            if key.as_str() == Some(META_KEY) {
                meta_raw = Some(value);
            } else {
                sections.insert(key, value);
            }
        }
        let meta = match meta_raw {
            Some(raw) => parse_meta(raw)?,
            None => Meta::default(),
        };

        Ok(Self {
            source_name: source_name.to_string(),
            sections,
            meta,
        })
    }

    /// Read and parse a document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Io`] if the file cannot be read, or any error
    /// from [`Document::parse`].
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let content = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self::parse(&content, &name)
    }

    /// File name or label the document was parsed from.
    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Top-level feature keys in document order (excluding `meta`).
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().filter_map(Value::as_str)
    }

    /// Raw subtree addressed to `name`.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    /// All feature sections.
    #[must_use]
    pub const fn sections(&self) -> &Mapping {
        &self.sections
    }

    /// Engine directives.
    #[must_use]
    pub const fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Overrides scoped to `environment`, if the document declares any.
    #[must_use]
    pub fn overrides_for(&self, environment: &str) -> Option<&Mapping> {
        self.meta
            .overrides
            .iter()
            .find(|(name, _)| name == environment)
            .map(|(_, overlay)| overlay)
    }
}

fn parse_meta(raw: Value) -> Result<Meta, DocumentError> {
    if let Some(first) = meta_schema().validate(&raw, META_KEY).into_iter().next() {
        return Err(DocumentError::Meta {
            path: first.path,
            message: first.message,
        });
    }

    let mut meta = Meta::default();
    let Value::Mapping(mut map) = raw else {
        return Ok(meta);
    };
    meta.environment = map
        .remove("environment")
        .and_then(|v| v.as_str().map(str::to_string));
    if let Some(Value::Mapping(overrides)) = map.remove("overrides") {
        for (env, overlay) in overrides {
            let Some(env) = env.as_str() else {
                continue;
            };
            let env = Environment::new(env).map_err(|e| DocumentError::Meta {
                path: format!("{META_KEY}.overrides.{env}"),
                message: e.to_string(),
            })?;
            let overlay = match overlay {
                Value::Mapping(m) => m,
                _ => Mapping::new(),
            };
            meta.overrides.push((env.as_str().to_string(), overlay));
        }
    }
    Ok(meta)
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_empty_mapping() {
        let doc = Document::parse("", DOCUMENT_NAME).unwrap();
        assert_eq!(doc.keys().count(), 0);
        assert_eq!(doc.meta(), &Meta::default());
    }

    #[test]
    fn keys_preserve_document_order() {
        let doc = Document::parse("publish: {}\ngithub: {}\nnotifications: {}", "x").unwrap();
        assert_eq!(
            doc.keys().collect::<Vec<_>>(),
            vec!["publish", "github", "notifications"]
        );
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = Document::parse("github:\n  description: [unclosed", ".asf.yaml").unwrap_err();
        assert!(matches!(err, DocumentError::Parse { .. }));
        assert!(err.to_string().starts_with("malformed document .asf.yaml"));
    }

    #[test]
    fn non_mapping_root_is_rejected() {
        let err = Document::parse("- github\n- publish", "x").unwrap_err();
        assert!(matches!(
            err,
            DocumentError::NotAMapping { ref found, .. } if found == "a list"
        ));
    }

    #[test]
    fn non_string_top_level_keys_are_rejected() {
        let err = Document::parse("1: a", "x").unwrap_err();
        assert!(matches!(err, DocumentError::NotAMapping { .. }));
    }

    #[test]
    fn meta_is_split_off() {
        let doc = Document::parse(
            "meta:\n  environment: testing\n  overrides:\n    testing:\n      github:\n        description: test copy\ngithub:\n  description: real\n",
            "x",
        )
        .unwrap();
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["github"]);
        assert_eq!(doc.meta().environment.as_deref(), Some("testing"));
        let overlay = doc.overrides_for("testing").unwrap();
        assert!(overlay.contains_key("github"));
        assert!(doc.overrides_for("production").is_none());
    }

    #[test]
    fn malformed_override_environment_is_rejected_with_path() {
        let err = Document::parse(
            "meta:\n  overrides:\n    Prod_Uppercase:\n      github: {}\n",
            "x",
        )
        .unwrap_err();
        match err {
            DocumentError::Meta { path, message } => {
                assert_eq!(path, "meta.overrides.Prod_Uppercase");
                assert!(message.contains("invalid environment name"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_meta_is_rejected_with_path() {
        let err = Document::parse("meta:\n  environment: [a]", "x").unwrap_err();
        match err {
            DocumentError::Meta { path, message } => {
                assert_eq!(path, "meta.environment");
                assert!(message.contains("expected a string"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_meta_key_is_rejected() {
        let err = Document::parse("meta:\n  flavour: x", "x").unwrap_err();
        assert!(matches!(err, DocumentError::Meta { ref path, .. } if path == "meta.flavour"));
    }

    #[test]
    fn load_reads_file_and_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DOCUMENT_NAME);
        std::fs::write(&path, "github:\n  description: hi\n").unwrap();
        let doc = Document::load(&path).unwrap();
        assert_eq!(doc.source_name(), DOCUMENT_NAME);
        assert!(doc.section("github").is_some());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Document::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
    }
}
