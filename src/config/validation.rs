//! Schema validation of feature sections and conversion to typed config.
use serde_yaml::{Mapping, Value};

use crate::error::{SchemaValidationError, ValidationErrors};
use crate::features::{FeatureConfig, FeatureDefinition};

/// Validate one feature's subtree and convert it to [`FeatureConfig`].
///
/// A `null` section of a mapping-shaped feature is read as an empty mapping.
/// Every structural violation is returned; typed conversion only runs on a
/// structurally valid subtree, and its failure is reported at the feature root.
///
/// # Errors
///
/// Returns every [`SchemaValidationError`] found in the subtree.
pub fn validate_feature(
    definition: &FeatureDefinition,
    raw: &Value,
) -> Result<FeatureConfig, Vec<SchemaValidationError>> {
    let name = definition.name();
    let schema = definition.schema();
    let normalized = match raw {
        Value::Null if schema.is_mapping() => Value::Mapping(Mapping::new()),
        other => other.clone(),
    };

    let violations = schema.validate(&normalized, name);
    if !violations.is_empty() {
        return Err(violations
            .into_iter()
            .map(|v| SchemaValidationError {
                feature: name.to_string(),
                path: v.path,
                message: v.message,
            })
            .collect());
    }

    definition.handler().parse(&normalized).map_err(|e| {
        vec![SchemaValidationError {
            feature: name.to_string(),
            path: name.to_string(),
            message: format!("{e:#}"),
        }]
    })
}

/// Validate every selected section, collecting all errors across features.
///
/// # Errors
///
/// Returns [`ValidationErrors`] holding the violations of every invalid
/// section, in input order.
pub fn validate_all<'a, I>(
    sections: I,
) -> Result<Vec<(&'a FeatureDefinition, FeatureConfig)>, ValidationErrors>
where
    I: IntoIterator<Item = (&'a FeatureDefinition, &'a Value)>,
{
    let mut validated = Vec::new();
    let mut errors = ValidationErrors::default();
    for (definition, raw) in sections {
        match validate_feature(definition, raw) {
            Ok(config) => validated.push((definition, config)),
            Err(mut found) => errors.errors.append(&mut found),
        }
    }
    if errors.is_empty() {
        Ok(validated)
    } else {
        Err(errors)
    }
}
