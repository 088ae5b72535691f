//! Command: list the registered features.
use std::fmt::Write as _;

use anyhow::Result;

use crate::features::{FeatureDefinition, FeatureRegistry};

/// Print the feature table to stdout.
///
/// # Errors
///
/// Returns an error if the shipped features conflict.
pub fn run() -> Result<()> {
    let registry = FeatureRegistry::with_builtin_features()?;
    print!("{}", render_table(&registry));
    Ok(())
}

/// Features in schedule order with priority and environments.
#[must_use]
pub fn render_table(registry: &FeatureRegistry) -> String {
    let mut definitions: Vec<&FeatureDefinition> = registry.all().iter().collect();
    definitions.sort_by_key(|d| d.priority());

    let width = definitions
        .iter()
        .map(|d| d.name().len())
        .chain(["NAME".len()])
        .max()
        .unwrap_or_default()
        + 2;

    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}{:<10}ENVIRONMENTS", "NAME", "PRIORITY");
    for definition in definitions {
        let environments = if definition.environments().is_empty() {
            "all".to_string()
        } else {
            definition
                .environments()
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        };
        let _ = writeln!(
            out,
            "{:<width$}{:<10}{environments}",
            definition.name(),
            definition.priority()
        );
    }
    out
}
