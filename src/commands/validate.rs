//! Command: check the document without running any feature.
use std::sync::Arc;

use anyhow::Result;

use super::{CommandSetup, shared_log};
use crate::cli::{GlobalOpts, SelectionOpts};
use crate::engine::{Orchestrator, Plan, RunError};
use crate::error::AsfYamlError;
use crate::features::FeatureRegistry;
use crate::logging::Logger;

/// Resolve, select and validate, then report.
///
/// # Errors
///
/// Returns an error if setup fails or the document does not validate.
pub fn run(global: &GlobalOpts, opts: &SelectionOpts, log: &Arc<Logger>) -> Result<()> {
    let base = opts.base_environment()?;
    let setup = CommandSetup::init(global, log)?;
    let orchestrator = Orchestrator::new(
        FeatureRegistry::with_builtin_features()?,
        setup.repository.clone(),
        setup.services(None),
        shared_log(log),
    )
    .with_filter(opts.filter());

    log.stage("Validating");
    match orchestrator.plan(&setup.document, &base) {
        Ok(plan) => {
            summarise(&plan, log);
            log.info(&format!("{} is valid", setup.document.source_name()));
            Ok(())
        }
        Err(RunError {
            source: AsfYamlError::Validation(errors),
            ..
        }) => {
            for error in &errors.errors {
                log.error(&error.to_string());
            }
            anyhow::bail!(
                "{} validation error(s) in {}",
                errors.len(),
                setup.document.source_name()
            );
        }
        Err(e) => Err(e.into()),
    }
}

fn summarise(plan: &Plan, log: &Logger) {
    log.info(&format!("environment: {}", plan.environment()));
    for feature in plan.selected() {
        log.info(&format!("{feature}: ok"));
    }
    for (feature, reason) in plan.skipped() {
        log.debug(&format!("{feature}: {reason}"));
    }
}
