//! Command: synchronise the repository with its document.
use std::sync::Arc;

use anyhow::Result;

use super::{CommandSetup, shared_log};
use crate::cli::{GlobalOpts, RunOpts};
use crate::engine::Orchestrator;
use crate::features::FeatureRegistry;
use crate::logging::Logger;

/// Run the full pass.
///
/// # Errors
///
/// Returns an error if setup fails, the run aborts before execution, or any
/// feature fails.
pub fn run(global: &GlobalOpts, opts: &RunOpts, log: &Arc<Logger>) -> Result<()> {
    log.info(&format!("asfyaml {}", super::version::version()));

    let base = opts.selection.base_environment()?;
    let setup = CommandSetup::init(global, log)?;
    let token = opts.token();
    if token.is_none() {
        log.debug("no GitHub token configured");
    }
    let services = setup.services(token);

    let orchestrator = Orchestrator::new(
        FeatureRegistry::with_builtin_features()?,
        setup.repository.with_private(opts.private),
        services,
        shared_log(log),
    )
    .with_filter(opts.selection.filter());

    log.stage("Planning");
    let plan = orchestrator.plan(&setup.document, &base)?;
    log.info(&format!("environment: {}", plan.environment()));
    log.info(&format!("features: {}", plan.selected().join(", ")));

    let report = orchestrator.execute(plan);
    log.print_report(&report);

    let failed = report.counts().failed;
    if failed > 0 {
        anyhow::bail!("{failed} feature(s) failed");
    }
    Ok(())
}
