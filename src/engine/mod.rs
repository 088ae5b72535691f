//! Feature orchestration.
//!
//! A run moves through the stages of [`RunStage`]: the document is loaded,
//! the environment resolved, features selected and validated, then executed
//! in priority order and reported. [`Orchestrator::plan`] stops after
//! validation; [`Orchestrator::execute`] finishes a plan.
pub mod report;

pub use report::{Outcome, OutcomeCounts, ReportEntry, RunReport};

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_yaml::Value;
use thiserror::Error;

use crate::config::Document;
use crate::config::environment::{self, Environment};
use crate::config::validation::validate_all;
use crate::error::{AsfYamlError, FeatureExecutionError};
use crate::features::{
    FeatureConfig, FeatureContext, FeatureDefinition, FeatureRegistry, FeatureResult,
};
use crate::logging::Log;
use crate::repository::RepositoryContext;
use crate::services::Services;

/// Stages of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunStage {
    /// The document is parsed.
    Loaded,
    /// The run environment is fixed.
    EnvironmentResolved,
    /// Registered features are split into selected and skipped.
    FeaturesSelected,
    /// Every selected section passed its schema.
    Validated,
    /// Features are running in priority order.
    Executing,
    /// The report is complete.
    Reported,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loaded => "loading",
            Self::EnvironmentResolved => "resolving the environment",
            Self::FeaturesSelected => "selecting features",
            Self::Validated => "validating",
            Self::Executing => "executing",
            Self::Reported => "reporting",
        };
        f.write_str(name)
    }
}

/// A run aborted before any feature executed.
#[derive(Error, Debug)]
#[error("run aborted while {stage}: {source}")]
pub struct RunError {
    /// Stage that failed.
    pub stage: RunStage,
    /// What went wrong.
    pub source: AsfYamlError,
}

impl RunError {
    fn at(stage: RunStage, source: impl Into<AsfYamlError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

/// Reasons a registered feature is not executed.
pub mod skip {
    /// The document has no section for the feature.
    pub const NOT_CONFIGURED: &str = "not configured";
    /// The feature does not run in the resolved environment.
    pub const ENVIRONMENT_EXCLUDED: &str = "environment excluded";
    /// Left out by `--only` or `--skip`.
    pub const FILTERED: &str = "filtered out";
}

/// Name-based feature filter from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureFilter {
    /// Run only these features (empty means all).
    pub only: Vec<String>,
    /// Never run these features.
    pub skip: Vec<String>,
}

impl FeatureFilter {
    /// Whether `name` passes the filter.
    #[must_use]
    pub fn allows(&self, name: &str) -> bool {
        (self.only.is_empty() || self.only.iter().any(|o| o == name))
            && !self.skip.iter().any(|s| s == name)
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.only.iter().chain(&self.skip).map(String::as_str)
    }
}

#[derive(Debug)]
enum Step {
    Run(FeatureConfig),
    Skip(String),
}

#[derive(Debug)]
struct Scheduled {
    definition: FeatureDefinition,
    step: Step,
}

/// A validated run, ready to execute.
#[derive(Debug)]
pub struct Plan {
    environment: Environment,
    scheduled: Vec<Scheduled>,
    warnings: Vec<String>,
}

impl Plan {
    /// Environment the run resolved to.
    #[must_use]
    pub const fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Non-fatal problems found while planning.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Features that will execute, in schedule order.
    #[must_use]
    pub fn selected(&self) -> Vec<&str> {
        self.scheduled
            .iter()
            .filter(|s| matches!(s.step, Step::Run(_)))
            .map(|s| s.definition.name())
            .collect()
    }

    /// Features that will not execute, with the reason, in schedule order.
    #[must_use]
    pub fn skipped(&self) -> Vec<(&str, &str)> {
        self.scheduled
            .iter()
            .filter_map(|s| match &s.step {
                Step::Skip(reason) => Some((s.definition.name(), reason.as_str())),
                Step::Run(_) => None,
            })
            .collect()
    }

    /// Validated configuration of a selected feature.
    #[must_use]
    pub fn config(&self, feature: &str) -> Option<&FeatureConfig> {
        self.scheduled.iter().find_map(|s| match &s.step {
            Step::Run(config) if s.definition.name() == feature => Some(config),
            _ => None,
        })
    }
}

enum Selection<'a> {
    Configured(&'a Value),
    Skip(&'static str),
}

/// Drives a run over an injected registry and collaborators.
pub struct Orchestrator {
    registry: FeatureRegistry,
    repository: Arc<RepositoryContext>,
    services: Services,
    log: Arc<dyn Log>,
    filter: FeatureFilter,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("repository", &self.repository.full_name())
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator. The registry is read-only from here on.
    #[must_use]
    pub fn new(
        registry: FeatureRegistry,
        repository: RepositoryContext,
        services: Services,
        log: Arc<dyn Log>,
    ) -> Self {
        Self {
            registry,
            repository: Arc::new(repository),
            services,
            log,
            filter: FeatureFilter::default(),
        }
    }

    /// Restrict the run with `--only` / `--skip`.
    #[must_use]
    pub fn with_filter(mut self, filter: FeatureFilter) -> Self {
        self.filter = filter;
        self
    }

    /// The registry this orchestrator schedules from.
    #[must_use]
    pub const fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    /// Read and parse the configuration document.
    ///
    /// # Errors
    ///
    /// Returns a [`RunError`] at [`RunStage::Loaded`] if the file cannot be
    /// read or parsed.
    pub fn load(path: &Path) -> Result<Document, RunError> {
        Document::load(path).map_err(|e| RunError::at(RunStage::Loaded, e))
    }

    /// Resolve, select and validate without executing anything.
    ///
    /// # Errors
    ///
    /// Returns a [`RunError`] at [`RunStage::EnvironmentResolved`] on an
    /// environment escalation or bad name, and at [`RunStage::Validated`]
    /// with every schema error of every selected feature.
    pub fn plan(&self, document: &Document, base: &Environment) -> Result<Plan, RunError> {
        let environment = environment::resolve(base, document)
            .map_err(|e| RunError::at(RunStage::EnvironmentResolved, e))?;
        self.log.debug(&format!("environment: {environment}"));
        let view = environment::view_for(document, &environment);

        let mut warnings = Vec::new();
        for key in view.keys().filter_map(Value::as_str) {
            if self.registry.lookup(key).is_none() {
                warnings.push(format!(
                    "unknown feature '{key}' in {}; ignoring it",
                    document.source_name()
                ));
            }
        }
        for name in self.filter.names() {
            if self.registry.lookup(name).is_none() {
                warnings.push(format!("filter names unknown feature '{name}'"));
            }
        }
        for warning in &warnings {
            self.log.warn(warning);
        }

        let mut ordered: Vec<&FeatureDefinition> = self.registry.all().iter().collect();
        // Stable: equal priorities keep registration order.
        ordered.sort_by_key(|d| d.priority());

        let selection: Vec<(&FeatureDefinition, Selection<'_>)> = ordered
            .into_iter()
            .map(|definition| {
                let choice = match view.get(definition.name()) {
                    None => Selection::Skip(skip::NOT_CONFIGURED),
                    Some(_) if !definition.supports(&environment) => {
                        Selection::Skip(skip::ENVIRONMENT_EXCLUDED)
                    }
                    Some(_) if !self.filter.allows(definition.name()) => {
                        Selection::Skip(skip::FILTERED)
                    }
                    Some(raw) => Selection::Configured(raw),
                };
                (definition, choice)
            })
            .collect();
        self.log.debug(&format!(
            "selected {} of {} features",
            selection
                .iter()
                .filter(|(_, s)| matches!(s, Selection::Configured(_)))
                .count(),
            selection.len()
        ));

        let pending = selection.iter().filter_map(|(definition, choice)| match choice {
            Selection::Configured(raw) => Some((*definition, *raw)),
            Selection::Skip(_) => None,
        });
        let mut configs = validate_all(pending)
            .map_err(|e| RunError::at(RunStage::Validated, e))?
            .into_iter();

        let mut scheduled = Vec::with_capacity(selection.len());
        for (definition, choice) in selection {
            let step = match choice {
                Selection::Skip(reason) => Step::Skip(reason.to_string()),
                Selection::Configured(_) => match configs.next() {
                    Some((_, config)) => Step::Run(config),
                    None => continue,
                },
            };
            scheduled.push(Scheduled {
                definition: definition.clone(),
                step,
            });
        }

        Ok(Plan {
            environment,
            scheduled,
            warnings,
        })
    }

    /// Execute a plan, isolating feature failures.
    #[must_use]
    pub fn execute(&self, plan: Plan) -> RunReport {
        let Plan {
            environment,
            scheduled,
            warnings,
        } = plan;
        let base = FeatureContext::new(
            Arc::clone(&self.repository),
            environment.clone(),
            Arc::clone(&self.log),
            self.services.clone(),
        );

        let mut entries: Vec<ReportEntry> = Vec::with_capacity(scheduled.len());
        for Scheduled { definition, step } in scheduled {
            let name = definition.name().to_string();
            let (outcome, changes) = match step {
                Step::Skip(reason) => {
                    self.log.debug(&format!("{name}: skipped ({reason})"));
                    (Outcome::Skipped(reason), Vec::new())
                }
                Step::Run(config) => {
                    self.log.stage(&name);
                    let ctx = base.with_previous(&entries);
                    match definition.handler().run(&config, &ctx) {
                        Ok(FeatureResult::Synced(changes)) => (Outcome::Success, changes),
                        Ok(FeatureResult::Skipped(reason)) => {
                            self.log.info(&format!("skipped: {reason}"));
                            (Outcome::Skipped(reason), Vec::new())
                        }
                        Err(e) => {
                            let error = FeatureExecutionError {
                                feature: name.clone(),
                                repository: self.repository.full_name(),
                                environment: environment.to_string(),
                                message: format!("{e:#}"),
                            };
                            self.log.error(&error.to_string());
                            (Outcome::Failed(error), ctx.recorded())
                        }
                    }
                }
            };
            entries.push(ReportEntry {
                feature: name,
                priority: definition.priority(),
                outcome,
                changes,
            });
        }

        RunReport {
            environment,
            entries,
            warnings,
        }
    }

    /// Plan and execute in one go.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::plan`]. Feature failures do not abort the run;
    /// they are recorded in the report.
    pub fn run(&self, document: &Document, base: &Environment) -> Result<RunReport, RunError> {
        let plan = self.plan(document, base)?;
        Ok(self.execute(plan))
    }
}
