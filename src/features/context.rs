//! Everything a feature sees while it runs.
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;

use crate::config::environment::Environment;
use crate::engine::{Outcome, ReportEntry};
use crate::logging::Log;
use crate::repository::RepositoryContext;
use crate::services::Services;

/// Per-feature execution context.
///
/// Cheap to clone: the repository and collaborators are shared.
#[derive(Clone)]
pub struct FeatureContext {
    /// Target repository.
    pub repository: Arc<RepositoryContext>,
    /// Environment the run resolved to.
    pub environment: Environment,
    /// Logger for progress and planned changes.
    pub log: Arc<dyn Log>,
    /// Collaborator services.
    pub services: Services,
    previous: Vec<(String, Outcome)>,
    journal: Arc<Mutex<Vec<String>>>,
}

impl fmt::Debug for FeatureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureContext")
            .field("repository", &self.repository.full_name())
            .field("environment", &self.environment)
            .field("previous", &self.previous)
            .field("recorded", &self.recorded())
            .finish_non_exhaustive()
    }
}

impl FeatureContext {
    /// Create a context with no recorded outcomes.
    #[must_use]
    pub fn new(
        repository: Arc<RepositoryContext>,
        environment: Environment,
        log: Arc<dyn Log>,
        services: Services,
    ) -> Self {
        Self {
            repository,
            environment,
            log,
            services,
            previous: Vec::new(),
            journal: Arc::default(),
        }
    }

    /// Return a copy that can see the outcomes recorded so far, with an empty
    /// change journal of its own.
    #[must_use]
    pub fn with_previous(&self, entries: &[ReportEntry]) -> Self {
        let mut ctx = self.clone();
        ctx.journal = Arc::default();
        ctx.previous = entries
            .iter()
            .map(|e| (e.feature.clone(), e.outcome.clone()))
            .collect();
        ctx
    }

    /// Outcome of a feature that already ran in this pass.
    #[must_use]
    pub fn outcome_of(&self, feature: &str) -> Option<&Outcome> {
        self.previous
            .iter()
            .find(|(name, _)| name == feature)
            .map(|(_, outcome)| outcome)
    }

    /// Changes applied (or planned, when restricted) through this context so
    /// far, including those of a feature that later failed.
    #[must_use]
    pub fn recorded(&self) -> Vec<String> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record<'a>(&self, changes: impl IntoIterator<Item = &'a String>) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(changes.into_iter().cloned());
    }

    /// Whether mutating collaborator calls are forbidden.
    #[must_use]
    pub fn is_restricted(&self) -> bool {
        self.environment.is_restricted()
    }

    /// Record `change` and perform `action` unless the run is restricted.
    ///
    /// In a restricted run the change is logged as planned and `action` is
    /// never called.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `action`.
    pub fn apply<F>(&self, changes: &mut Vec<String>, change: impl Into<String>, action: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let change = change.into();
        if self.is_restricted() {
            self.log.noop(&change);
        } else {
            action()?;
            self.log.info(&change);
        }
        self.record([&change]);
        changes.push(change);
        Ok(())
    }

    /// Perform one `action` covering several `changes`, unless the run is
    /// restricted. Returns the changes for the feature result.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `action`.
    pub fn apply_all<F>(&self, changes: Vec<String>, action: F) -> Result<Vec<String>>
    where
        F: FnOnce() -> Result<()>,
    {
        if changes.is_empty() {
            return Ok(changes);
        }
        if self.is_restricted() {
            for change in &changes {
                self.log.noop(change);
            }
        } else {
            action()?;
            for change in &changes {
                self.log.info(change);
            }
        }
        self.record(&changes);
        Ok(changes)
    }
}
