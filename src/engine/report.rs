//! Per-feature outcomes of a run.
use crate::config::environment::Environment;
use crate::error::FeatureExecutionError;

/// How one feature ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The feature ran to completion.
    Success,
    /// The feature did not run, or chose not to act.
    Skipped(String),
    /// The feature returned an error.
    Failed(FeatureExecutionError),
}

impl Outcome {
    /// Whether this is [`Outcome::Failed`].
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// One row of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    /// Feature name.
    pub feature: String,
    /// Priority the feature was scheduled with.
    pub priority: u8,
    /// How it ended.
    pub outcome: Outcome,
    /// Changes applied, or planned in a restricted run. For a failed feature,
    /// the changes that went through before the error.
    pub changes: Vec<String>,
}

/// Outcome tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    /// Features that ran to completion.
    pub success: usize,
    /// Features that were not executed.
    pub skipped: usize,
    /// Features whose run returned an error.
    pub failed: usize,
}

/// Result of a full pass, entries in schedule order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Environment the run resolved to.
    pub environment: Environment,
    /// One entry per registered feature.
    pub entries: Vec<ReportEntry>,
    /// Non-fatal problems found while planning.
    pub warnings: Vec<String>,
}

impl RunReport {
    /// Whether any feature failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(|e| e.outcome.is_failed())
    }

    /// Tally of outcomes.
    #[must_use]
    pub fn counts(&self) -> OutcomeCounts {
        self.entries
            .iter()
            .fold(OutcomeCounts::default(), |mut counts, entry| {
                match entry.outcome {
                    Outcome::Success => counts.success += 1,
                    Outcome::Skipped(_) => counts.skipped += 1,
                    Outcome::Failed(_) => counts.failed += 1,
                }
                counts
            })
    }

    /// Entry of `feature`.
    #[must_use]
    pub fn entry(&self, feature: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.feature == feature)
    }

    /// Errors of every failed feature, in schedule order.
    pub fn failures(&self) -> impl Iterator<Item = &FeatureExecutionError> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            Outcome::Failed(err) => Some(err),
            _ => None,
        })
    }
}
