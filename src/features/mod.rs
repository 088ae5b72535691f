//! Pluggable feature handlers driven by the orchestrator.
//!
//! Each top-level key of the configuration document addresses one feature.
//! A feature declares its schema, converts its validated subtree into a typed
//! [`FeatureConfig`] and synchronises one concern of the repository through
//! the collaborators in its [`FeatureContext`].
pub mod context;
pub mod github;
pub mod notifications;
pub mod registry;
pub mod website;

pub use context::FeatureContext;
pub use registry::{FeatureDefinition, FeatureRegistry, RegistrySnapshot};

use std::any::TypeId;

use anyhow::Result;
use serde_yaml::Value;

use crate::config::schema::Schema;

/// Priority used when a feature does not declare one.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Highest accepted priority; lower values run first.
pub const MAX_PRIORITY: u8 = 10;

/// A feature handler.
///
/// The `'static` bound gives every handler a stable [`TypeId`], which the
/// registry uses to tell an identical re-registration from a conflicting one.
pub trait Feature: Send + Sync + 'static {
    /// Top-level document key this feature handles.
    fn name(&self) -> &str;

    /// Execution priority in `0..=10`; lower runs first.
    fn priority(&self) -> u8 {
        DEFAULT_PRIORITY
    }

    /// Environments the feature runs in. Empty means every environment.
    fn environments(&self) -> &[&'static str] {
        &[]
    }

    /// Declarative schema of the feature's subtree.
    fn schema(&self) -> Schema;

    /// Convert a structurally valid subtree into typed configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the subtree passes the schema but violates a
    /// rule the schema cannot express.
    fn parse(&self, raw: &Value) -> Result<FeatureConfig>;

    /// Synchronise the repository with `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a collaborator call fails or the configuration
    /// cannot be applied to the repository as it is.
    fn run(&self, config: &FeatureConfig, ctx: &FeatureContext) -> Result<FeatureResult>;

    /// The concrete `TypeId` of this handler.
    fn feature_id(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

/// Validated, typed configuration of one feature.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureConfig {
    /// Mailing list routing.
    Notifications(notifications::NotificationsConfig),
    /// GitHub repository settings.
    Github(Box<github::GithubConfig>),
    /// Website staging.
    Staging(website::StagingConfig),
    /// Website publishing.
    Publish(website::PublishConfig),
    /// Features outside this crate keep their subtree as-is.
    Custom(Value),
}

/// What a feature did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureResult {
    /// The feature ran. Lists the changes applied, or in a restricted run the
    /// changes it would have applied. Empty when already in sync.
    Synced(Vec<String>),
    /// The feature chose not to act.
    Skipped(String),
}

impl FeatureResult {
    /// A run that found nothing to change.
    #[must_use]
    pub const fn unchanged() -> Self {
        Self::Synced(Vec::new())
    }
}

/// The features shipped with the crate, in discovery order.
#[must_use]
pub fn builtin_features() -> Vec<Box<dyn Feature>> {
    vec![
        Box::new(notifications::Notifications),
        Box::new(github::GitHub),
        Box::new(website::Staging),
        Box::new(website::Publish),
    ]
}
