//! Collaborator services the features talk to.
//!
//! The engine never calls these itself; each feature receives a cloned
//! [`Services`] bundle through its [`FeatureContext`](crate::features::FeatureContext).
pub mod github;
pub mod store;

use std::fmt;
use std::sync::Arc;

pub use github::{GitHubApi, RestGitHub};
pub use store::{FileStore, MemoryStore, SettingsStore};

/// Collaborators shared by every feature in a run.
#[derive(Clone)]
pub struct Services {
    /// GitHub REST API.
    pub github: Arc<dyn GitHubApi>,
    /// Per-repository settings persistence.
    pub store: Arc<dyn SettingsStore>,
}

impl Services {
    /// Bundle the given collaborators.
    #[must_use]
    pub fn new(github: Arc<dyn GitHubApi>, store: Arc<dyn SettingsStore>) -> Self {
        Self { github, store }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
