//! Subcommand implementations and the setup they share.
pub mod completions;
pub mod features;
pub mod run;
pub mod validate;
pub mod version;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::cli::GlobalOpts;
use crate::config::Document;
use crate::engine::Orchestrator;
use crate::logging::{Log, Logger};
use crate::repository::RepositoryContext;
use crate::services::{FileStore, RestGitHub, Services};
use crate::settings::Settings;

/// Shared state produced by the common command setup sequence.
///
/// Encapsulates settings loading, repository discovery and document loading
/// so that each command does not have to repeat the boilerplate.
#[derive(Debug)]
pub struct CommandSetup {
    /// Tool settings.
    pub settings: Settings,
    /// Repository being configured.
    pub repository: RepositoryContext,
    /// Its parsed configuration document.
    pub document: Document,
}

impl CommandSetup {
    /// Load settings, describe the repository and read its document.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file is malformed, the repository
    /// cannot be read from git, or the document cannot be loaded.
    pub fn init(global: &GlobalOpts, log: &Logger) -> Result<Self> {
        let settings = Settings::resolve(global.settings.as_deref())?;
        let organisation = global.org.as_deref().or(settings.organisation.as_deref());

        log.stage("Reading repository");
        let repository = RepositoryContext::from_git(&global.repo_dir(), organisation, None)?;
        log.info(&format!("repository: {}", repository.full_name()));
        log.debug(&format!("project: {}", repository.project));
        if let Some(branch) = &repository.branch {
            log.debug(&format!("branch: {branch}"));
        }
        if let Some(commit) = &repository.commit {
            log.debug(&format!("commit: {}", commit.id));
        }

        let path = document_path(global, &repository);
        log.stage("Loading configuration");
        let document = Orchestrator::load(&path)?;
        log.info(&format!(
            "loaded {} with {} section(s)",
            document.source_name(),
            document.keys().count()
        ));

        Ok(Self {
            settings,
            repository,
            document,
        })
    }

    /// Collaborators configured from the settings.
    #[must_use]
    pub fn services(&self, token: Option<String>) -> Services {
        let github = RestGitHub::new(&self.settings.github_api, token, self.settings.timeout());
        let store = FileStore::new(self.settings.state_dir());
        Services::new(Arc::new(github), Arc::new(store))
    }
}

/// `--file`, or `.asf.yaml` at the repository root.
fn document_path(global: &GlobalOpts, repository: &RepositoryContext) -> PathBuf {
    global
        .file
        .clone()
        .unwrap_or_else(|| repository.path.join(".asf.yaml"))
}

/// The logger as the trait object features receive.
fn shared_log(log: &Arc<Logger>) -> Arc<dyn Log> {
    Arc::clone(log) as Arc<dyn Log>
}
