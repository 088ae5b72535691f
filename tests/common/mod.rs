// Shared helpers for integration tests.
//
// Provides a temporary git checkout with an `.asf.yaml`, a fluent builder to
// customise it, and a GitHub stand-in that records every call so tests can
// drive the engine end to end without network access.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use asfyaml_cli::engine::Orchestrator;
use asfyaml_cli::error::ServiceError;
use asfyaml_cli::features::FeatureRegistry;
use asfyaml_cli::logging::{Log, MemoryLog};
use asfyaml_cli::repository::RepositoryContext;
use asfyaml_cli::services::github::{
    Branch, LiveProtection, PagesSite, ProtectionRequest, RepoSettings, RepoUpdate,
};
use asfyaml_cli::services::{FileStore, GitHubApi, Services};

/// Initialise a git repository at `root` on `branch` with one commit and an
/// `origin` remote pointing at `apache/<name>`.
pub fn init_git_repo(root: &Path, name: &str, branch: &str) {
    let repo = git2::Repository::init(root).expect("init repository");
    repo.set_head(&format!("refs/heads/{branch}"))
        .expect("set HEAD");
    repo.remote("origin", &format!("https://github.com/apache/{name}.git"))
        .expect("add origin");

    std::fs::write(root.join("README"), "test repository\n").expect("write README");
    let mut index = repo.index().expect("open index");
    index.add_path(Path::new("README")).expect("stage README");
    let tree_id = index.write_tree().expect("write tree");
    let tree = repo.find_tree(tree_id).expect("find tree");
    let sig = git2::Signature::now("Test Committer", "test@apache.org").expect("signature");
    repo.commit(Some("HEAD"), &sig, &sig, "Initial import", &tree, &[])
        .expect("commit");
}

/// An isolated checkout backed by a [`tempfile::TempDir`], plus a separate
/// state directory for the settings store.
pub struct IntegrationTestContext {
    /// Temporary directory containing the checkout.
    pub root: tempfile::TempDir,
    /// Temporary directory holding the settings store.
    pub state: tempfile::TempDir,
    /// Repository name.
    pub name: String,
}

impl IntegrationTestContext {
    /// Path to the checkout.
    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    /// Path to the configuration document.
    pub fn document_path(&self) -> PathBuf {
        self.root.path().join(".asf.yaml")
    }

    /// `apache/<name>`.
    pub fn full_name(&self) -> String {
        format!("apache/{}", self.name)
    }

    /// Repository context read from git.
    pub fn repository(&self) -> RepositoryContext {
        RepositoryContext::from_git(self.root.path(), None, None).expect("read repository")
    }

    /// Store rooted at the state directory.
    pub fn store(&self) -> FileStore {
        FileStore::new(self.state.path())
    }

    /// Stored JSON document for `key`, if any.
    pub fn stored(&self, key: &str) -> Option<serde_json::Value> {
        use asfyaml_cli::services::SettingsStore as _;
        self.store().load(&self.full_name(), key).expect("read store")
    }

    /// Write a settings file pointing the store at the state directory.
    pub fn write_settings(&self) -> PathBuf {
        let path = self.state.path().join("settings.toml");
        std::fs::write(
            &path,
            format!("state_dir = {:?}\ntimeout_secs = 5\n", self.state.path()),
        )
        .expect("write settings");
        path
    }

    /// Orchestrator over the shipped features, `github`, the file store and a
    /// captured log.
    pub fn orchestrator(&self, github: Arc<RecordingGitHub>) -> (Orchestrator, Arc<MemoryLog>) {
        let log = Arc::new(MemoryLog::new());
        let services = Services::new(github, Arc::new(self.store()));
        let orchestrator = Orchestrator::new(
            FeatureRegistry::with_builtin_features().expect("builtin features"),
            self.repository(),
            services,
            Arc::clone(&log) as Arc<dyn Log>,
        );
        (orchestrator, log)
    }
}

/// Fluent builder for [`IntegrationTestContext`].
pub struct TestContextBuilder {
    name: String,
    branch: String,
    document: Option<String>,
}

impl TestContextBuilder {
    /// Begin building a checkout of `apache/foo` on `main`.
    pub fn new() -> Self {
        Self {
            name: "foo".to_string(),
            branch: "main".to_string(),
            document: None,
        }
    }

    /// Use another repository name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Check out another branch.
    pub fn on_branch(mut self, branch: &str) -> Self {
        self.branch = branch.to_string();
        self
    }

    /// Write `content` to `.asf.yaml`.
    pub fn with_document(mut self, content: &str) -> Self {
        self.document = Some(content.to_string());
        self
    }

    /// Finish building and return the context.
    pub fn build(self) -> IntegrationTestContext {
        let root = tempfile::tempdir().expect("create checkout dir");
        let state = tempfile::tempdir().expect("create state dir");
        init_git_repo(root.path(), &self.name, &self.branch);
        if let Some(document) = &self.document {
            std::fs::write(root.path().join(".asf.yaml"), document).expect("write .asf.yaml");
        }
        IntegrationTestContext {
            root,
            state,
            name: self.name,
        }
    }
}

/// GitHub stand-in: answers reads from fixed state and records writes.
#[derive(Default)]
pub struct RecordingGitHub {
    /// Settings returned by [`GitHubApi::repository`].
    pub settings: RepoSettings,
    /// Branches returned by [`GitHubApi::branches`].
    pub branches: Vec<Branch>,
    /// Fail every write with HTTP 502.
    pub fail_writes: bool,
    /// Fail only writes of this method with HTTP 502.
    pub fail_method: Option<&'static str>,
    calls: Mutex<Vec<String>>,
}

impl RecordingGitHub {
    /// Stand-in for a public repository on `main` with every merge button on.
    pub fn new() -> Self {
        Self {
            settings: RepoSettings {
                default_branch: "main".to_string(),
                allow_squash_merge: true,
                allow_merge_commit: true,
                allow_rebase_merge: true,
                has_issues: true,
                ..RepoSettings::default()
            },
            branches: vec![Branch {
                name: "main".to_string(),
                protected: false,
            }],
            ..Self::default()
        }
    }

    /// Stand-in whose writes all fail.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::new()
        }
    }

    /// Stand-in whose `method` writes fail and whose other writes succeed.
    pub fn failing_on(method: &'static str) -> Self {
        Self {
            fail_method: Some(method),
            ..Self::new()
        }
    }

    /// Recorded write calls in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn write(&self, call: String) -> Result<(), ServiceError> {
        let method = call.split(' ').next().unwrap_or_default();
        if self.fail_writes || self.fail_method == Some(method) {
            return Err(ServiceError::Status {
                method: "PATCH",
                url: format!("https://api.github.test/{call}"),
                status: 502,
            });
        }
        self.calls.lock().expect("calls lock").push(call);
        Ok(())
    }
}

impl GitHubApi for RecordingGitHub {
    fn repository(&self, _repo: &str) -> Result<RepoSettings, ServiceError> {
        Ok(self.settings.clone())
    }

    fn update_repository(&self, repo: &str, _update: &RepoUpdate) -> Result<(), ServiceError> {
        self.write(format!("update_repository {repo}"))
    }

    fn set_topics(&self, repo: &str, topics: &[String]) -> Result<(), ServiceError> {
        self.write(format!("set_topics {repo} {}", topics.join(",")))
    }

    fn pages(&self, _repo: &str) -> Result<Option<PagesSite>, ServiceError> {
        Ok(None)
    }

    fn create_pages(&self, repo: &str, site: &PagesSite) -> Result<(), ServiceError> {
        self.write(format!("create_pages {repo} {}", site.build_type))
    }

    fn update_pages(&self, repo: &str, site: &PagesSite) -> Result<(), ServiceError> {
        self.write(format!("update_pages {repo} {}", site.build_type))
    }

    fn delete_pages(&self, repo: &str) -> Result<(), ServiceError> {
        self.write(format!("delete_pages {repo}"))
    }

    fn branches(&self, _repo: &str) -> Result<Vec<Branch>, ServiceError> {
        Ok(self.branches.clone())
    }

    fn branch_protection(
        &self,
        _repo: &str,
        _branch: &str,
    ) -> Result<Option<LiveProtection>, ServiceError> {
        Ok(None)
    }

    fn protect_branch(
        &self,
        repo: &str,
        branch: &str,
        _protection: &ProtectionRequest,
    ) -> Result<(), ServiceError> {
        self.write(format!("protect_branch {repo} {branch}"))
    }

    fn unprotect_branch(&self, repo: &str, branch: &str) -> Result<(), ServiceError> {
        self.write(format!("unprotect_branch {repo} {branch}"))
    }

    fn set_required_signatures(
        &self,
        repo: &str,
        branch: &str,
        enabled: bool,
    ) -> Result<(), ServiceError> {
        self.write(format!("set_required_signatures {repo} {branch} {enabled}"))
    }
}
