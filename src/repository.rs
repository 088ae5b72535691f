//! Immutable description of the repository a run targets.
use std::path::{Path, PathBuf};

use git2::Repository;

use crate::error::RepositoryError;

/// Organisation assumed when neither the invocation nor the remote names one.
pub const DEFAULT_ORGANISATION: &str = "apache";

/// Head commit metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Full object id.
    pub id: String,
    /// Author name.
    pub author: String,
    /// Author e-mail.
    pub email: String,
    /// First line of the message.
    pub subject: String,
}

/// The target repository, shared read-only by every feature in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryContext {
    /// Owning organisation on GitHub.
    pub organisation: String,
    /// Repository name without `.git`.
    pub name: String,
    /// Project the repository belongs to.
    pub project: String,
    /// Whether the project is an incubator podling.
    pub podling: bool,
    /// Whether the repository is private.
    pub private: bool,
    /// Local working tree.
    pub path: PathBuf,
    /// Checked-out branch, if HEAD is on a branch.
    pub branch: Option<String>,
    /// Default branch as advertised by `origin/HEAD`.
    pub default_branch: Option<String>,
    /// HEAD commit, if the repository has history.
    pub commit: Option<CommitInfo>,
}

impl RepositoryContext {
    /// Describe a repository from its organisation and name alone.
    ///
    /// A trailing `.git` is stripped; project and podling flag are derived
    /// from the name.
    #[must_use]
    pub fn new(organisation: &str, name: &str, path: impl Into<PathBuf>) -> Self {
        let name = name.strip_suffix(".git").unwrap_or(name).to_string();
        let (project, podling) = derive_project(&name);
        Self {
            organisation: organisation.to_string(),
            name,
            project,
            podling,
            private: false,
            path: path.into(),
            branch: None,
            default_branch: None,
            commit: None,
        }
    }

    /// Set the checked-out branch.
    #[must_use]
    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = Some(branch.to_string());
        self
    }

    /// Set the default branch.
    #[must_use]
    pub fn with_default_branch(mut self, branch: &str) -> Self {
        self.default_branch = Some(branch.to_string());
        self
    }

    /// Mark the repository private.
    #[must_use]
    pub const fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    /// Read metadata from the git repository at or above `path`.
    ///
    /// `organisation` and `name` override what the `origin` remote says.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] if no non-bare repository is found or its
    /// name cannot be determined.
    pub fn from_git(
        path: &Path,
        organisation: Option<&str>,
        name: Option<&str>,
    ) -> Result<Self, RepositoryError> {
        let repo = Repository::discover(path).map_err(|e| RepositoryError::Open {
            path: path.display().to_string(),
            message: e.message().to_string(),
        })?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| RepositoryError::Bare(path.display().to_string()))?;
        let workdir = dunce::canonicalize(workdir).unwrap_or_else(|_| workdir.to_path_buf());

        let remote = origin_slug(&repo);
        let name = name
            .map(str::to_string)
            .or_else(|| remote.as_ref().map(|(_, n)| n.clone()))
            .or_else(|| {
                workdir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .ok_or(RepositoryError::Unnamed { what: "name" })?;
        let organisation = organisation
            .map(str::to_string)
            .or_else(|| remote.map(|(o, _)| o))
            .unwrap_or_else(|| DEFAULT_ORGANISATION.to_string());

        let mut context = Self::new(&organisation, &name, workdir);
        context.branch = current_branch(&repo);
        context.default_branch = remote_default_branch(&repo);
        context.commit = head_commit(&repo);
        Ok(context)
    }

    /// `organisation/name`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.organisation, self.name)
    }

    /// Default branch, falling back to `main` when unknown.
    #[must_use]
    pub fn default_branch_or_main(&self) -> &str {
        self.default_branch.as_deref().unwrap_or("main")
    }
}

/// Project name and podling flag for a repository name.
///
/// `incubator-foo-site` belongs to podling `foo`; `foo-site` to project `foo`.
fn derive_project(name: &str) -> (String, bool) {
    let lower = name.to_lowercase();
    let mut parts = lower.split('-');
    let first = parts.next().unwrap_or_default();
    if first == "incubator"
        && let Some(podling) = parts.next().filter(|p| !p.is_empty())
    {
        return (podling.to_string(), true);
    }
    (first.to_string(), false)
}

/// `(owner, name)` parsed from the `origin` remote URL.
fn origin_slug(repo: &Repository) -> Option<(String, String)> {
    let remote = repo.find_remote("origin").ok()?;
    parse_remote_url(remote.url()?)
}

fn parse_remote_url(url: &str) -> Option<(String, String)> {
    let trimmed = url.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let mut parts = trimmed.rsplit(['/', ':']);
    let name = parts.next().filter(|s| !s.is_empty())?;
    let owner = parts.next().filter(|s| !s.is_empty())?;
    Some((owner.to_string(), name.to_string()))
}

/// Branch HEAD points at, including unborn branches.
fn current_branch(repo: &Repository) -> Option<String> {
    let head = repo.find_reference("HEAD").ok()?;
    let target = head.symbolic_target()?;
    target.strip_prefix("refs/heads/").map(str::to_string)
}

fn remote_default_branch(repo: &Repository) -> Option<String> {
    let reference = repo.find_reference("refs/remotes/origin/HEAD").ok()?;
    let target = reference.symbolic_target()?;
    target
        .strip_prefix("refs/remotes/origin/")
        .map(str::to_string)
}

fn head_commit(repo: &Repository) -> Option<CommitInfo> {
    let commit = repo.head().ok()?.peel_to_commit().ok()?;
    let author = commit.author();
    Some(CommitInfo {
        id: commit.id().to_string(),
        author: author.name().unwrap_or_default().to_string(),
        email: author.email().unwrap_or_default().to_string(),
        subject: commit.summary().unwrap_or_default().to_string(),
    })
}
