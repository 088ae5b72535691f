//! GitHub REST API client.
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Default API root.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const PAGE_SIZE: usize = 100;

/// Repository settings as reported by `GET /repos/{owner}/{repo}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RepoSettings {
    /// Short description.
    pub description: Option<String>,
    /// Website URL.
    pub homepage: Option<String>,
    /// Issue tracker enabled.
    pub has_issues: bool,
    /// Wiki enabled.
    pub has_wiki: bool,
    /// Projects enabled.
    pub has_projects: bool,
    /// Discussions enabled.
    pub has_discussions: bool,
    /// Squash merging allowed.
    pub allow_squash_merge: bool,
    /// Merge commits allowed.
    pub allow_merge_commit: bool,
    /// Rebase merging allowed.
    pub allow_rebase_merge: bool,
    /// Default branch name.
    pub default_branch: String,
    /// Repository topics.
    pub topics: Vec<String>,
}

/// Partial update for `PATCH /repos/{owner}/{repo}`. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepoUpdate {
    /// Repository description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Home page URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    /// Issue tracker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_issues: Option<bool>,
    /// Wiki.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_wiki: Option<bool>,
    /// Project boards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_projects: Option<bool>,
    /// Discussions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_discussions: Option<bool>,
    /// Squash merging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_squash_merge: Option<bool>,
    /// Merge commits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_merge_commit: Option<bool>,
    /// Rebase merging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_rebase_merge: Option<bool>,
}

impl RepoUpdate {
    /// Whether the update would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// GitHub Pages publishing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagesSite {
    /// `legacy` (branch based) or `workflow` (Actions based).
    pub build_type: String,
    /// Source branch and path for legacy builds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PagesSource>,
}

/// Branch and directory a legacy Pages site is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagesSource {
    /// Source branch.
    pub branch: String,
    /// `/` or `/docs`.
    pub path: String,
}

/// A branch and whether a protection rule currently applies to it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Branch {
    /// Branch name.
    pub name: String,
    /// Whether the branch is protected.
    #[serde(default)]
    pub protected: bool,
}

/// Body of `PUT /repos/{owner}/{repo}/branches/{branch}/protection`.
///
/// The four nullable keys are mandatory in the API and serialise as `null`
/// when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProtectionRequest {
    /// Required checks, `null` for none.
    pub required_status_checks: Option<StatusChecksRequest>,
    /// Apply the rules to administrators too.
    pub enforce_admins: Option<bool>,
    /// Review requirements, `null` for none.
    pub required_pull_request_reviews: Option<ReviewsRequest>,
    /// Push restrictions, always `null`.
    pub restrictions: Option<serde_json::Value>,
    /// Forbid merge commits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_linear_history: Option<bool>,
    /// Allow force pushes.
    pub allow_force_pushes: bool,
    /// Require resolved review threads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_conversation_resolution: Option<bool>,
}

/// Required status checks for a protected branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusChecksRequest {
    /// Branch must be up to date before merging.
    pub strict: bool,
    /// Checks that must pass.
    pub checks: Vec<StatusCheck>,
}

/// One required check. `app_id` of `-1` accepts any source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCheck {
    /// Check name.
    pub context: String,
    /// GitHub App that must report it.
    pub app_id: i64,
}

/// Required pull request reviews for a protected branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewsRequest {
    /// Approvals needed.
    pub required_approving_review_count: u8,
    /// Dismiss approvals on new commits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dismiss_stale_reviews: Option<bool>,
    /// Require a code owner approval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_code_owner_reviews: Option<bool>,
    /// The last push must be approved by someone else.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_last_push_approval: Option<bool>,
}

/// `{"enabled": bool}` wrapper used throughout the protection API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Toggle {
    /// Whether the setting is on.
    #[serde(default)]
    pub enabled: bool,
}

/// Protection currently in force on a branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LiveProtection {
    /// Signed commits.
    pub required_signatures: Toggle,
    /// Linear history.
    pub required_linear_history: Toggle,
    /// Force pushes.
    pub allow_force_pushes: Toggle,
    /// Resolved review threads.
    pub required_conversation_resolution: Toggle,
    /// Review requirements, if any.
    pub required_pull_request_reviews: Option<LiveReviews>,
    /// Required checks, if any.
    pub required_status_checks: Option<LiveStatusChecks>,
}

/// Live pull request review requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LiveReviews {
    /// Approvals needed.
    pub required_approving_review_count: u8,
    /// Stale approvals are dismissed.
    pub dismiss_stale_reviews: bool,
    /// A code owner must approve.
    pub require_code_owner_reviews: bool,
    /// The last push must be approved by someone else.
    pub require_last_push_approval: bool,
}

/// Live status check requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LiveStatusChecks {
    /// Branch must be up to date.
    pub strict: bool,
    /// Checks that must pass.
    pub checks: Vec<LiveCheck>,
}

/// A required check as reported by GitHub; `app_id` is `null` for "any source".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LiveCheck {
    /// Check name.
    pub context: String,
    /// Reporting GitHub App.
    #[serde(default)]
    pub app_id: Option<i64>,
}

/// Operations the built-in features need from GitHub.
///
/// `repo` is always the full `owner/name` of the repository.
#[cfg_attr(test, mockall::automock)]
pub trait GitHubApi: Send + Sync {
    /// Read repository settings.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the request fails.
    fn repository(&self, repo: &str) -> Result<RepoSettings, ServiceError>;

    /// Apply a partial settings update.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the request fails.
    fn update_repository(&self, repo: &str, update: &RepoUpdate) -> Result<(), ServiceError>;

    /// Replace the repository topics.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the request fails.
    fn set_topics(&self, repo: &str, topics: &[String]) -> Result<(), ServiceError>;

    /// Current Pages configuration, `None` when Pages is not enabled.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the request fails.
    fn pages(&self, repo: &str) -> Result<Option<PagesSite>, ServiceError>;

    /// Enable Pages.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the request fails.
    fn create_pages(&self, repo: &str, site: &PagesSite) -> Result<(), ServiceError>;

    /// Change an existing Pages configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the request fails.
    fn update_pages(&self, repo: &str, site: &PagesSite) -> Result<(), ServiceError>;

    /// Disable Pages. Succeeds when Pages is already disabled.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the request fails.
    fn delete_pages(&self, repo: &str) -> Result<(), ServiceError>;

    /// Every branch of the repository, following pagination.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if any page cannot be fetched.
    fn branches(&self, repo: &str) -> Result<Vec<Branch>, ServiceError>;

    /// Protection in force on `branch`, `None` when unprotected.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the request fails.
    fn branch_protection(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<Option<LiveProtection>, ServiceError>;

    /// Replace the protection of `branch`.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the request fails.
    fn protect_branch(
        &self,
        repo: &str,
        branch: &str,
        protection: &ProtectionRequest,
    ) -> Result<(), ServiceError>;

    /// Remove all protection from `branch`.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the request fails.
    fn unprotect_branch(&self, repo: &str, branch: &str) -> Result<(), ServiceError>;

    /// Turn signed-commit enforcement on or off for a protected branch.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the request fails.
    fn set_required_signatures(
        &self,
        repo: &str,
        branch: &str,
        enabled: bool,
    ) -> Result<(), ServiceError>;
}

/// [`GitHubApi`] over HTTPS with `ureq`.
///
/// Reads work without a token (public repositories only); every mutating call
/// requires one and fails with [`ServiceError::MissingToken`] otherwise.
#[derive(Debug)]
pub struct RestGitHub {
    agent: ureq::Agent,
    api_base: String,
    token: Option<String>,
}

impl RestGitHub {
    /// Create a client for `api_base` with a global per-request timeout.
    #[must_use]
    pub fn new(api_base: &str, token: Option<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    fn token(&self) -> Result<&str, ServiceError> {
        self.token.as_deref().ok_or(ServiceError::MissingToken)
    }

    fn decorate<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let request = request
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header(
                "User-Agent",
                concat!("asfyaml/", env!("CARGO_PKG_VERSION")),
            );
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    /// Issue a request and return `(status, body)`.
    fn send(
        &self,
        method: &'static str,
        path: &str,
        body: Option<String>,
    ) -> Result<(u16, String), ServiceError> {
        let url = self.url(path);
        if method != "GET" {
            self.token()?;
        }
        let transport = |e: ureq::Error| ServiceError::Transport {
            method,
            url: url.clone(),
            message: e.to_string(),
        };

        let response = match method {
            "GET" => self.decorate(self.agent.get(&url)).call(),
            "DELETE" => self.decorate(self.agent.delete(&url)).call(),
            _ => {
                let request = match method {
                    "POST" => self.agent.post(&url),
                    "PUT" => self.agent.put(&url),
                    _ => self.agent.patch(&url),
                };
                let request = self
                    .decorate(request)
                    .header("Content-Type", "application/json");
                match body {
                    Some(body) => request.send(body),
                    None => request.send_empty(),
                }
            }
        };
        let mut response = response.map_err(transport)?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ServiceError::Transport {
                method,
                url: url.clone(),
                message: e.to_string(),
            })?;
        Ok((status, text))
    }

    /// Issue a request and fail unless the status is one of `accepted`.
    fn expect(
        &self,
        method: &'static str,
        path: &str,
        body: Option<String>,
        accepted: &[u16],
    ) -> Result<(u16, String), ServiceError> {
        let (status, text) = self.send(method, path, body)?;
        if accepted.contains(&status) {
            Ok((status, text))
        } else {
            Err(ServiceError::Status {
                method,
                url: self.url(path),
                status,
            })
        }
    }

    fn decode<T: DeserializeOwned>(
        &self,
        method: &'static str,
        path: &str,
        text: &str,
    ) -> Result<T, ServiceError> {
        serde_json::from_str(text).map_err(|e| ServiceError::Transport {
            method,
            url: self.url(path),
            message: format!("invalid response body: {e}"),
        })
    }

    fn encode<T: Serialize>(
        &self,
        method: &'static str,
        path: &str,
        value: &T,
    ) -> Result<String, ServiceError> {
        serde_json::to_string(value).map_err(|e| ServiceError::Transport {
            method,
            url: self.url(path),
            message: format!("cannot encode request body: {e}"),
        })
    }
}

impl GitHubApi for RestGitHub {
    fn repository(&self, repo: &str) -> Result<RepoSettings, ServiceError> {
        let path = format!("/repos/{repo}");
        let (_, text) = self.expect("GET", &path, None, &[200])?;
        self.decode("GET", &path, &text)
    }

    fn update_repository(&self, repo: &str, update: &RepoUpdate) -> Result<(), ServiceError> {
        let path = format!("/repos/{repo}");
        let body = self.encode("PATCH", &path, update)?;
        self.expect("PATCH", &path, Some(body), &[200]).map(|_| ())
    }

    fn set_topics(&self, repo: &str, topics: &[String]) -> Result<(), ServiceError> {
        let path = format!("/repos/{repo}/topics");
        let body = self.encode("PUT", &path, &serde_json::json!({ "names": topics }))?;
        self.expect("PUT", &path, Some(body), &[200]).map(|_| ())
    }

    fn pages(&self, repo: &str) -> Result<Option<PagesSite>, ServiceError> {
        let path = format!("/repos/{repo}/pages");
        let (status, text) = self.expect("GET", &path, None, &[200, 404])?;
        if status == 404 {
            return Ok(None);
        }
        self.decode("GET", &path, &text).map(Some)
    }

    fn create_pages(&self, repo: &str, site: &PagesSite) -> Result<(), ServiceError> {
        let path = format!("/repos/{repo}/pages");
        let body = self.encode("POST", &path, site)?;
        self.expect("POST", &path, Some(body), &[201]).map(|_| ())
    }

    fn update_pages(&self, repo: &str, site: &PagesSite) -> Result<(), ServiceError> {
        let path = format!("/repos/{repo}/pages");
        let body = self.encode("PUT", &path, site)?;
        self.expect("PUT", &path, Some(body), &[204]).map(|_| ())
    }

    fn delete_pages(&self, repo: &str) -> Result<(), ServiceError> {
        let path = format!("/repos/{repo}/pages");
        self.expect("DELETE", &path, None, &[204, 404]).map(|_| ())
    }

    fn branches(&self, repo: &str) -> Result<Vec<Branch>, ServiceError> {
        let mut all = Vec::new();
        for page in 1.. {
            let path = format!("/repos/{repo}/branches?per_page={PAGE_SIZE}&page={page}");
            let (_, text) = self.expect("GET", &path, None, &[200])?;
            let batch: Vec<Branch> = self.decode("GET", &path, &text)?;
            let last = batch.len() < PAGE_SIZE;
            all.extend(batch);
            if last {
                break;
            }
        }
        Ok(all)
    }

    fn branch_protection(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<Option<LiveProtection>, ServiceError> {
        let path = format!("/repos/{repo}/branches/{branch}/protection");
        let (status, text) = self.expect("GET", &path, None, &[200, 404])?;
        if status == 404 {
            return Ok(None);
        }
        self.decode("GET", &path, &text).map(Some)
    }

    fn protect_branch(
        &self,
        repo: &str,
        branch: &str,
        protection: &ProtectionRequest,
    ) -> Result<(), ServiceError> {
        let path = format!("/repos/{repo}/branches/{branch}/protection");
        let body = self.encode("PUT", &path, protection)?;
        self.expect("PUT", &path, Some(body), &[200]).map(|_| ())
    }

    fn unprotect_branch(&self, repo: &str, branch: &str) -> Result<(), ServiceError> {
        let path = format!("/repos/{repo}/branches/{branch}/protection");
        self.expect("DELETE", &path, None, &[204, 404]).map(|_| ())
    }

    fn set_required_signatures(
        &self,
        repo: &str,
        branch: &str,
        enabled: bool,
    ) -> Result<(), ServiceError> {
        let path = format!("/repos/{repo}/branches/{branch}/protection/required_signatures");
        if enabled {
            self.expect("POST", &path, None, &[200]).map(|_| ())
        } else {
            self.expect("DELETE", &path, None, &[204]).map(|_| ())
        }
    }
}
