//! GitHub Pages publishing (`ghp_type`, `ghp_branch`, `ghp_path`).
use anyhow::{Result, bail};
use serde_yaml::Value;

use crate::features::FeatureContext;
use crate::services::github::{PagesSite, PagesSource};

/// Branch that may always serve a legacy site.
pub const PAGES_BRANCH: &str = "gh-pages";

/// Directory used when `ghp_path` is omitted.
pub const DEFAULT_PATH: &str = "/docs";

/// Desired Pages state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagesConfig {
    /// Built by GitHub from a branch and directory.
    Legacy {
        /// Source branch.
        branch: String,
        /// Source directory within the branch.
        path: String,
    },
    /// Built by a GitHub Actions workflow.
    Workflow,
    /// Pages turned off.
    Disabled,
}

impl PagesConfig {
    /// Read the Pages keys of a `github` section. `None` when Pages is not
    /// managed.
    ///
    /// # Errors
    ///
    /// Returns an error for key combinations GitHub cannot express.
    pub fn parse(raw: &Value) -> Result<Option<Self>> {
        let kind = raw.get("ghp_type").and_then(Value::as_str);
        let branch = raw.get("ghp_branch").and_then(Value::as_str);
        let path = raw.get("ghp_path").and_then(Value::as_str);

        match (kind, branch) {
            (Some(kind @ ("workflow" | "disabled")), _) => {
                if let Some(branch) = branch {
                    bail!("ghp_branch '{branch}' cannot be used when ghp_type is '{kind}'");
                }
                if let Some(path) = path {
                    bail!("ghp_path '{path}' cannot be used when ghp_type is '{kind}'");
                }
                Ok(Some(if kind == "workflow" {
                    Self::Workflow
                } else {
                    Self::Disabled
                }))
            }
            (Some("legacy"), None) => bail!("ghp_branch is required when ghp_type is 'legacy'"),
            (Some("legacy") | None, Some(branch)) => {
                let path = path.unwrap_or(DEFAULT_PATH);
                if path != DEFAULT_PATH && path != "/" {
                    bail!("invalid GitHub Pages path '{path}': must be either '/docs' or '/'");
                }
                Ok(Some(Self::Legacy {
                    branch: branch.to_string(),
                    path: path.to_string(),
                }))
            }
            (None, None) => match path {
                Some(_) => bail!("ghp_path requires ghp_branch"),
                None => Ok(None),
            },
            (Some(other), _) => bail!("invalid GitHub Pages type '{other}'"),
        }
    }

    fn site(&self) -> Option<PagesSite> {
        match self {
            Self::Legacy { branch, path } => Some(PagesSite {
                build_type: "legacy".to_string(),
                source: Some(PagesSource {
                    branch: branch.clone(),
                    path: path.clone(),
                }),
            }),
            Self::Workflow => Some(PagesSite {
                build_type: "workflow".to_string(),
                source: None,
            }),
            Self::Disabled => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Legacy { branch, path } => {
                format!("set GitHub Pages to branch '{branch}' and path '{path}'")
            }
            Self::Workflow => "set GitHub Pages to type 'workflow'".to_string(),
            Self::Disabled => "disable GitHub Pages".to_string(),
        }
    }
}

fn in_sync(wanted: &PagesSite, current: &PagesSite) -> bool {
    // Workflow sites still report a source; only legacy builds care about it.
    wanted.build_type == current.build_type
        && (wanted.source.is_none() || wanted.source == current.source)
}

/// Bring the repository's Pages configuration in line with `config`.
///
/// # Errors
///
/// Returns an error when a legacy branch is neither `default_branch` nor
/// `gh-pages`, or when a GitHub call fails.
pub fn sync(
    config: &PagesConfig,
    default_branch: &str,
    ctx: &FeatureContext,
    changes: &mut Vec<String>,
) -> Result<()> {
    if let PagesConfig::Legacy { branch, .. } = config
        && branch != default_branch
        && branch != PAGES_BRANCH
    {
        bail!(
            "invalid GitHub Pages branch '{branch}': must be the default branch ('{default_branch}') or '{PAGES_BRANCH}'"
        );
    }

    let repo = ctx.repository.full_name();
    let github = &ctx.services.github;
    let current = github.pages(&repo)?;

    match (config.site(), current) {
        (None, None) => Ok(()),
        (None, Some(_)) => ctx.apply(changes, config.describe(), || {
            github.delete_pages(&repo)?;
            Ok(())
        }),
        (Some(wanted), Some(current)) if in_sync(&wanted, &current) => Ok(()),
        (Some(wanted), Some(_)) => ctx.apply(changes, config.describe(), || {
            github.update_pages(&repo, &wanted)?;
            Ok(())
        }),
        (Some(wanted), None) => ctx.apply(changes, config.describe(), || {
            github.create_pages(&repo, &wanted)?;
            Ok(())
        }),
    }
}
