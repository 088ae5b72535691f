//! GitHub repository settings: metadata, topics, merge buttons, Pages and
//! branch protection.
pub mod branch_protection;
pub mod pages;

use anyhow::{Result, bail};
use serde_yaml::Value;

use self::branch_protection::BranchRule;
use self::pages::PagesConfig;
use super::{Feature, FeatureConfig, FeatureContext, FeatureResult};
use crate::config::schema::{Field, Schema};
use crate::services::github::{RepoSettings, RepoUpdate};

/// Most topics GitHub accepts on one repository.
pub const MAX_TOPICS: usize = 20;

/// Longest accepted topic.
pub const MAX_TOPIC_LENGTH: usize = 50;

/// Repository features that can be switched on or off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepoFeatures {
    /// Issue tracker.
    pub issues: Option<bool>,
    /// Wiki.
    pub wiki: Option<bool>,
    /// Project boards.
    pub projects: Option<bool>,
    /// Discussions.
    pub discussions: Option<bool>,
}

/// Merge strategies offered on pull requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeButtons {
    /// Squash and merge.
    pub squash: Option<bool>,
    /// Merge commit.
    pub merge: Option<bool>,
    /// Rebase and merge.
    pub rebase: Option<bool>,
}

/// Typed `github` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GithubConfig {
    /// Repository description.
    pub description: Option<String>,
    /// Repository home page URL.
    pub homepage: Option<String>,
    /// Repository topics, deduplicated. `None` leaves topics alone.
    pub labels: Option<Vec<String>>,
    /// Repository features to switch.
    pub features: RepoFeatures,
    /// Merge strategies to offer.
    pub merge_buttons: MergeButtons,
    /// GitHub Pages site, when managed.
    pub pages: Option<PagesConfig>,
    /// `None` when protection is not managed; an empty list removes all
    /// protection.
    pub protected_branches: Option<Vec<BranchRule>>,
}

/// The `github` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitHub;

fn flag(node: Option<&Value>, key: &str) -> Option<bool> {
    node.and_then(|n| n.get(key)).and_then(Value::as_bool)
}

fn text(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse_labels(raw: &Value) -> Result<Option<Vec<String>>> {
    let Some(items) = raw.get("labels").and_then(Value::as_sequence) else {
        return Ok(None);
    };
    let mut labels: Vec<String> = Vec::new();
    for label in items.iter().filter_map(Value::as_str) {
        if label.len() > MAX_TOPIC_LENGTH {
            bail!("label '{label}' is longer than {MAX_TOPIC_LENGTH} characters");
        }
        if !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
    }
    if labels.len() > MAX_TOPICS {
        bail!("at most {MAX_TOPICS} labels are allowed, found {}", labels.len());
    }
    Ok(Some(labels))
}

impl GithubConfig {
    fn from_value(raw: &Value) -> Result<Self> {
        let features = raw.get("features");
        let buttons = raw.get("enabled_merge_buttons");
        let merge_buttons = MergeButtons {
            squash: flag(buttons, "squash"),
            merge: flag(buttons, "merge"),
            rebase: flag(buttons, "rebase"),
        };
        if merge_buttons.squash == Some(false)
            && merge_buttons.merge == Some(false)
            && merge_buttons.rebase == Some(false)
        {
            bail!("enabled_merge_buttons: at least one merge button must stay enabled");
        }

        let protected_branches = match raw.get("protected_branches") {
            Some(node) => Some(branch_protection::parse_rules(node)?),
            None => None,
        };

        Ok(Self {
            description: text(raw, "description"),
            homepage: text(raw, "homepage"),
            labels: parse_labels(raw)?,
            features: RepoFeatures {
                issues: flag(features, "issues"),
                wiki: flag(features, "wiki"),
                projects: flag(features, "projects"),
                discussions: flag(features, "discussions"),
            },
            merge_buttons,
            pages: PagesConfig::parse(raw)?,
            protected_branches,
        })
    }

    /// Settings patch and the matching change descriptions.
    fn settings_update(&self, current: &RepoSettings) -> (RepoUpdate, Vec<String>) {
        let mut update = RepoUpdate::default();
        let mut changes = Vec::new();

        if let Some(description) = &self.description
            && current.description.as_deref().unwrap_or_default() != description
        {
            changes.push(format!("set description to '{description}'"));
            update.description = Some(description.clone());
        }
        if let Some(homepage) = &self.homepage
            && current.homepage.as_deref().unwrap_or_default() != homepage
        {
            changes.push(format!("set homepage to '{homepage}'"));
            update.homepage = Some(homepage.clone());
        }

        let toggles = [
            ("issues", self.features.issues, current.has_issues, &mut update.has_issues),
            ("wiki", self.features.wiki, current.has_wiki, &mut update.has_wiki),
            ("projects", self.features.projects, current.has_projects, &mut update.has_projects),
            (
                "discussions",
                self.features.discussions,
                current.has_discussions,
                &mut update.has_discussions,
            ),
            (
                "squash merging",
                self.merge_buttons.squash,
                current.allow_squash_merge,
                &mut update.allow_squash_merge,
            ),
            (
                "merge commits",
                self.merge_buttons.merge,
                current.allow_merge_commit,
                &mut update.allow_merge_commit,
            ),
            (
                "rebase merging",
                self.merge_buttons.rebase,
                current.allow_rebase_merge,
                &mut update.allow_rebase_merge,
            ),
        ];
        for (label, wanted, live, slot) in toggles {
            if let Some(wanted) = wanted
                && wanted != live
            {
                let verb = if wanted { "enable" } else { "disable" };
                changes.push(format!("{verb} {label}"));
                *slot = Some(wanted);
            }
        }
        (update, changes)
    }
}

impl Feature for GitHub {
    fn name(&self) -> &str {
        "github"
    }

    fn schema(&self) -> Schema {
        let toggles = |keys: &[&'static str]| {
            Schema::map(keys.iter().map(|key| Field::optional(*key, Schema::Bool)))
        };
        Schema::map([
            Field::optional("description", Schema::Str),
            Field::optional("homepage", Schema::Str),
            Field::optional(
                "labels",
                Schema::seq(Schema::Matches {
                    pattern: "[a-z0-9][a-z0-9-]*",
                    description: "a lowercase topic",
                }),
            ),
            Field::optional(
                "features",
                toggles(&["issues", "wiki", "projects", "discussions"]),
            ),
            Field::optional(
                "enabled_merge_buttons",
                toggles(&["squash", "merge", "rebase"]),
            ),
            Field::optional(
                "ghp_type",
                Schema::Enum(&["legacy", "workflow", "disabled"]),
            ),
            Field::optional("ghp_branch", Schema::NonEmptyStr),
            Field::optional("ghp_path", Schema::Str),
            Field::optional(
                "protected_branches",
                Schema::map_of(branch_protection::rule_schema()),
            ),
        ])
    }

    fn parse(&self, raw: &Value) -> Result<FeatureConfig> {
        Ok(FeatureConfig::Github(Box::new(GithubConfig::from_value(
            raw,
        )?)))
    }

    fn run(&self, config: &FeatureConfig, ctx: &FeatureContext) -> Result<FeatureResult> {
        let FeatureConfig::Github(config) = config else {
            bail!("github received configuration for another feature");
        };
        let repo = ctx.repository.full_name();
        let github = &ctx.services.github;
        let current = github.repository(&repo)?;
        let mut changes = Vec::new();

        let (update, planned) = config.settings_update(&current);
        let squash = update.allow_squash_merge.unwrap_or(current.allow_squash_merge);
        let merge = update.allow_merge_commit.unwrap_or(current.allow_merge_commit);
        let rebase = update.allow_rebase_merge.unwrap_or(current.allow_rebase_merge);
        if !(squash || merge || rebase) {
            bail!("enabled_merge_buttons would leave no merge button enabled");
        }
        changes.extend(ctx.apply_all(planned, || {
            github.update_repository(&repo, &update)?;
            Ok(())
        })?);

        if let Some(labels) = &config.labels {
            let mut wanted = labels.clone();
            wanted.sort();
            let mut live = current.topics.clone();
            live.sort();
            if wanted != live {
                let change = if labels.is_empty() {
                    "clear topics".to_string()
                } else {
                    format!("set topics to {}", labels.join(", "))
                };
                ctx.apply(&mut changes, change, || {
                    github.set_topics(&repo, labels)?;
                    Ok(())
                })?;
            }
        }

        if let Some(pages) = &config.pages {
            let default_branch = ctx
                .repository
                .default_branch
                .as_deref()
                .unwrap_or(&current.default_branch);
            pages::sync(pages, default_branch, ctx, &mut changes)?;
        }

        if let Some(rules) = &config.protected_branches {
            branch_protection::sync(rules, ctx, &mut changes)?;
        }

        Ok(FeatureResult::Synced(changes))
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::environment::Environment;
    use crate::config::validation::validate_feature;
    use crate::features::FeatureDefinition;
    use crate::features::test_helpers::context;
    use crate::services::github::MockGitHubApi;

    fn yaml(src: &str) -> Value {
        serde_yaml::from_str(src).unwrap()
    }

    fn config(src: &str) -> GithubConfig {
        match GitHub.parse(&yaml(src)).unwrap() {
            FeatureConfig::Github(c) => *c,
            other => panic!("unexpected {other:?}"),
        }
    }

    fn live() -> RepoSettings {
        RepoSettings {
            description: Some("Apache Foo".to_string()),
            has_issues: true,
            allow_squash_merge: true,
            allow_merge_commit: true,
            default_branch: "main".to_string(),
            topics: vec!["java".to_string()],
            ..RepoSettings::default()
        }
    }

    #[test]
    fn schema_rejects_unknown_keys_and_bad_labels() {
        let def = FeatureDefinition::new(Arc::new(GitHub));
        let errors =
            validate_feature(&def, &yaml("descripton: x\nlabels: [Java]")).unwrap_err();
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["github.descripton", "github.labels[0]"]);
    }

    #[test]
    fn schema_reports_protection_paths() {
        let def = FeatureDefinition::new(Arc::new(GitHub));
        let errors = validate_feature(
            &def,
            &yaml("protected_branches:\n  main:\n    required_pull_request_reviews: [1]"),
        )
        .unwrap_err();
        assert_eq!(
            errors[0].path,
            "github.protected_branches.main.required_pull_request_reviews"
        );
    }

    #[test]
    fn parse_reads_every_section() {
        let c = config(
            "description: Apache Foo\nlabels: [java, big-data, java]\nfeatures: {wiki: false}\nenabled_merge_buttons: {rebase: false}\nghp_type: workflow\nprotected_branches: ~",
        );
        assert_eq!(c.description.as_deref(), Some("Apache Foo"));
        assert_eq!(c.labels, Some(vec!["java".to_string(), "big-data".to_string()]));
        assert_eq!(c.features.wiki, Some(false));
        assert_eq!(c.merge_buttons.rebase, Some(false));
        assert_eq!(c.pages, Some(PagesConfig::Workflow));
        assert_eq!(c.protected_branches, Some(vec![]));
    }

    #[test]
    fn absent_protection_is_unmanaged() {
        assert_eq!(config("description: x").protected_branches, None);
    }

    #[test]
    fn all_merge_buttons_off_is_rejected() {
        let err = GitHub
            .parse(&yaml(
                "enabled_merge_buttons: {squash: false, merge: false, rebase: false}",
            ))
            .unwrap_err();
        assert!(err.to_string().contains("at least one merge button"));
    }

    #[test]
    fn too_many_labels_are_rejected() {
        let labels: Vec<String> = (0..=MAX_TOPICS).map(|i| format!("t{i}")).collect();
        let src = format!("labels: [{}]", labels.join(", "));
        assert!(GitHub.parse(&yaml(&src)).is_err());
    }

    #[test]
    fn settings_update_only_touches_differences() {
        let c = config("description: Apache Foo\nhomepage: https://foo.apache.org\nfeatures: {issues: true, wiki: true}");
        let (update, changes) = c.settings_update(&live());
        assert_eq!(
            changes,
            vec!["set homepage to 'https://foo.apache.org'", "enable wiki"]
        );
        assert_eq!(update.description, None);
        assert_eq!(update.has_wiki, Some(true));
        assert_eq!(update.has_issues, None);
    }

    #[test]
    fn run_applies_settings_and_topics() {
        let mut github = MockGitHubApi::new();
        github.expect_repository().returning(|_| Ok(live()));
        github
            .expect_update_repository()
            .withf(|repo, update| repo == "apache/foo" && update.has_issues == Some(false))
            .times(1)
            .returning(|_, _| Ok(()));
        github
            .expect_set_topics()
            .withf(|_, topics| topics == ["big-data".to_string(), "java".to_string()])
            .times(1)
            .returning(|_, _| Ok(()));
        let (ctx, _, _) = context(Environment::production(), Arc::new(github));

        let c = GitHub
            .parse(&yaml("features: {issues: false}\nlabels: [big-data, java]"))
            .unwrap();
        let result = GitHub.run(&c, &ctx).unwrap();
        assert_eq!(
            result,
            FeatureResult::Synced(vec![
                "disable issues".to_string(),
                "set topics to big-data, java".to_string()
            ])
        );
    }

    #[test]
    fn run_in_sync_changes_nothing() {
        let mut github = MockGitHubApi::new();
        github.expect_repository().returning(|_| Ok(live()));
        github.expect_update_repository().never();
        github.expect_set_topics().never();
        let (ctx, _, _) = context(Environment::production(), Arc::new(github));
        let c = GitHub
            .parse(&yaml("description: Apache Foo\nlabels: [java]"))
            .unwrap();
        assert_eq!(GitHub.run(&c, &ctx).unwrap(), FeatureResult::unchanged());
    }

    #[test]
    fn run_refuses_to_disable_last_merge_button() {
        let mut github = MockGitHubApi::new();
        github.expect_repository().returning(|_| {
            Ok(RepoSettings {
                allow_squash_merge: true,
                ..RepoSettings::default()
            })
        });
        github.expect_update_repository().never();
        let (ctx, _, _) = context(Environment::production(), Arc::new(github));
        let c = GitHub
            .parse(&yaml("enabled_merge_buttons: {squash: false}"))
            .unwrap();
        let err = GitHub.run(&c, &ctx).unwrap_err();
        assert!(err.to_string().contains("no merge button"));
    }

    #[test]
    fn run_in_noop_plans_without_writing() {
        let mut github = MockGitHubApi::new();
        github.expect_repository().returning(|_| Ok(live()));
        github.expect_update_repository().never();
        github.expect_pages().returning(|_| Ok(None));
        github.expect_create_pages().never();
        let (ctx, _, _) = context(Environment::noop(), Arc::new(github));
        let c = GitHub
            .parse(&yaml("description: New\nghp_branch: main"))
            .unwrap();
        let result = GitHub.run(&c, &ctx).unwrap();
        assert_eq!(
            result,
            FeatureResult::Synced(vec![
                "set description to 'New'".to_string(),
                "set GitHub Pages to branch 'main' and path '/docs'".to_string()
            ])
        );
    }
}
