//! Branch protection rules: exact branch names and regex patterns.
//!
//! A rule with a `pattern` key applies to every branch whose name matches the
//! pattern from its first character; any other key names one branch exactly.
//! Exact rules win over patterns and the first declared pattern wins among
//! patterns.
use std::collections::BTreeSet;
use std::fmt;

use anyhow::{Result, anyhow};
use regex::Regex;
use serde_yaml::Value;

use crate::config::schema::{Field, Schema, compile_branch_pattern};
use crate::features::FeatureContext;
use crate::services::github::{
    LiveProtection, ProtectionRequest, ReviewsRequest, StatusCheck, StatusChecksRequest,
};

/// GitHub's limit on required approving reviews.
pub const MAX_REVIEW_COUNT: i64 = 6;

/// `app_id` meaning "any source may report the check".
pub const ANY_APP: i64 = -1;

/// Protection settings of one rule. `None` leaves a setting to GitHub's default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionSettings {
    /// Require signed commits.
    pub required_signatures: Option<bool>,
    /// Forbid merge commits.
    pub required_linear_history: Option<bool>,
    /// Require every review thread to be resolved.
    pub required_conversation_resolution: Option<bool>,
    /// Pull request review requirements.
    pub required_pull_request_reviews: Option<ReviewSettings>,
    /// Checks that must pass before merging.
    pub required_status_checks: Option<StatusCheckSettings>,
}

/// Pull request review requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewSettings {
    /// Approvals needed, at most [`MAX_REVIEW_COUNT`].
    pub required_approving_review_count: u8,
    /// Require approval from a code owner.
    pub require_code_owner_reviews: Option<bool>,
    /// Dismiss approvals when new commits are pushed.
    pub dismiss_stale_reviews: Option<bool>,
    /// The last push must be approved by someone else.
    pub require_last_push_approval: Option<bool>,
}

/// Required status checks, never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCheckSettings {
    /// Branch must be up to date before merging.
    pub strict: Option<bool>,
    /// `(context, app_id)` in declaration order.
    pub checks: Vec<(String, i64)>,
}

/// One entry of `protected_branches`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRule {
    /// Key of the entry: the branch name for exact rules, a label for pattern rules.
    pub name: String,
    /// Branch pattern, for pattern rules.
    pub pattern: Option<String>,
    /// Protection to apply.
    pub settings: ProtectionSettings,
}

/// Schema of a single rule.
#[must_use]
pub fn rule_schema() -> Schema {
    Schema::map([
        Field::optional("pattern", Schema::BranchPattern),
        Field::optional("required_signatures", Schema::Bool),
        Field::optional("required_linear_history", Schema::Bool),
        Field::optional("required_conversation_resolution", Schema::Bool),
        Field::optional(
            "required_pull_request_reviews",
            Schema::map([
                Field::optional(
                    "required_approving_review_count",
                    Schema::Int {
                        min: 0,
                        max: MAX_REVIEW_COUNT,
                    },
                ),
                Field::optional("require_code_owner_reviews", Schema::Bool),
                Field::optional("dismiss_stale_reviews", Schema::Bool),
                Field::optional("require_last_push_approval", Schema::Bool),
            ]),
        ),
        Field::optional(
            "required_status_checks",
            Schema::map([
                Field::optional("strict", Schema::Bool),
                Field::optional("contexts", Schema::seq(Schema::NonEmptyStr)),
                Field::optional(
                    "checks",
                    Schema::seq(Schema::map([
                        Field::required("context", Schema::NonEmptyStr),
                        Field::optional(
                            "app_id",
                            Schema::Int {
                                min: ANY_APP,
                                max: i64::MAX,
                            },
                        ),
                    ])),
                ),
            ]),
        ),
    ])
}

fn flag(node: &Value, key: &str) -> Option<bool> {
    node.get(key).and_then(Value::as_bool)
}

fn upsert(checks: &mut Vec<(String, i64)>, context: &str, app_id: i64) {
    match checks.iter_mut().find(|(c, _)| c == context) {
        Some(entry) => entry.1 = app_id,
        None => checks.push((context.to_string(), app_id)),
    }
}

fn parse_settings(node: &Value) -> ProtectionSettings {
    let reviews = node
        .get("required_pull_request_reviews")
        .map(|r| ReviewSettings {
            required_approving_review_count: r
                .get("required_approving_review_count")
                .and_then(Value::as_u64)
                .and_then(|n| u8::try_from(n).ok())
                .unwrap_or(0),
            require_code_owner_reviews: flag(r, "require_code_owner_reviews"),
            dismiss_stale_reviews: flag(r, "dismiss_stale_reviews"),
            require_last_push_approval: flag(r, "require_last_push_approval"),
        });

    let status_checks = node.get("required_status_checks").and_then(|s| {
        let mut checks = Vec::new();
        for context in s
            .get("contexts")
            .and_then(Value::as_sequence)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
        {
            upsert(&mut checks, context, ANY_APP);
        }
        for check in s
            .get("checks")
            .and_then(Value::as_sequence)
            .into_iter()
            .flatten()
        {
            if let Some(context) = check.get("context").and_then(Value::as_str) {
                let app_id = check
                    .get("app_id")
                    .and_then(Value::as_i64)
                    .unwrap_or(ANY_APP);
                upsert(&mut checks, context, app_id);
            }
        }
        // No checks means no status check requirement at all.
        (!checks.is_empty()).then(|| StatusCheckSettings {
            strict: flag(s, "strict"),
            checks,
        })
    });

    ProtectionSettings {
        required_signatures: flag(node, "required_signatures"),
        required_linear_history: flag(node, "required_linear_history"),
        required_conversation_resolution: flag(node, "required_conversation_resolution"),
        required_pull_request_reviews: reviews,
        required_status_checks: status_checks,
    }
}

/// Convert a validated `protected_branches` node into rules, keeping
/// declaration order. `null` yields no rules.
///
/// # Errors
///
/// Returns an error for non-string rule names.
pub fn parse_rules(node: &Value) -> Result<Vec<BranchRule>> {
    let Some(map) = node.as_mapping() else {
        return Ok(Vec::new());
    };
    map.iter()
        .map(|(key, rule)| {
            let name = key
                .as_str()
                .ok_or_else(|| anyhow!("protected_branches: rule names must be strings"))?;
            Ok(BranchRule {
                name: name.to_string(),
                pattern: rule
                    .get("pattern")
                    .and_then(Value::as_str)
                    .map(|p| p.trim().to_string()),
                settings: parse_settings(rule),
            })
        })
        .collect()
}

/// A pattern rule with its compiled expression.
#[derive(Debug, Clone)]
pub struct PatternRule<'a> {
    /// Rule label.
    pub name: &'a str,
    /// Pattern as written, without the anchor.
    pub pattern: &'a str,
    regex: Regex,
    /// Protection to apply.
    pub settings: &'a ProtectionSettings,
}

impl PatternRule<'_> {
    /// Whether the rule covers `branch`.
    #[must_use]
    pub fn matches(&self, branch: &str) -> bool {
        self.regex.is_match(branch)
    }
}

/// Split rules into pattern rules and exact rules.
///
/// # Errors
///
/// Returns an error naming the rule whose pattern does not compile.
pub fn compile_rules(rules: &[BranchRule]) -> Result<(Vec<PatternRule<'_>>, Vec<&BranchRule>)> {
    let mut patterns = Vec::new();
    let mut exact = Vec::new();
    for rule in rules {
        match &rule.pattern {
            Some(pattern) => {
                let regex = compile_branch_pattern(pattern)
                    .map_err(|e| anyhow!("invalid regex pattern in rule '{}': {e}", rule.name))?;
                patterns.push(PatternRule {
                    name: &rule.name,
                    pattern,
                    regex,
                    settings: &rule.settings,
                });
            }
            None => exact.push(rule),
        }
    }
    Ok((patterns, exact))
}

/// Every branch that matches at least one pattern, with the names of the
/// matching rules in declaration order. Branch order is preserved.
#[must_use]
pub fn match_branches<'a>(
    branches: &[String],
    patterns: &[PatternRule<'a>],
) -> Vec<(String, Vec<&'a str>)> {
    branches
        .iter()
        .filter_map(|branch| {
            let matching: Vec<&'a str> = patterns
                .iter()
                .filter(|p| p.matches(branch))
                .map(|p| p.name)
                .collect();
            (!matching.is_empty()).then(|| (branch.clone(), matching))
        })
        .collect()
}

/// Which rule a branch's protection came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    /// A pattern rule matched the branch.
    Pattern {
        /// Rule label.
        rule: String,
        /// The rule's pattern.
        pattern: String,
    },
    /// An exact rule names the branch.
    Exact(String),
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern { rule, pattern } => write!(f, "pattern rule \"{rule}\" ({pattern})"),
            Self::Exact(branch) => write!(f, "exact rule \"{branch}\""),
        }
    }
}

/// Final protection of one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRule<'a> {
    /// Protected branch.
    pub branch: String,
    /// Protection to apply.
    pub settings: &'a ProtectionSettings,
    /// Rule that won.
    pub source: RuleSource,
}

/// Decide which rule protects each branch and collect the conflicts found on
/// the way.
#[must_use]
pub fn resolve_rules<'a>(
    branches: &[String],
    patterns: &[PatternRule<'a>],
    exact: &[&'a BranchRule],
) -> (Vec<ResolvedRule<'a>>, Vec<String>) {
    let mut warnings = Vec::new();
    let mut resolved: Vec<ResolvedRule<'a>> = Vec::new();

    let matched = match_branches(branches, patterns);
    for (branch, rules) in &matched {
        let Some((first, _)) = rules.split_first() else {
            continue;
        };
        if rules.len() > 1 {
            warnings.push(format!(
                "Branch '{branch}' matches multiple patterns: {}. Using first match: '{first}'",
                rules.join(", ")
            ));
        }
        if let Some(rule) = patterns.iter().find(|p| p.name == *first) {
            resolved.push(ResolvedRule {
                branch: branch.clone(),
                settings: rule.settings,
                source: RuleSource::Pattern {
                    rule: rule.name.to_string(),
                    pattern: rule.pattern.to_string(),
                },
            });
        }
    }

    for rule in exact {
        if !branches.contains(&rule.name) {
            warnings.push(format!(
                "Exact branch rule '{}' does not match any existing branch",
                rule.name
            ));
            continue;
        }
        let entry = ResolvedRule {
            branch: rule.name.clone(),
            settings: &rule.settings,
            source: RuleSource::Exact(rule.name.clone()),
        };
        match resolved.iter_mut().find(|r| r.branch == rule.name) {
            Some(existing) => {
                warnings.push(format!(
                    "Exact rule '{}' overrides pattern match from {}",
                    rule.name, existing.source
                ));
                *existing = entry;
            }
            None => resolved.push(entry),
        }
    }

    for pattern in patterns {
        if !matched.iter().any(|(_, rules)| rules.contains(&pattern.name)) {
            warnings.push(format!(
                "Pattern rule '{}' with pattern '{}' matches no branches",
                pattern.name, pattern.pattern
            ));
        }
    }

    (resolved, warnings)
}

fn diff_flag(out: &mut Vec<String>, label: &str, wanted: Option<bool>, live: Option<bool>) {
    if let Some(wanted) = wanted
        && live != Some(wanted)
    {
        out.push(format!("set {label} to {wanted}"));
    }
}

fn describe_checks(checks: &[(String, i64)]) -> String {
    checks
        .iter()
        .map(|(context, app_id)| format!("{context} (app_id: {app_id})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Changes needed to bring `live` protection in line with `settings`.
/// `None` means the branch is not protected yet.
#[must_use]
pub fn plan_changes(settings: &ProtectionSettings, live: Option<&LiveProtection>) -> Vec<String> {
    let mut out = Vec::new();

    if live.is_none_or(|l| l.allow_force_pushes.enabled) {
        out.push("set allow force push to false".to_string());
    }
    diff_flag(
        &mut out,
        "required signatures",
        settings.required_signatures,
        live.map(|l| l.required_signatures.enabled),
    );
    diff_flag(
        &mut out,
        "required linear history",
        settings.required_linear_history,
        live.map(|l| l.required_linear_history.enabled),
    );
    diff_flag(
        &mut out,
        "required conversation resolution",
        settings.required_conversation_resolution,
        live.map(|l| l.required_conversation_resolution.enabled),
    );

    let live_reviews = live.and_then(|l| l.required_pull_request_reviews.as_ref());
    match &settings.required_pull_request_reviews {
        Some(reviews) => {
            if live_reviews.map(|r| r.required_approving_review_count)
                != Some(reviews.required_approving_review_count)
            {
                out.push(format!(
                    "set required approving review count to {}",
                    reviews.required_approving_review_count
                ));
            }
            diff_flag(
                &mut out,
                "required code owner reviews",
                reviews.require_code_owner_reviews,
                live_reviews.map(|r| r.require_code_owner_reviews),
            );
            diff_flag(
                &mut out,
                "dismiss stale reviews",
                reviews.dismiss_stale_reviews,
                live_reviews.map(|r| r.dismiss_stale_reviews),
            );
            diff_flag(
                &mut out,
                "require last push approval",
                reviews.require_last_push_approval,
                live_reviews.map(|r| r.require_last_push_approval),
            );
        }
        None if live_reviews.is_some() => {
            out.push("remove required pull request reviews".to_string());
        }
        None => {}
    }

    let live_checks = live.and_then(|l| l.required_status_checks.as_ref());
    match &settings.required_status_checks {
        Some(status) => {
            diff_flag(
                &mut out,
                "require branches to be up to date before merging (strict)",
                status.strict,
                live_checks.map(|c| c.strict),
            );
            let mut wanted = status.checks.clone();
            wanted.sort();
            let mut current: Vec<(String, i64)> = live_checks
                .map(|c| {
                    c.checks
                        .iter()
                        .map(|check| (check.context.clone(), check.app_id.unwrap_or(ANY_APP)))
                        .collect()
                })
                .unwrap_or_default();
            current.sort();
            if wanted != current {
                out.push(format!(
                    "set required status checks to {}",
                    describe_checks(&status.checks)
                ));
            }
        }
        None if live_checks.is_some() => {
            out.push("remove required status checks".to_string());
        }
        None => {}
    }

    out
}

/// The `PUT` body that establishes `settings`. Force pushes are always disabled.
#[must_use]
pub fn protection_request(settings: &ProtectionSettings) -> ProtectionRequest {
    ProtectionRequest {
        required_status_checks: settings.required_status_checks.as_ref().map(|s| {
            StatusChecksRequest {
                strict: s.strict.unwrap_or(false),
                checks: s
                    .checks
                    .iter()
                    .map(|(context, app_id)| StatusCheck {
                        context: context.clone(),
                        app_id: *app_id,
                    })
                    .collect(),
            }
        }),
        enforce_admins: None,
        required_pull_request_reviews: settings.required_pull_request_reviews.as_ref().map(|r| {
            ReviewsRequest {
                required_approving_review_count: r.required_approving_review_count,
                dismiss_stale_reviews: r.dismiss_stale_reviews,
                require_code_owner_reviews: r.require_code_owner_reviews,
                require_last_push_approval: r.require_last_push_approval,
            }
        }),
        restrictions: None,
        required_linear_history: settings.required_linear_history,
        allow_force_pushes: false,
        required_conversation_resolution: settings.required_conversation_resolution,
    }
}

/// Bring every branch's protection in line with `rules`.
///
/// Protected branches that no rule covers any more lose their protection.
///
/// # Errors
///
/// Returns an error if a pattern does not compile or a GitHub call fails.
pub fn sync(rules: &[BranchRule], ctx: &FeatureContext, changes: &mut Vec<String>) -> Result<()> {
    let repo = ctx.repository.full_name();
    let github = &ctx.services.github;

    let branches = github.branches(&repo)?;
    let names: Vec<String> = branches.iter().map(|b| b.name.clone()).collect();
    let mut unclaimed: BTreeSet<&str> = branches
        .iter()
        .filter(|b| b.protected)
        .map(|b| b.name.as_str())
        .collect();

    let (patterns, exact) = compile_rules(rules)?;
    let (resolved, warnings) = resolve_rules(&names, &patterns, &exact);
    for warning in &warnings {
        ctx.log.warn(warning);
    }

    for rule in &resolved {
        unclaimed.remove(rule.branch.as_str());
        ctx.log
            .debug(&format!("{} is protected by {}", rule.branch, rule.source));

        let live = github.branch_protection(&repo, &rule.branch)?;
        let planned: Vec<String> = plan_changes(rule.settings, live.as_ref())
            .into_iter()
            .map(|change| format!("{}: {change}", rule.branch))
            .collect();
        let request = protection_request(rule.settings);
        let live_signatures = live.as_ref().is_some_and(|l| l.required_signatures.enabled);

        changes.extend(ctx.apply_all(planned, || {
            github.protect_branch(&repo, &rule.branch, &request)?;
            if let Some(wanted) = rule.settings.required_signatures
                && wanted != live_signatures
            {
                github.set_required_signatures(&repo, &rule.branch, wanted)?;
            }
            Ok(())
        })?);
    }

    for branch in unclaimed {
        ctx.apply(
            changes,
            format!("{branch}: remove branch protection (no longer matches any rules)"),
            || {
                github.unprotect_branch(&repo, branch)?;
                Ok(())
            },
        )?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::environment::Environment;
    use crate::features::test_helpers::context;
    use crate::logging::LogKind;
    use crate::services::github::{Branch, LiveReviews, MockGitHubApi, Toggle};

    fn yaml(src: &str) -> Value {
        serde_yaml::from_str(src).unwrap()
    }

    fn rules(src: &str) -> Vec<BranchRule> {
        parse_rules(&yaml(src)).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    fn branch(name: &str, protected: bool) -> Branch {
        Branch {
            name: name.to_string(),
            protected,
        }
    }

    #[test]
    fn rule_schema_reports_nested_paths() {
        let schema = rule_schema();
        let v = schema.validate(
            &yaml("required_pull_request_reviews: {required_approving_review_count: 9}"),
            "github.protected_branches.main",
        );
        assert_eq!(
            v[0].path,
            "github.protected_branches.main.required_pull_request_reviews.required_approving_review_count"
        );
        let v = schema.validate(&yaml("pattern: 'feature/[x'"), "p");
        assert!(v[0].message.starts_with("invalid regex pattern"));
    }

    #[test]
    fn parse_keeps_declaration_order_and_merges_checks() {
        let parsed = rules(
            "main:\n  required_status_checks:\n    strict: true\n    contexts: [ci, lint]\n    checks:\n      - {context: lint, app_id: 15368}\n      - {context: docs}\nfeature-branches:\n  pattern: feature/.*\n",
        );
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name, "main");
        assert_eq!(parsed[1].pattern.as_deref(), Some("feature/.*"));
        let checks = parsed[0].settings.required_status_checks.as_ref().unwrap();
        assert_eq!(checks.strict, Some(true));
        assert_eq!(
            checks.checks,
            vec![
                ("ci".to_string(), -1),
                ("lint".to_string(), 15368),
                ("docs".to_string(), -1)
            ]
        );
    }

    #[test]
    fn empty_status_checks_are_dropped() {
        let parsed = rules("main:\n  required_status_checks: {strict: true}\n");
        assert_eq!(parsed[0].settings.required_status_checks, None);
    }

    #[test]
    fn null_reviews_enable_reviews_with_defaults() {
        let parsed = rules("main:\n  required_pull_request_reviews: ~\n");
        let reviews = parsed[0].settings.required_pull_request_reviews.as_ref().unwrap();
        assert_eq!(reviews.required_approving_review_count, 0);
    }

    #[test]
    fn null_node_has_no_rules() {
        assert!(parse_rules(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn compile_splits_pattern_and_exact_rules() {
        let parsed = rules(
            "main: {required_signatures: true}\ndevelop: {required_pull_request_reviews: {required_approving_review_count: 2}}\nfeature-branches: {pattern: feature/.*, required_signatures: false}\n",
        );
        let (patterns, exact) = compile_rules(&parsed).unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].name, "feature-branches");
        let exact: Vec<&str> = exact.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(exact, vec!["main", "develop"]);
    }

    #[test]
    fn compile_rejects_invalid_pattern() {
        let parsed = vec![BranchRule {
            name: "bad-pattern".to_string(),
            pattern: Some("feature/[invalid".to_string()),
            settings: ProtectionSettings::default(),
        }];
        let err = compile_rules(&parsed).unwrap_err();
        assert!(
            err.to_string()
                .starts_with("invalid regex pattern in rule 'bad-pattern'")
        );
    }

    #[test]
    fn simple_pattern_matching() {
        let parsed = rules("feature-branches: {pattern: feature/.*}");
        let (patterns, _) = compile_rules(&parsed).unwrap();
        let matches = match_branches(
            &names(&["main", "feature/auth", "feature/payment", "hotfix/urgent"]),
            &patterns,
        );
        assert_eq!(
            matches,
            vec![
                ("feature/auth".to_string(), vec!["feature-branches"]),
                ("feature/payment".to_string(), vec!["feature-branches"]),
            ]
        );
    }

    #[test]
    fn padded_pattern_is_trimmed_before_matching() {
        let parsed = rules("rel: {pattern: ' release/.* '}");
        assert_eq!(parsed[0].pattern.as_deref(), Some("release/.*"));
        let (patterns, exact) = compile_rules(&parsed).unwrap();
        let (resolved, warnings) = resolve_rules(&names(&["main", "release/1.0"]), &patterns, &exact);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].branch, "release/1.0");
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn one_branch_can_match_several_patterns() {
        let parsed = rules("all-branches: {pattern: '.*'}\nfeature-branches: {pattern: feature/.*}");
        let (patterns, _) = compile_rules(&parsed).unwrap();
        let matches = match_branches(&names(&["feature/auth", "main"]), &patterns);
        assert_eq!(matches[0].1, vec!["all-branches", "feature-branches"]);
        assert_eq!(matches[1].1, vec!["all-branches"]);
    }

    #[test]
    fn complex_patterns_match_from_the_start() {
        let parsed = rules(
            "version-releases: {pattern: 'release/v\\d+\\.\\d+'}\nuser-branches: {pattern: 'users/[^/]+/.*'}",
        );
        let (patterns, _) = compile_rules(&parsed).unwrap();
        let matches = match_branches(
            &names(&[
                "release/v1.0",
                "release/v2.1",
                "release/beta",
                "users/john/feature",
                "users/jane/hotfix",
                "feature/auth",
                "old/release/v1.0",
            ]),
            &patterns,
        );
        let matched: Vec<&str> = matches.iter().map(|(b, _)| b.as_str()).collect();
        assert_eq!(
            matched,
            vec![
                "release/v1.0",
                "release/v2.1",
                "users/john/feature",
                "users/jane/hotfix"
            ]
        );
    }

    #[test]
    fn exact_overrides_pattern() {
        let parsed = rules(
            "all-branches: {pattern: '.*', required_signatures: false}\nmain: {required_signatures: true}",
        );
        let (patterns, exact) = compile_rules(&parsed).unwrap();
        let branches = names(&["main", "feature/auth", "feature/payment"]);
        let (resolved, warnings) = resolve_rules(&branches, &patterns, &exact);

        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].branch, "main");
        assert_eq!(resolved[0].source, RuleSource::Exact("main".to_string()));
        assert_eq!(resolved[0].settings.required_signatures, Some(true));
        assert_eq!(resolved[1].settings.required_signatures, Some(false));
        assert_eq!(
            warnings,
            vec![
                "Exact rule 'main' overrides pattern match from pattern rule \"all-branches\" (.*)"
            ]
        );
    }

    #[test]
    fn first_pattern_wins() {
        let parsed = rules(
            "first-pattern: {pattern: feature/.*, required_signatures: true}\nsecond-pattern: {pattern: '.*', required_signatures: false}",
        );
        let (patterns, exact) = compile_rules(&parsed).unwrap();
        let (resolved, warnings) = resolve_rules(&names(&["feature/auth"]), &patterns, &exact);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].settings.required_signatures, Some(true));
        assert!(resolved[0].source.to_string().contains("first-pattern"));
        assert_eq!(
            warnings,
            vec![
                "Branch 'feature/auth' matches multiple patterns: first-pattern, second-pattern. Using first match: 'first-pattern'"
            ]
        );
    }

    #[test]
    fn unmatched_pattern_and_missing_branch_warn() {
        let parsed = rules("feature-branches: {pattern: feature/.*}\nnonexistent: {}");
        let (patterns, exact) = compile_rules(&parsed).unwrap();
        let (resolved, warnings) = resolve_rules(&names(&["main"]), &patterns, &exact);
        assert!(resolved.is_empty());
        assert_eq!(
            warnings,
            vec![
                "Exact branch rule 'nonexistent' does not match any existing branch",
                "Pattern rule 'feature-branches' with pattern 'feature/.*' matches no branches",
            ]
        );
    }

    #[test]
    fn typical_project_setup() {
        let parsed = rules(
            "main: {required_signatures: true, required_linear_history: true}\ndevelop:\n  required_pull_request_reviews: {required_approving_review_count: 1}\nfeature-branches:\n  pattern: feature/.*\n  required_pull_request_reviews: {required_approving_review_count: 1}\nrelease-branches:\n  pattern: 'release/v\\d+\\.\\d+'\n  required_signatures: true\n",
        );
        let (patterns, exact) = compile_rules(&parsed).unwrap();
        let branches = names(&[
            "main",
            "develop",
            "feature/user-auth",
            "feature/payment",
            "release/v1.0",
            "hotfix/security-fix",
        ]);
        let (resolved, warnings) = resolve_rules(&branches, &patterns, &exact);
        let covered: BTreeSet<&str> = resolved.iter().map(|r| r.branch.as_str()).collect();
        assert_eq!(resolved.len(), 5);
        assert!(!covered.contains("hotfix/security-fix"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn new_protection_lists_every_declared_setting() {
        let parsed = rules(
            "main:\n  required_signatures: false\n  required_pull_request_reviews: {required_approving_review_count: 1}\n  required_status_checks: {contexts: [ci]}\n",
        );
        let planned = plan_changes(&parsed[0].settings, None);
        assert_eq!(
            planned,
            vec![
                "set allow force push to false",
                "set required signatures to false",
                "set required approving review count to 1",
                "set required status checks to ci (app_id: -1)",
            ]
        );
    }

    #[test]
    fn matching_live_protection_plans_nothing() {
        let parsed = rules(
            "main:\n  required_linear_history: true\n  required_pull_request_reviews: {required_approving_review_count: 2}\n",
        );
        let live = LiveProtection {
            required_linear_history: Toggle { enabled: true },
            required_pull_request_reviews: Some(LiveReviews {
                required_approving_review_count: 2,
                ..LiveReviews::default()
            }),
            ..LiveProtection::default()
        };
        assert!(plan_changes(&parsed[0].settings, Some(&live)).is_empty());
    }

    #[test]
    fn undeclared_live_requirements_are_removed() {
        let live = LiveProtection {
            allow_force_pushes: Toggle { enabled: true },
            required_pull_request_reviews: Some(LiveReviews::default()),
            ..LiveProtection::default()
        };
        let planned = plan_changes(&ProtectionSettings::default(), Some(&live));
        assert_eq!(
            planned,
            vec![
                "set allow force push to false",
                "remove required pull request reviews"
            ]
        );
    }

    #[test]
    fn request_disables_force_pushes_and_maps_checks() {
        let parsed = rules(
            "main:\n  required_status_checks: {strict: true, checks: [{context: build, app_id: 7}]}\n",
        );
        let request = protection_request(&parsed[0].settings);
        assert!(!request.allow_force_pushes);
        let checks = request.required_status_checks.unwrap();
        assert!(checks.strict);
        assert_eq!(
            checks.checks,
            vec![StatusCheck {
                context: "build".to_string(),
                app_id: 7
            }]
        );
        assert!(request.required_pull_request_reviews.is_none());
    }

    #[test]
    fn sync_protects_resolved_branches_and_unprotects_stale_ones() {
        let mut github = MockGitHubApi::new();
        github.expect_branches().returning(|_| {
            Ok(vec![
                branch("main", false),
                branch("release/v1.0", false),
                branch("old", true),
            ])
        });
        github
            .expect_branch_protection()
            .returning(|_, _| Ok(None));
        github
            .expect_protect_branch()
            .withf(|repo, branch, request| {
                repo == "apache/foo"
                    && (branch == "main" || branch == "release/v1.0")
                    && !request.allow_force_pushes
            })
            .times(2)
            .returning(|_, _, _| Ok(()));
        github
            .expect_set_required_signatures()
            .withf(|_, branch, enabled| branch == "release/v1.0" && *enabled)
            .times(1)
            .returning(|_, _, _| Ok(()));
        github
            .expect_unprotect_branch()
            .withf(|_, branch| branch == "old")
            .times(1)
            .returning(|_, _| Ok(()));

        let (ctx, log, _) = context(Environment::production(), Arc::new(github));
        let parsed = rules("main: {}\nreleases: {pattern: 'release/', required_signatures: true}");
        let mut changes = Vec::new();
        sync(&parsed, &ctx, &mut changes).unwrap();

        assert_eq!(
            changes,
            vec![
                "release/v1.0: set allow force push to false",
                "release/v1.0: set required signatures to true",
                "main: set allow force push to false",
                "old: remove branch protection (no longer matches any rules)",
            ]
        );
        assert!(log.messages(LogKind::Warn).is_empty());
    }

    #[test]
    fn sync_in_noop_only_reads() {
        let mut github = MockGitHubApi::new();
        github
            .expect_branches()
            .returning(|_| Ok(vec![branch("main", true), branch("legacy", true)]));
        github
            .expect_branch_protection()
            .returning(|_, _| Ok(Some(LiveProtection::default())));
        github.expect_protect_branch().never();
        github.expect_unprotect_branch().never();

        let (ctx, log, _) = context(Environment::noop(), Arc::new(github));
        let parsed = rules("main: {required_linear_history: true}\nghost: {}");
        let mut changes = Vec::new();
        sync(&parsed, &ctx, &mut changes).unwrap();

        assert_eq!(
            changes,
            vec![
                "main: set required linear history to true",
                "legacy: remove branch protection (no longer matches any rules)",
            ]
        );
        assert!(log.contains(LogKind::Noop, "legacy: remove branch protection"));
        assert!(log.contains(LogKind::Warn, "'ghost' does not match any existing branch"));
    }

    #[test]
    fn sync_with_no_rules_clears_all_protection() {
        let mut github = MockGitHubApi::new();
        github
            .expect_branches()
            .returning(|_| Ok(vec![branch("main", true)]));
        github
            .expect_unprotect_branch()
            .times(1)
            .returning(|_, _| Ok(()));
        let (ctx, _, _) = context(Environment::production(), Arc::new(github));
        let mut changes = Vec::new();
        sync(&[], &ctx, &mut changes).unwrap();
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn sync_propagates_api_failure() {
        let mut github = MockGitHubApi::new();
        github.expect_branches().returning(|_| {
            Err(crate::error::ServiceError::Status {
                method: "GET",
                url: "https://api.github.com/repos/apache/foo/branches".to_string(),
                status: 502,
            })
        });
        let (ctx, _, _) = context(Environment::production(), Arc::new(github));
        let err = sync(&rules("main: {}"), &ctx, &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("502"));
    }
}
