//! Mailing list routing for repository events.
//!
//! ```yaml
//! notifications:
//!   commits: commits@foo.apache.org
//!   issues: issues@foo.apache.org
//!   pullrequests: dev@foo.apache.org
//!   jira_options: link label
//! ```
use std::collections::BTreeMap;

use anyhow::{Context as _, Result, bail};
use serde_json::json;
use serde_yaml::Value;

use super::{Feature, FeatureConfig, FeatureContext, FeatureResult};
use crate::config::schema::{Field, Schema};

/// Event categories that can be routed to a list.
pub const TARGET_KEYS: &[&str] = &[
    "commits",
    "issues",
    "pullrequests",
    "issues_status",
    "issues_comment",
    "pullrequests_status",
    "pullrequests_comment",
    "discussions",
    "jobs",
];

/// Accepted words in `jira_options`.
pub const JIRA_OPTIONS: &[&str] = &["link", "label", "comment", "worklog"];

/// Store key of the routing table.
pub const STORE_KEY: &str = "notifications";

/// Routing table: event category to list address, plus Jira bridge options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationsConfig {
    /// Category to address.
    pub targets: BTreeMap<String, String>,
    /// Jira bridge options, deduplicated in declaration order.
    pub jira_options: Vec<String>,
}

impl NotificationsConfig {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "targets": self.targets,
            "jira_options": self.jira_options,
        })
    }

    fn from_json(value: &serde_json::Value) -> Result<Self> {
        let targets = value
            .get("targets")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .context("stored routing table is malformed")?
            .unwrap_or_default();
        let jira_options = value
            .get("jira_options")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .context("stored jira options are malformed")?
            .unwrap_or_default();
        Ok(Self {
            targets,
            jira_options,
        })
    }
}

/// The `notifications` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct Notifications;

fn is_apache_list(address: &str) -> bool {
    address
        .rsplit_once('@')
        .is_some_and(|(_, domain)| domain == "apache.org" || domain.ends_with(".apache.org"))
}

impl Feature for Notifications {
    fn name(&self) -> &str {
        "notifications"
    }

    fn priority(&self) -> u8 {
        0
    }

    fn schema(&self) -> Schema {
        let mut fields: Vec<Field> = TARGET_KEYS
            .iter()
            .map(|key| Field::optional(*key, Schema::Email))
            .collect();
        fields.push(Field::optional("jira_options", Schema::Str));
        Schema::Map(fields)
    }

    fn parse(&self, raw: &Value) -> Result<FeatureConfig> {
        let mut config = NotificationsConfig::default();
        for key in TARGET_KEYS {
            if let Some(address) = raw.get(*key).and_then(Value::as_str) {
                if !is_apache_list(address) {
                    bail!("{key}: '{address}' is not an apache.org mailing list");
                }
                config.targets.insert((*key).to_string(), address.to_string());
            }
        }
        if let Some(options) = raw.get("jira_options").and_then(Value::as_str) {
            for option in options.split_whitespace() {
                if !JIRA_OPTIONS.contains(&option) {
                    bail!(
                        "jira_options: unknown option '{option}' (allowed: {})",
                        JIRA_OPTIONS.join(", ")
                    );
                }
                if !config.jira_options.iter().any(|o| o == option) {
                    config.jira_options.push(option.to_string());
                }
            }
        }
        Ok(FeatureConfig::Notifications(config))
    }

    fn run(&self, config: &FeatureConfig, ctx: &FeatureContext) -> Result<FeatureResult> {
        let FeatureConfig::Notifications(wanted) = config else {
            bail!("notifications received configuration for another feature");
        };
        let repo = ctx.repository.full_name();
        let store = &ctx.services.store;

        let current = match store.load(&repo, STORE_KEY)? {
            Some(value) => NotificationsConfig::from_json(&value)?,
            None => NotificationsConfig::default(),
        };

        let mut changes = Vec::new();
        for (key, address) in &wanted.targets {
            if current.targets.get(key) != Some(address) {
                changes.push(format!("route {key} to {address}"));
            }
        }
        for key in current.targets.keys() {
            if !wanted.targets.contains_key(key) {
                changes.push(format!("stop routing {key}"));
            }
        }
        if current.jira_options != wanted.jira_options {
            changes.push(format!("set jira options to '{}'", wanted.jira_options.join(" ")));
        }

        if changes.is_empty() {
            ctx.log.debug("notification routing unchanged");
        }
        let changes = ctx.apply_all(changes, || {
            store.save(&repo, STORE_KEY, &wanted.to_json())?;
            Ok(())
        })?;
        Ok(FeatureResult::Synced(changes))
    }
}
