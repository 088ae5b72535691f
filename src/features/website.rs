//! Website staging and publishing.
//!
//! Both features only record where the current branch is served from; the
//! web servers pick the record up from the state store.
use anyhow::{Result, bail};
use serde_json::json;
use serde_yaml::Value;

use super::{Feature, FeatureConfig, FeatureContext, FeatureResult};
use crate::config::schema::{Field, Schema};

/// Domain every staging site lives under.
pub const STAGING_DOMAIN: &str = "staged.apache.org";

const PROFILE: Schema = Schema::Matches {
    pattern: "[a-z0-9][a-z0-9-]*",
    description: "a profile name",
};

/// Typed `staging` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingConfig {
    /// Staging profile; the site stages at `<project>-<profile>`.
    pub profile: Option<String>,
    /// Branch allowed to stage.
    pub whoami: Option<String>,
    /// Subdirectory of the site to stage.
    pub subdir: Option<String>,
    /// Prefix of a `prefix/*` glob; matching branches stage under their own profile.
    pub autostage: Option<String>,
}

/// Typed `publish` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishConfig {
    /// Branch allowed to publish; the default branch when unset.
    pub whoami: Option<String>,
    /// Subdirectory of the site to publish.
    pub subdir: Option<String>,
    /// Public host name; `<project>.apache.org` when unset.
    pub hostname: Option<String>,
}

fn text(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

fn url(hostname: &str, subdir: Option<&str>) -> String {
    match subdir.map(|s| s.trim_matches('/')).filter(|s| !s.is_empty()) {
        Some(subdir) => format!("https://{hostname}/{subdir}"),
        None => format!("https://{hostname}"),
    }
}

fn is_valid_profile(profile: &str) -> bool {
    profile
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && profile
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Store `record` under `key` unless it is already there.
fn record(
    ctx: &FeatureContext,
    key: &str,
    record: &serde_json::Value,
    change: String,
) -> Result<FeatureResult> {
    let repo = ctx.repository.full_name();
    let store = &ctx.services.store;
    if store.load(&repo, key)?.as_ref() == Some(record) {
        ctx.log.debug(&format!("{key} target unchanged"));
        return Ok(FeatureResult::unchanged());
    }
    let changes = ctx.apply_all(vec![change], || {
        store.save(&repo, key, record)?;
        Ok(())
    })?;
    Ok(FeatureResult::Synced(changes))
}

/// The `staging` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct Staging;

impl Feature for Staging {
    fn name(&self) -> &str {
        "staging"
    }

    fn priority(&self) -> u8 {
        9
    }

    fn schema(&self) -> Schema {
        Schema::map([
            Field::optional("profile", Schema::nullable(PROFILE)),
            Field::optional("whoami", Schema::NonEmptyStr),
            Field::optional("subdir", Schema::Str),
            Field::optional(
                "autostage",
                Schema::Matches {
                    pattern: r"[^*\s]+/\*",
                    description: "a branch glob such as 'site/*'",
                },
            ),
        ])
    }

    fn parse(&self, raw: &Value) -> Result<FeatureConfig> {
        Ok(FeatureConfig::Staging(StagingConfig {
            profile: text(raw, "profile").filter(|p| !p.is_empty()),
            whoami: text(raw, "whoami"),
            subdir: text(raw, "subdir"),
            autostage: text(raw, "autostage")
                .map(|glob| glob.trim_end_matches('*').to_string()),
        }))
    }

    fn run(&self, config: &FeatureConfig, ctx: &FeatureContext) -> Result<FeatureResult> {
        let FeatureConfig::Staging(config) = config else {
            bail!("staging received configuration for another feature");
        };
        let Some(branch) = ctx.repository.branch.as_deref() else {
            return Ok(FeatureResult::Skipped("no branch checked out".to_string()));
        };

        let autostaged = config
            .autostage
            .as_deref()
            .and_then(|prefix| branch.strip_prefix(prefix))
            .filter(|suffix| !suffix.is_empty());

        let profile = match (autostaged, config.whoami.as_deref()) {
            (Some(suffix), _) => {
                if !is_valid_profile(suffix) {
                    bail!("branch '{branch}' cannot be autostaged: '{suffix}' is not a valid profile name");
                }
                Some(suffix.to_string())
            }
            (None, Some(whoami)) if whoami != branch => {
                return Ok(FeatureResult::Skipped(format!(
                    "branch '{branch}' is not '{whoami}'"
                )));
            }
            (None, None) if config.autostage.is_some() => {
                return Ok(FeatureResult::Skipped(format!(
                    "branch '{branch}' does not match autostage"
                )));
            }
            (None, _) => config.profile.clone(),
        };

        let project = &ctx.repository.project;
        let hostname = match &profile {
            Some(profile) => format!("{project}-{profile}.{STAGING_DOMAIN}"),
            None => format!("{project}.{STAGING_DOMAIN}"),
        };
        let target = url(&hostname, config.subdir.as_deref());
        let entry = json!({
            "branch": branch,
            "hostname": hostname,
            "subdir": config.subdir,
            "profile": profile,
        });
        record(ctx, "staging", &entry, format!("stage {branch} at {target}"))
    }
}

/// The `publish` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct Publish;

impl Feature for Publish {
    fn name(&self) -> &str {
        "publish"
    }

    fn priority(&self) -> u8 {
        9
    }

    fn environments(&self) -> &[&'static str] {
        &["production", "noop"]
    }

    fn schema(&self) -> Schema {
        Schema::map([
            Field::optional("whoami", Schema::NonEmptyStr),
            Field::optional("subdir", Schema::Str),
            Field::optional("hostname", Schema::NonEmptyStr),
        ])
    }

    fn parse(&self, raw: &Value) -> Result<FeatureConfig> {
        let hostname = text(raw, "hostname");
        if let Some(host) = &hostname
            && host != "apache.org"
            && !host.ends_with(".apache.org")
        {
            bail!("hostname '{host}' is not apache.org or one of its subdomains");
        }
        Ok(FeatureConfig::Publish(PublishConfig {
            whoami: text(raw, "whoami"),
            subdir: text(raw, "subdir"),
            hostname,
        }))
    }

    fn run(&self, config: &FeatureConfig, ctx: &FeatureContext) -> Result<FeatureResult> {
        let FeatureConfig::Publish(config) = config else {
            bail!("publish received configuration for another feature");
        };
        let Some(branch) = ctx.repository.branch.as_deref() else {
            return Ok(FeatureResult::Skipped("no branch checked out".to_string()));
        };
        let whoami = config
            .whoami
            .as_deref()
            .unwrap_or_else(|| ctx.repository.default_branch_or_main());
        if whoami != branch {
            return Ok(FeatureResult::Skipped(format!(
                "branch '{branch}' is not '{whoami}'"
            )));
        }

        let hostname = config
            .hostname
            .clone()
            .unwrap_or_else(|| format!("{}.apache.org", ctx.repository.project));
        let target = url(&hostname, config.subdir.as_deref());
        let entry = json!({
            "branch": branch,
            "hostname": hostname,
            "subdir": config.subdir,
        });
        record(ctx, "publish", &entry, format!("publish {branch} at {target}"))
    }
}
