//! Command-line interface definition.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::config::environment::Environment;
use crate::engine::FeatureFilter;
use crate::error::EnvironmentError;

/// Top-level CLI entry point for the asfyaml engine.
#[derive(Parser, Debug)]
#[command(
    name = "asfyaml",
    about = "Apply a repository's .asf.yaml to its infrastructure",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Repository checkout to configure (defaults to the current directory)
    #[arg(long, global = true)]
    pub repo: Option<PathBuf>,

    /// Configuration document (defaults to <repo>/.asf.yaml)
    #[arg(short, long, global = true)]
    pub file: Option<PathBuf>,

    /// GitHub organisation owning the repository
    #[arg(long, global = true)]
    pub org: Option<String>,

    /// Tool settings file (defaults to $XDG_CONFIG_HOME/asfyaml/settings.toml)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,
}

impl GlobalOpts {
    /// Directory the repository is discovered from.
    #[must_use]
    pub fn repo_dir(&self) -> PathBuf {
        self.repo.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate the document and synchronise every configured feature
    Run(RunOpts),
    /// Validate the document without running any feature
    Validate(SelectionOpts),
    /// List the registered features
    Features,
    /// Print a shell completion script
    Completions(CompletionsOpts),
    /// Print version information
    Version,
}

impl Command {
    /// Name used for the log file of this invocation.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Run(_) => "run",
            Self::Validate(_) => "validate",
            Self::Features => "features",
            Self::Completions(_) => "completions",
            Self::Version => "version",
        }
    }
}

/// Environment and feature selection shared by `run` and `validate`.
#[derive(Parser, Debug, Clone, Default)]
pub struct SelectionOpts {
    /// Plan changes without applying them (runs in the noop environment)
    #[arg(short, long)]
    pub noop: bool,

    /// Environment granted to the run
    #[arg(short, long, conflicts_with = "noop")]
    pub environment: Option<String>,

    /// Skip specific features
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Run only specific features
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,
}

impl SelectionOpts {
    /// Environment the invocation grants before the document is consulted.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::InvalidName`] for a malformed
    /// `--environment`.
    pub fn base_environment(&self) -> Result<Environment, EnvironmentError> {
        self.environment
            .as_deref()
            .map_or_else(|| Ok(Environment::from_invocation(self.noop)), Environment::new)
    }

    /// The `--only` / `--skip` filter.
    #[must_use]
    pub fn filter(&self) -> FeatureFilter {
        FeatureFilter {
            only: self.only.clone(),
            skip: self.skip.clone(),
        }
    }
}

/// Options for the `run` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct RunOpts {
    /// Environment and feature selection.
    #[command(flatten)]
    pub selection: SelectionOpts,

    /// GitHub API token (falls back to ASFYAML_TOKEN, then GITHUB_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Treat the repository as private
    #[arg(long)]
    pub private: bool,
}

impl RunOpts {
    /// The API token from the command line or the environment.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("ASFYAML_TOKEN").ok())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Options for the `completions` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct CompletionsOpts {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_run_with_repo_and_file() {
        let cli = Cli::parse_from([
            "asfyaml",
            "--repo",
            "/src/foo",
            "run",
            "--file",
            "/tmp/x.yaml",
        ]);
        assert_eq!(cli.global.repo, Some(PathBuf::from("/src/foo")));
        assert_eq!(cli.global.file, Some(PathBuf::from("/tmp/x.yaml")));
        assert!(matches!(cli.command, Command::Run(_)));
    }

    #[test]
    fn parse_run_noop_short() {
        let cli = Cli::parse_from(["asfyaml", "run", "-n"]);
        let Command::Run(opts) = cli.command else {
            panic!("expected run");
        };
        assert!(opts.selection.noop);
        assert!(opts.selection.base_environment().unwrap().is_restricted());
    }

    #[test]
    fn noop_conflicts_with_environment() {
        let result = Cli::try_parse_from(["asfyaml", "run", "--noop", "--environment", "testing"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_run_environment() {
        let cli = Cli::parse_from(["asfyaml", "run", "--environment", "testing"]);
        let Command::Run(opts) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(
            opts.selection.base_environment().unwrap().as_str(),
            "testing"
        );
    }

    #[test]
    fn invalid_environment_is_rejected() {
        let opts = SelectionOpts {
            environment: Some("Prod".to_string()),
            ..SelectionOpts::default()
        };
        assert!(opts.base_environment().is_err());
    }

    #[test]
    fn default_environment_is_production() {
        let env = SelectionOpts::default().base_environment().unwrap();
        assert_eq!(env, Environment::production());
    }

    #[test]
    fn parse_run_only_and_skip() {
        let cli = Cli::parse_from(["asfyaml", "run", "--only", "github,notifications", "--skip", "publish"]);
        let Command::Run(opts) = cli.command else {
            panic!("expected run");
        };
        let filter = opts.selection.filter();
        assert_eq!(filter.only, vec!["github", "notifications"]);
        assert_eq!(filter.skip, vec!["publish"]);
    }

    #[test]
    fn parse_run_org_and_private() {
        let cli = Cli::parse_from(["asfyaml", "run", "--org", "example", "--private"]);
        assert_eq!(cli.global.org.as_deref(), Some("example"));
        let Command::Run(opts) = cli.command else {
            panic!("expected run");
        };
        assert!(opts.private);
    }

    #[test]
    fn explicit_token_wins() {
        let opts = RunOpts {
            token: Some("abc".to_string()),
            ..RunOpts::default()
        };
        assert_eq!(opts.token().as_deref(), Some("abc"));
    }

    #[test]
    fn parse_validate() {
        let cli = Cli::parse_from(["asfyaml", "validate", "--noop"]);
        assert!(matches!(cli.command, Command::Validate(ref s) if s.noop));
        assert_eq!(cli.command.name(), "validate");
    }

    #[test]
    fn parse_features_and_version() {
        assert!(matches!(
            Cli::parse_from(["asfyaml", "features"]).command,
            Command::Features
        ));
        assert!(matches!(
            Cli::parse_from(["asfyaml", "version"]).command,
            Command::Version
        ));
    }

    #[test]
    fn parse_completions() {
        let cli = Cli::parse_from(["asfyaml", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Command::Completions(CompletionsOpts { shell: Shell::Bash })
        ));
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::parse_from(["asfyaml", "-v", "features"]);
        assert!(cli.verbose);
    }
}
