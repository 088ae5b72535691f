#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing,
    clippy::panic
)]
//! Integration tests for the `run` command.
//!
//! These tests drive the shipped features through the orchestrator against a
//! real git checkout, a file-backed settings store and a recording GitHub
//! stand-in.

mod common;

use std::sync::Arc;

use asfyaml_cli::cli::{GlobalOpts, RunOpts};
use asfyaml_cli::commands;
use asfyaml_cli::config::environment::Environment;
use asfyaml_cli::engine::{Orchestrator, Outcome, RunStage};
use asfyaml_cli::error::AsfYamlError;
use asfyaml_cli::logging::{LogKind, Logger};
use common::{RecordingGitHub, TestContextBuilder};

const FULL_DOCUMENT: &str = "\
notifications:
  commits: commits@foo.apache.org
  issues: issues@foo.apache.org
  jira_options: link label
github:
  description: Apache Foo
  labels: [java, database]
  features:
    issues: false
  ghp_type: workflow
staging:
  profile: beta
publish: {}
jenkins:
  github_whitelist: [someone]
";

// ---------------------------------------------------------------------------
// Full pass
// ---------------------------------------------------------------------------

#[test]
fn production_run_applies_every_feature_in_order() {
    let ctx = TestContextBuilder::new().with_document(FULL_DOCUMENT).build();
    let github = Arc::new(RecordingGitHub::new());
    let (orchestrator, log) = ctx.orchestrator(Arc::clone(&github));
    let document = Orchestrator::load(&ctx.document_path()).unwrap();

    let report = orchestrator
        .run(&document, &Environment::production())
        .unwrap();

    let order: Vec<&str> = report.entries.iter().map(|e| e.feature.as_str()).collect();
    assert_eq!(order, vec!["notifications", "github", "staging", "publish"]);
    assert!(!report.has_failures());
    assert_eq!(report.counts().success, 4);

    assert_eq!(
        report.entry("github").unwrap().changes,
        vec![
            "set description to 'Apache Foo'",
            "disable issues",
            "set topics to java, database",
            "set GitHub Pages to type 'workflow'",
        ]
    );
    assert_eq!(
        github.calls(),
        vec![
            "update_repository apache/foo",
            "set_topics apache/foo java,database",
            "create_pages apache/foo workflow",
        ]
    );
    assert_eq!(
        report.entry("staging").unwrap().changes,
        vec!["stage main at https://foo-beta.staged.apache.org"]
    );
    assert_eq!(
        report.entry("publish").unwrap().changes,
        vec!["publish main at https://foo.apache.org"]
    );

    let routing = ctx.stored("notifications").unwrap();
    assert_eq!(routing["targets"]["commits"], "commits@foo.apache.org");
    assert_eq!(routing["jira_options"], serde_json::json!(["link", "label"]));
    assert_eq!(ctx.stored("publish").unwrap()["hostname"], "foo.apache.org");

    assert_eq!(report.warnings.len(), 1);
    assert!(log.contains(LogKind::Warn, "unknown feature 'jenkins'"));
}

#[test]
fn second_run_finds_nothing_to_record() {
    let ctx = TestContextBuilder::new()
        .with_document("notifications:\n  commits: commits@foo.apache.org\nstaging: {}\n")
        .build();
    let document = Orchestrator::load(&ctx.document_path()).unwrap();

    let (orchestrator, _) = ctx.orchestrator(Arc::new(RecordingGitHub::new()));
    let first = orchestrator
        .run(&document, &Environment::production())
        .unwrap();
    assert_eq!(first.entry("notifications").unwrap().changes.len(), 1);

    let second = orchestrator
        .run(&document, &Environment::production())
        .unwrap();
    for entry in &second.entries {
        assert!(entry.changes.is_empty(), "{} changed again", entry.feature);
    }
}

// ---------------------------------------------------------------------------
// Restricted runs
// ---------------------------------------------------------------------------

#[test]
fn noop_run_plans_without_side_effects() {
    let ctx = TestContextBuilder::new().with_document(FULL_DOCUMENT).build();
    let github = Arc::new(RecordingGitHub::new());
    let (orchestrator, log) = ctx.orchestrator(Arc::clone(&github));
    let document = Orchestrator::load(&ctx.document_path()).unwrap();

    let report = orchestrator.run(&document, &Environment::noop()).unwrap();

    assert!(report.environment.is_restricted());
    assert!(github.calls().is_empty());
    assert!(ctx.stored("notifications").is_none());
    assert!(ctx.stored("staging").is_none());
    assert_eq!(report.entry("github").unwrap().changes.len(), 4);
    assert!(log.contains(LogKind::Noop, "route commits to commits@foo.apache.org"));
}

#[test]
fn noop_invocation_refuses_production_document() {
    let ctx = TestContextBuilder::new()
        .with_document("meta:\n  environment: production\nnotifications:\n  commits: commits@foo.apache.org\n")
        .build();
    let (orchestrator, _) = ctx.orchestrator(Arc::new(RecordingGitHub::new()));
    let document = Orchestrator::load(&ctx.document_path()).unwrap();

    let err = orchestrator
        .run(&document, &Environment::noop())
        .unwrap_err();

    assert_eq!(err.stage, RunStage::EnvironmentResolved);
    assert!(matches!(err.source, AsfYamlError::Environment(_)));
    assert!(ctx.stored("notifications").is_none());
}

#[test]
fn testing_environment_excludes_publish() {
    let ctx = TestContextBuilder::new()
        .with_document("meta:\n  environment: testing\nstaging: {}\npublish: {}\n")
        .build();
    let (orchestrator, _) = ctx.orchestrator(Arc::new(RecordingGitHub::new()));
    let document = Orchestrator::load(&ctx.document_path()).unwrap();

    let report = orchestrator
        .run(&document, &Environment::production())
        .unwrap();

    assert_eq!(report.environment.as_str(), "testing");
    assert_eq!(
        report.entry("publish").unwrap().outcome,
        Outcome::Skipped("environment excluded".to_string())
    );
    assert_eq!(report.entry("staging").unwrap().outcome, Outcome::Success);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn github_failure_does_not_stop_later_features() {
    let ctx = TestContextBuilder::new().with_document(FULL_DOCUMENT).build();
    let (orchestrator, _) = ctx.orchestrator(Arc::new(RecordingGitHub::failing()));
    let document = Orchestrator::load(&ctx.document_path()).unwrap();

    let report = orchestrator
        .run(&document, &Environment::production())
        .unwrap();

    assert!(report.has_failures());
    let Outcome::Failed(err) = &report.entry("github").unwrap().outcome else {
        panic!("github should have failed");
    };
    assert_eq!(err.repository, "apache/foo");
    assert_eq!(err.environment, "production");
    assert!(err.message.contains("HTTP 502"), "{}", err.message);

    assert_eq!(report.entry("staging").unwrap().outcome, Outcome::Success);
    assert!(ctx.stored("staging").is_some());
    assert!(ctx.stored("notifications").is_some());
}

#[test]
fn partially_applied_feature_reports_what_went_through() {
    let ctx = TestContextBuilder::new()
        .with_document(
            "github:\n  description: Apache Foo\n  protected_branches:\n    main:\n      required_linear_history: true\n",
        )
        .build();
    let github = Arc::new(RecordingGitHub::failing_on("protect_branch"));
    let (orchestrator, _) = ctx.orchestrator(Arc::clone(&github));
    let document = Orchestrator::load(&ctx.document_path()).unwrap();

    let report = orchestrator
        .run(&document, &Environment::production())
        .unwrap();

    let entry = report.entry("github").unwrap();
    assert!(matches!(entry.outcome, Outcome::Failed(_)));
    assert_eq!(entry.changes, vec!["set description to 'Apache Foo'"]);
    assert_eq!(github.calls(), vec!["update_repository apache/foo"]);
}

#[test]
fn invalid_document_runs_nothing() {
    let ctx = TestContextBuilder::new()
        .with_document("notifications:\n  commits: not-an-address\ngithub:\n  labels: [Java]\n")
        .build();
    let github = Arc::new(RecordingGitHub::new());
    let (orchestrator, _) = ctx.orchestrator(Arc::clone(&github));
    let document = Orchestrator::load(&ctx.document_path()).unwrap();

    let err = orchestrator
        .run(&document, &Environment::production())
        .unwrap_err();

    assert_eq!(err.stage, RunStage::Validated);
    let AsfYamlError::Validation(errors) = &err.source else {
        panic!("expected validation errors, got {err}");
    };
    assert_eq!(errors.features(), vec!["notifications", "github"]);
    assert!(github.calls().is_empty());
    assert!(ctx.stored("notifications").is_none());
}

// ---------------------------------------------------------------------------
// Branch-dependent features
// ---------------------------------------------------------------------------

#[test]
fn autostage_branch_stages_under_its_own_profile() {
    let ctx = TestContextBuilder::new()
        .on_branch("site/preview")
        .with_document("staging:\n  autostage: site/*\npublish: {}\n")
        .build();
    let (orchestrator, _) = ctx.orchestrator(Arc::new(RecordingGitHub::new()));
    let document = Orchestrator::load(&ctx.document_path()).unwrap();

    let report = orchestrator
        .run(&document, &Environment::production())
        .unwrap();

    assert_eq!(
        report.entry("staging").unwrap().changes,
        vec!["stage site/preview at https://foo-preview.staged.apache.org"]
    );
    assert_eq!(
        report.entry("publish").unwrap().outcome,
        Outcome::Skipped("branch 'site/preview' is not 'main'".to_string())
    );
}

#[test]
fn podling_repository_stages_under_podling_name() {
    let ctx = TestContextBuilder::new()
        .with_name("incubator-bar-site")
        .with_document("staging: {}\n")
        .build();
    let (orchestrator, _) = ctx.orchestrator(Arc::new(RecordingGitHub::new()));
    let document = Orchestrator::load(&ctx.document_path()).unwrap();

    let report = orchestrator
        .run(&document, &Environment::production())
        .unwrap();

    assert_eq!(
        report.entry("staging").unwrap().changes,
        vec!["stage main at https://bar.staged.apache.org"]
    );
}

// ---------------------------------------------------------------------------
// Command entry point
// ---------------------------------------------------------------------------

#[test]
fn run_command_records_routing_in_configured_state_dir() {
    let ctx = TestContextBuilder::new()
        .with_document("notifications:\n  commits: commits@foo.apache.org\n")
        .build();
    let global = GlobalOpts {
        repo: Some(ctx.root_path().to_path_buf()),
        settings: Some(ctx.write_settings()),
        ..GlobalOpts::default()
    };
    let log = Arc::new(Logger::new("run-test"));

    commands::run::run(&global, &RunOpts::default(), &log).unwrap();

    let routing = ctx.stored("notifications").unwrap();
    assert_eq!(routing["targets"]["commits"], "commits@foo.apache.org");
}

#[test]
fn run_command_fails_on_missing_document() {
    let ctx = TestContextBuilder::new().build();
    let global = GlobalOpts {
        repo: Some(ctx.root_path().to_path_buf()),
        settings: Some(ctx.write_settings()),
        ..GlobalOpts::default()
    };
    let log = Arc::new(Logger::new("run-test"));

    let err = commands::run::run(&global, &RunOpts::default(), &log).unwrap_err();
    assert!(format!("{err:#}").contains(".asf.yaml"), "{err:#}");
}
