#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Integration tests for the `validate` command.

mod common;

use std::sync::Arc;

use asfyaml_cli::cli::{GlobalOpts, SelectionOpts};
use asfyaml_cli::commands;
use asfyaml_cli::logging::Logger;
use common::{IntegrationTestContext, TestContextBuilder};

fn global_for(ctx: &IntegrationTestContext) -> GlobalOpts {
    GlobalOpts {
        repo: Some(ctx.root_path().to_path_buf()),
        settings: Some(ctx.write_settings()),
        ..GlobalOpts::default()
    }
}

#[test]
fn valid_document_passes_without_side_effects() {
    let ctx = TestContextBuilder::new()
        .with_document(
            "notifications:\n  commits: commits@foo.apache.org\ngithub:\n  protected_branches:\n    main:\n      required_signatures: true\n",
        )
        .build();
    let log = Arc::new(Logger::new("validate-test"));

    commands::validate::run(&global_for(&ctx), &SelectionOpts::default(), &log).unwrap();

    assert!(ctx.stored("notifications").is_none());
}

#[test]
fn every_error_is_counted() {
    let ctx = TestContextBuilder::new()
        .with_document(
            "notifications:\n  commits: nobody\n  jobs: 42\ngithub:\n  features:\n    wiki: sometimes\n",
        )
        .build();
    let log = Arc::new(Logger::new("validate-test"));

    let err =
        commands::validate::run(&global_for(&ctx), &SelectionOpts::default(), &log).unwrap_err();

    assert_eq!(err.to_string(), "3 validation error(s) in .asf.yaml");
}

#[test]
fn filtered_sections_are_not_validated() {
    let ctx = TestContextBuilder::new()
        .with_document("notifications:\n  commits: commits@foo.apache.org\ngithub:\n  labels: [NOT-LOWERCASE]\n")
        .build();
    let opts = SelectionOpts {
        skip: vec!["github".to_string()],
        ..SelectionOpts::default()
    };
    let log = Arc::new(Logger::new("validate-test"));

    commands::validate::run(&global_for(&ctx), &opts, &log).unwrap();
}

#[test]
fn malformed_yaml_is_reported() {
    let ctx = TestContextBuilder::new()
        .with_document("notifications: [unclosed\n")
        .build();
    let log = Arc::new(Logger::new("validate-test"));

    let err =
        commands::validate::run(&global_for(&ctx), &SelectionOpts::default(), &log).unwrap_err();

    assert!(format!("{err:#}").contains("malformed document .asf.yaml"), "{err:#}");
}

#[test]
fn invalid_environment_flag_is_rejected() {
    let ctx = TestContextBuilder::new().with_document("{}\n").build();
    let opts = SelectionOpts {
        environment: Some("Not Valid".to_string()),
        ..SelectionOpts::default()
    };
    let log = Arc::new(Logger::new("validate-test"));

    let err = commands::validate::run(&global_for(&ctx), &opts, &log).unwrap_err();
    assert!(err.to_string().contains("invalid environment name"));
}
