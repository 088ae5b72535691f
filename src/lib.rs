//! Declarative repository configuration engine.
//!
//! A repository describes its desired infrastructure settings in a
//! `.asf.yaml` document at its root. Each top-level key addresses one
//! feature (mailing list routing, GitHub settings, website staging and
//! publishing); the engine validates every section against the feature's
//! schema and runs the features in priority order.
//!
//! The public API is organised into these layers:
//!
//! - **[`config`]**: parse the document, resolve the environment, validate sections
//! - **[`features`]**: the feature trait, registry and shipped features
//! - **[`services`]**: collaborators the features talk to (GitHub, settings store)
//! - **[`engine`]**: the orchestrator driving a run and its report
//! - **[`commands`]**: top-level subcommand orchestration (`run`, `validate`, `features`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod logging;
pub mod repository;
pub mod services;
pub mod settings;
