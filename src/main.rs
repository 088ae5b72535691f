//! `asfyaml` binary entry point.
use std::process::ExitCode;
use std::sync::Arc;

use asfyaml_cli::cli::{Cli, Command};
use asfyaml_cli::{commands, logging};
use clap::Parser;

fn main() -> ExitCode {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();
    logging::init_subscriber(args.verbose, args.command.name());
    let log = Arc::new(logging::Logger::new(args.command.name()));

    let result = match &args.command {
        Command::Run(opts) => commands::run::run(&args.global, opts, &log),
        Command::Validate(opts) => commands::validate::run(&args.global, opts, &log),
        Command::Features => commands::features::run(),
        Command::Completions(opts) => {
            commands::completions::run(opts.shell);
            Ok(())
        }
        Command::Version => {
            commands::version::run();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log.error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
