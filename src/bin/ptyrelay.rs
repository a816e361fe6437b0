//! Ptyrelay
//!
//! Spawns an interactive shell on a PTY and relays this process's
//! stdin/stdout to it until the session fails.

use std::io;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ptyrelay::{selftest, Action, Cli};

fn main() -> ExitCode {
    // Logs go to stderr so stdout stays the shell's byte stream
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let result = match Cli::parse().action() {
        Action::Help => {
            let _ = Cli::command().print_help();
            return ExitCode::FAILURE;
        },
        Action::SelfTest => selftest::run(),
        Action::Run(config) => ptyrelay::run(&config).map(|never| match never {}),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatal error: {}", e);
            ExitCode::FAILURE
        },
    }
}
