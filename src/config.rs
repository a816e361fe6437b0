//! Command line and session configuration

use std::path::PathBuf;

use clap::Parser;

use crate::pty::WindowSize;

/// TERM given to the shell when `--term` is absent
pub const DEFAULT_TERM: &str = "xterm";
pub const DEFAULT_ROWS: u16 = 100;
pub const DEFAULT_COLS: u16 = 80;

/// Relay a terminal to an interactive shell on a fresh PTY
#[derive(Debug, Parser)]
#[command(name = "ptyrelay", version, disable_help_flag = true)]
pub struct Cli {
    /// Print help
    #[arg(long)]
    pub help: bool,

    /// Run the built-in self-test and exit with its result
    #[arg(long)]
    pub ut: bool,

    /// TERM value for the shell, defaults to xterm
    #[arg(long, value_name = "NAME")]
    pub term: Option<String>,

    /// Initial window columns
    #[arg(long)]
    pub cols: Option<u16>,

    /// Initial window rows
    #[arg(long)]
    pub rows: Option<u16>,

    /// File receiving a copy of every relayed byte
    #[arg(long, value_name = "PATH")]
    pub log_ios: Option<PathBuf>,
}

/// What the binary should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Help,
    SelfTest,
    Run(Config),
}

impl Cli {
    /// Help wins over the self-test, which wins over running a session
    pub fn action(self) -> Action {
        if self.help {
            return Action::Help;
        }
        if self.ut {
            return Action::SelfTest;
        }

        let mut config = Config::default();
        if let Some(term) = self.term {
            config.term = term;
        }
        if let Some(cols) = self.cols {
            config.window.cols = cols;
        }
        if let Some(rows) = self.rows {
            config.window.rows = rows;
        }
        config.log_ios = self.log_ios;
        Action::Run(config)
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TERM value exported to the shell
    pub term: String,
    /// Initial window size of the PTY
    pub window: WindowSize,
    /// Where to log relayed bytes, if anywhere
    pub log_ios: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            term: DEFAULT_TERM.to_string(),
            window: WindowSize::new(DEFAULT_COLS, DEFAULT_ROWS),
            log_ios: None,
        }
    }
}
