// ~/shutdown-alert/src/cli.rs
// Command-line surface: resident mode by default, plus startup maintenance commands

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::{io::Write, path::PathBuf};

use crate::error::AppError;
use crate::instance::InstanceRequest;
use crate::startup::{RunKeyStore, StartupRegistration};
use crate::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Asks for confirmation before the session ends")]
pub struct Cli {
    /// Config file to use instead of config.yaml next to the executable.
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log INFO lines as well as warnings and errors.
    #[arg(long = "debug", action = ArgAction::SetTrue)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Inspect or change the run-at-login entry.
    Startup {
        #[arg(value_enum)]
        action: StartupAction,
    },
    /// Simulate a session-end query in the running copy, or start one that does.
    TestDialog,
    /// Ask the running copy to exit.
    Stop,
}

impl Command {
    /// Commands meant for the copy that is already resident.
    pub fn instance_request(self) -> Option<InstanceRequest> {
        match self {
            Command::TestDialog => Some(InstanceRequest::TestDialog),
            Command::Stop => Some(InstanceRequest::Stop),
            Command::Startup { .. } => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StartupAction {
    Status,
    Register,
    Unregister,
}

/// Runs one `startup` subcommand and reports the result on `out`.
pub fn run_startup_command<S: RunKeyStore>(
    sync: &StartupRegistration<S>,
    action: StartupAction,
    out: &mut impl Write,
) -> Result<(), AppError> {
    info!("CLI startup action: {:?}", action);
    match action {
        StartupAction::Status => {
            let state = if sync.is_registered() { "registered" } else { "not registered" };
            let _ = writeln!(out, "Run at login: {state}");
        }
        StartupAction::Register => {
            sync.register()?;
            let _ = writeln!(out, "Run at login: registered");
        }
        StartupAction::Unregister => {
            sync.unregister()?;
            let _ = writeln!(out, "Run at login: not registered");
        }
    }
    Ok(())
}
