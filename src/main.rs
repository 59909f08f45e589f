// ~/shutdown-alert/src/main.rs

#![cfg_attr(windows, windows_subsystem = "windows")]
#![cfg_attr(not(windows), allow(dead_code))]

mod logging;
mod cli;
mod config;
mod error;
mod instance;
mod paths;
mod session;
mod singleton;
mod startup;
#[cfg(windows)]
mod win32;

use clap::Parser;
use std::process::ExitCode;

use crate::{
    cli::Cli,
    config::{load_user_config, UserConfig},
    paths::{default_config_path, error_log_file_path, log_file_path},
};

#[cfg(windows)]
use crate::{
    cli::{run_startup_command, Command},
    config::{APP_NAME, SINGLETON_LOCK_NAME, STARTUP_VALUE_NAME},
    error::AppError,
    instance::{forward_to_running, Delivery, InstanceRequest},
    logging::record_error,
    session::{
        controller::{PromptTexts, ShutdownQueryController},
        SessionHost, QUERY_END_SESSION,
    },
    singleton::SingletonGuard,
    startup::StartupRegistration,
    win32::{
        mutex::Win32NamedLock,
        registry::RunKey,
        shell::{show_message, Notice, Win32Shell},
        window::{
            install_session_hook, run_message_loop, uninstall_session_hook, HiddenWindow, Win32Instances,
            Win32SessionHost,
        },
    },
};

/// Resident interceptor: one hidden window, one hook, one message loop.
#[cfg(windows)]
pub struct ShutdownAlert {
    config: UserConfig,
    test_dialog: bool,
}

#[cfg(windows)]
impl ShutdownAlert {
    pub fn new(config: UserConfig, test_dialog: bool) -> Self {
        info!("Initializing ShutdownAlert");
        Self { config, test_dialog }
    }

    /// Runs until the user resolves a session-end query or the window goes away.
    /// Returns the message loop's exit code.
    pub fn run(&self) -> Result<i32, AppError> {
        let _guard = SingletonGuard::acquire(Win32NamedLock, SINGLETON_LOCK_NAME)?;

        let startup = StartupRegistration::new(RunKey, STARTUP_VALUE_NAME);
        if let Err(e) = startup.update_if_needed() {
            warn!("Startup entry left as is: {e}");
        }

        let window = HiddenWindow::create(APP_NAME)?;
        let controller = ShutdownQueryController::new(Box::new(Win32Shell), PromptTexts::from(&self.config));
        install_session_hook(window.id(), std::rc::Rc::new(controller))?;

        if self.test_dialog {
            info!("Posting a simulated session-end query");
            if let Err(e) = Win32SessionHost.post_message(window.id(), QUERY_END_SESSION) {
                warn!("Could not post the test query: {e}");
            }
        }

        info!("Entering message loop");
        let code = run_message_loop();
        info!("Message loop exited with {}", code);

        if let Err(e) = uninstall_session_hook(window.id()) {
            warn!("Could not remove the session hook: {e}");
        }
        Ok(code)
    }
}

fn load_config(cli: &Cli) -> (UserConfig, Option<String>) {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    match load_user_config(&path) {
        Ok(cfg) => (cfg, None),
        Err(e) => (UserConfig::default(), Some(e.to_string())),
    }
}

/// Logging comes up on the CLI flag first so loading the config is itself logged.
fn start_logging(cli: &Cli) -> (UserConfig, Option<String>) {
    logging::init(cli.debug, log_file_path(), error_log_file_path());

    let (config, problem) = load_config(cli);
    if config.debug_log {
        logging::raise_to_debug();
    }
    (config, problem)
}

#[cfg(windows)]
fn main() -> ExitCode {
    win32::attach_parent_console();

    let cli = Cli::parse();
    let code = run(cli);

    logging::shutdown();
    code
}

#[cfg(windows)]
fn run(cli: Cli) -> ExitCode {
    let (config, config_problem) = start_logging(&cli);
    info!("Shutdown Alert starting");

    if let Some(problem) = &config_problem {
        warn!("Using default settings: {problem}");
        record_error("config", "failed to load the config file", Some(problem), None);
    }

    if let Some(Command::Startup { action }) = cli.command {
        let sync = StartupRegistration::new(RunKey, STARTUP_VALUE_NAME);
        return match run_startup_command(&sync, action, &mut std::io::stdout()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{e}");
                record_error("startup", "startup command failed", Some(&e), None);
                ExitCode::FAILURE
            }
        };
    }

    // test-dialog and stop act on the resident copy. Only test-dialog falls back
    // to starting one here.
    if let Some(request) = cli.command.and_then(Command::instance_request) {
        match forward_to_running(&Win32Instances, request) {
            Ok(Delivery::Delivered(window)) => {
                println!("Sent {request:?} to the running {APP_NAME} (window {:#x})", window.0);
                return ExitCode::SUCCESS;
            }
            Ok(Delivery::NotRunning) if request == InstanceRequest::Stop => {
                println!("{APP_NAME} is not running");
                return ExitCode::SUCCESS;
            }
            Ok(Delivery::NotRunning) => {}
            Err(e) => {
                eprintln!("{e}");
                record_error("instance", "could not reach the running copy", Some(&e), None);
                return ExitCode::FAILURE;
            }
        }
    }

    if let Some(problem) = &config_problem {
        show_message(
            APP_NAME,
            &format!("The config file could not be loaded, default settings are used.\n\n{problem}"),
            Notice::Warning,
        );
    }

    let app = ShutdownAlert::new(config, cli.command == Some(Command::TestDialog));
    match app.run() {
        Ok(code) => {
            info!("Shutdown Alert exiting");
            if code == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE }
        }
        Err(e) if e.is_already_running() => {
            info!("{e}");
            show_message(APP_NAME, &format!("{APP_NAME} is already running."), Notice::Info);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Startup failed: {e}");
            record_error("main", "startup failed", Some(&e), None);
            show_message(APP_NAME, &format!("{APP_NAME} could not start.\n\n{e}"), Notice::Warning);
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(windows))]
fn main() -> ExitCode {
    let cli = Cli::parse();
    start_logging(&cli);

    let e = error::AppError::UnsupportedPlatform;
    error!("{e}");
    eprintln!("{e}");

    logging::shutdown();
    ExitCode::FAILURE
}
