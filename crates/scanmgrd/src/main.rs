use std::io;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{error, info};

use scanmgr_config::Config;
use scanmgrd::{
    ListenerError, OmpConnectionHandler, PlaceholderBackend, PlaceholderRunner, SocketListener,
    TaskCoordinator, telemetry,
};

const MAIN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::main");

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("failed to install signal handler: {0}")]
    Signals(#[from] io::Error),
}

fn main() -> ExitCode {
    let config = Config::load();
    if telemetry::initialise(&config).is_err() {
        return ExitCode::FAILURE;
    }
    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(run_error) => {
            error!(target: MAIN_TARGET, error = %run_error, "daemon failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<(), RunError> {
    let backend = Arc::new(PlaceholderBackend);
    let coordinator = Arc::new(Mutex::new(TaskCoordinator::new(Box::new(
        PlaceholderRunner,
    ))));
    let listener = SocketListener::bind(&config.socket)?;
    let handler = Arc::new(OmpConnectionHandler::new(
        backend,
        coordinator,
        config.session_buffer,
    ));
    let handle = listener.start(handler)?;
    info!(
        target: MAIN_TARGET,
        endpoint = %config.socket,
        "scan manager daemon running"
    );

    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    if let Some(signal) = signals.forever().next() {
        info!(target: MAIN_TARGET, signal, "shutdown signal received");
    }
    handle.shutdown();
    handle.join()?;
    Ok(())
}
