//! runxdg: launch an XDG application and bind its surface to a shell role.
//!
//! Reads `runxdg.toml` from the application's install directory, starts
//! the configured executable, waits for the compositor to report a
//! surface created by it, and registers that surface with the window
//! manager under the configured role. Runs until the application exits
//! or SIGTERM arrives, in which case the whole process group is
//! terminated.

mod bridge;
mod config;
mod correlate;
mod error;
mod ipc;
mod launcher;
mod orchestrator;
mod shell;
mod signal;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::bridge::{INPUT_QUEUE_DEPTH, NotificationBridge};
use crate::config::{AppConfig, CONFIG_FILE_NAME, ConfigError};
use crate::error::RunxdgError;
use crate::ipc::protocol::HmiRequest;
use crate::launcher::Launcher;
use crate::orchestrator::Orchestrator;
use crate::signal::{ProcessGroup, ShutdownToken};

const DEFAULT_HMI_SOCKET: &str = "/run/runxdg/hmi.sock";

#[derive(Debug, Parser)]
#[command(name = "runxdg", version, about)]
struct Cli {
    /// Port of the HMI services.
    port: u16,

    /// Session token for the HMI services.
    token: String,

    /// Application id. Defaults to the program name.
    #[arg(long, env = "AFM_ID")]
    app_id: Option<String>,

    /// Directory holding runxdg.toml.
    #[arg(long, env = "AFM_APP_INSTALL_DIR")]
    install_dir: Option<PathBuf>,

    /// Explicit config file, overrides --install-dir.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Socket of the HMI proxy.
    #[arg(long, env = "RUNXDG_HMI_SOCKET", default_value = DEFAULT_HMI_SOCKET)]
    hmi_socket: PathBuf,
}

impl Cli {
    fn app_id(&self) -> String {
        match &self.app_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => std::env::args().next().unwrap_or_else(|| "runxdg".to_string()),
        }
    }

    fn config_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.config {
            return Ok(path.clone());
        }
        self.install_dir
            .as_ref()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigPath)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("runxdg=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), RunxdgError> {
    let app_id = cli.app_id();
    let app = AppConfig::load(&cli.config_path()?)?;
    tracing::info!(
        id = %app_id,
        role = %app.role,
        path = %app.path,
        method = %app.method,
        port = cli.port,
        "config loaded"
    );

    let launcher = Launcher::from_config(&app, cli.port, &cli.token);

    let init = HmiRequest::Init {
        port: cli.port,
        token: cli.token.clone(),
        role: app.role.clone(),
    };
    let (shell, pump) = ipc::connect(&cli.hmi_socket, &init).await?;

    let (tx, rx) = mpsc::channel(INPUT_QUEUE_DEPTH);
    tokio::spawn(pump.run(NotificationBridge::new(tx)));

    let mut orchestrator = Orchestrator::new(
        app.role,
        app_id,
        launcher,
        shell,
        ShutdownToken::new(),
        Arc::new(ProcessGroup::own()),
    );
    let handle = orchestrator.start().await?;
    tracing::debug!(handle = handle.as_raw(), phase = ?orchestrator.phase(), "launched");

    let phase = orchestrator.run(rx).await;
    tracing::debug!(?phase, "stopped");

    Ok(())
}
