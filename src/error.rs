//! Top-level error. Anything that reaches `main` as an `Err` is fatal.

use thiserror::Error;

use crate::config::ConfigError;
use crate::ipc::IpcError;
use crate::launcher::LaunchError;

#[derive(Debug, Error)]
pub enum RunxdgError {
    #[error("error in config: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot launch XDG app ({app}): {source}")]
    Launch {
        app: String,
        #[source]
        source: LaunchError,
    },
    #[error("cannot setup HMI connection: {0}")]
    Ipc(#[from] IpcError),
    #[error("cannot register signal handler for SIGTERM: {0}")]
    Signal(#[from] nix::Error),
}
