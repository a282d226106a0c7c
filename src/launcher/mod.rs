//! Launchers: start the target application and watch it.
//!
//! Each backend yields a [`LaunchHandle`] that later surface creators are
//! matched against, and knows how to wait for the application it
//! started. Correlation is backend-specific too; see
//! [`Launcher::correlator`].

mod afm;
mod posix;

use std::time::Duration;

use nix::unistd::Pid;
use thiserror::Error;

use crate::config::{AppConfig, LaunchMethod};
use crate::correlate::Correlator;
use crate::signal::{ProcessGroup, ShutdownToken};

pub use afm::AfmDbusLauncher;
pub use posix::PosixLauncher;

/// How often the supervising wait rechecks the shutdown token.
pub(crate) const SUPERVISE_POLL: Duration = Duration::from_millis(100);

/// Identifier of the run this process is responsible for.
///
/// For a POSIX launch this is the child's pid. For bus activation it is
/// the framework's run id, which is not necessarily a kernel pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchHandle(i32);

impl LaunchHandle {
    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> i32 {
        self.0
    }

    /// The handle read as a pid (or process group id).
    pub fn as_pid(self) -> Pid {
        Pid::from_raw(self.0)
    }
}

impl From<Pid> for LaunchHandle {
    fn from(pid: Pid) -> Self {
        Self(pid.as_raw())
    }
}

impl std::fmt::Display for LaunchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Launch error. Always fatal; there is no retry.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("empty argument vector")]
    EmptyArgs,
    #[error("argument contains a NUL byte: {0:?}")]
    InvalidArgument(String),
    #[error("cannot fork(): {0}")]
    Fork(#[source] nix::Error),
    #[error("failed to get session bus: {0}")]
    Bus(#[source] zbus::Error),
    #[error("unable to send message: {0}")]
    Send(#[source] zbus::Error),
    #[error("unparsable run id in reply: {0:?}")]
    Reply(String),
    #[error("{0} launcher is not implemented")]
    Unsupported(LaunchMethod),
}

/// Launch backend.
#[derive(Debug, Clone)]
pub enum Launcher {
    Posix(PosixLauncher),
    AfmDbus(AfmDbusLauncher),
    AfmWebSocket,
}

impl Launcher {
    /// Build the backend named by the config. Only POSIX consumes the
    /// params; the framework backends start the application by id.
    pub fn from_config(app: &AppConfig, port: u16, token: &str) -> Self {
        match app.method {
            LaunchMethod::Posix => Self::Posix(PosixLauncher::new(app.argv(port, token))),
            LaunchMethod::AfmDbus => Self::AfmDbus(AfmDbusLauncher),
            LaunchMethod::AfmWebSocket => Self::AfmWebSocket,
        }
    }

    pub fn method(&self) -> LaunchMethod {
        match self {
            Self::Posix(_) => LaunchMethod::Posix,
            Self::AfmDbus(_) => LaunchMethod::AfmDbus,
            Self::AfmWebSocket => LaunchMethod::AfmWebSocket,
        }
    }

    /// Start the application identified by `app_id`.
    pub async fn launch(&mut self, app_id: &str) -> Result<LaunchHandle, LaunchError> {
        match self {
            Self::Posix(posix) => posix.launch(),
            Self::AfmDbus(afm) => afm.launch(app_id).await,
            Self::AfmWebSocket => Err(LaunchError::Unsupported(LaunchMethod::AfmWebSocket)),
        }
    }

    /// Block until the application exits or `token` is cancelled.
    ///
    /// Only a POSIX child's exit is observable; the framework backends
    /// wait on the token alone. A POSIX wait cancelled by the token
    /// terminates `group` before returning.
    pub fn supervise(&self, token: &ShutdownToken, group: &ProcessGroup) {
        match self {
            Self::Posix(posix) => posix.supervise(token, group),
            Self::AfmDbus(_) | Self::AfmWebSocket => wait_for_cancellation(token),
        }
    }

    /// A fresh correlator using this backend's notion of identity.
    pub fn correlator(&self) -> Correlator {
        match self {
            Self::Posix(_) => Correlator::direct(),
            Self::AfmDbus(_) | Self::AfmWebSocket => Correlator::by_process_group(),
        }
    }
}

fn wait_for_cancellation(token: &ShutdownToken) {
    while !token.is_cancelled() {
        std::thread::sleep(SUPERVISE_POLL);
    }
}
