//! Application framework launcher over the session bus.
//!
//! The framework's user daemon starts the application by id and
//! replies with a run id. The run id is the process group of the
//! started application, not necessarily the pid of its surface creator.

use zbus::{Connection, dbus_proxy};

use super::{LaunchError, LaunchHandle};

/// Proxy for the framework's per-user launcher service.
#[dbus_proxy(
    interface = "org.AGL.afm.user",
    default_service = "org.AGL.afm.user",
    default_path = "/org/AGL/afm/user"
)]
trait AfmUser {
    /// Start `app` and return its run id as a decimal string.
    #[dbus_proxy(name = "start")]
    async fn start(&self, app: &str) -> zbus::Result<String>;
}

/// Bus activation launch. Carries no state of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct AfmDbusLauncher;

impl AfmDbusLauncher {
    pub async fn launch(&self, app_id: &str) -> Result<LaunchHandle, LaunchError> {
        let conn = Connection::session().await.map_err(LaunchError::Bus)?;
        let proxy = AfmUserProxy::new(&conn).await.map_err(LaunchError::Bus)?;

        let reply = proxy.start(app_id).await.map_err(LaunchError::Send)?;
        tracing::debug!(reply = %reply, "dbus message get");

        let handle = parse_run_id(&reply)?;
        tracing::debug!(rid = %handle, "RID");
        Ok(handle)
    }
}

/// Parse the run id out of a `start` reply: a positive decimal integer
/// with nothing but whitespace around it.
pub fn parse_run_id(reply: &str) -> Result<LaunchHandle, LaunchError> {
    reply
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|rid| *rid > 0)
        .map(LaunchHandle::from_raw)
        .ok_or_else(|| LaunchError::Reply(reply.to_string()))
}
