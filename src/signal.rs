//! Shutdown plumbing: SIGTERM handling and process group termination.
//!
//! The SIGTERM handler does nothing but flip a [`ShutdownToken`]. The
//! supervising wait polls that token and, once it is set, the launched
//! application's process group is terminated through [`ProcessGroup`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;

/// Cooperative cancellation flag shared between the signal handler and
/// the supervising wait.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Token flipped by the SIGTERM handler. Set once, never freed.
static SIGTERM_TOKEN: OnceLock<ShutdownToken> = OnceLock::new();

extern "C" fn on_sigterm(_signum: nix::libc::c_int) {
    if let Some(token) = SIGTERM_TOKEN.get() {
        token.cancel();
    }
}

/// Install the SIGTERM handler that cancels `token`.
///
/// Whatever disposition SIGTERM had before is logged and replaced.
/// Only the first call installs anything; later calls are no-ops.
pub fn install_sigterm(token: &ShutdownToken) -> nix::Result<()> {
    if SIGTERM_TOKEN.set(token.clone()).is_err() {
        tracing::debug!("SIGTERM handler already installed");
        return Ok(());
    }

    let action = SigAction::new(
        SigHandler::Handler(on_sigterm),
        SaFlags::empty(),
        SigSet::empty(),
    );

    // SAFETY: the handler performs a single atomic store through a
    // token that lives in a static for the rest of the process.
    let previous = unsafe { signal::sigaction(Signal::SIGTERM, &action) }?;

    match previous.handler() {
        SigHandler::SigIgn => tracing::debug!("SIGTERM was being ignored"),
        SigHandler::SigDfl => tracing::debug!("SIGTERM was defaulted"),
        _ => tracing::debug!("SIGTERM had a custom handler, overriding it"),
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn sigterm_installed() -> bool {
    SIGTERM_TOKEN.get().is_some()
}

/// A process group that is sent SIGTERM at most once.
#[derive(Debug)]
pub struct ProcessGroup {
    pgid: Pid,
    signalled: AtomicBool,
}

impl ProcessGroup {
    /// The calling process's own group.
    pub fn own() -> Self {
        Self::new(Pid::from_raw(0))
    }

    pub fn new(pgid: Pid) -> Self {
        Self {
            pgid,
            signalled: AtomicBool::new(false),
        }
    }

    /// Send SIGTERM to every process in the group.
    ///
    /// Returns `true` on the call that sent the signal, `false` on every
    /// later call. Delivery failures are logged.
    pub fn terminate(&self) -> bool {
        if self.signalled.swap(true, Ordering::SeqCst) {
            return false;
        }

        tracing::debug!(pgid = %self.pgid, "killpg(SIGTERM)");
        if let Err(e) = signal::killpg(self.pgid, Signal::SIGTERM) {
            tracing::warn!(pgid = %self.pgid, error = %e, "killpg failed");
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn is_signalled(&self) -> bool {
        self.signalled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::{CommandExt, ExitStatusExt};
    use std::process::Command;

    #[test]
    fn token_starts_clear() {
        let token = ShutdownToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn token_clones_share_state() {
        let token = ShutdownToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn sigterm_cancels_installed_token() {
        install_sigterm(&ShutdownToken::new()).unwrap();
        // Orchestrator tests may have installed first; the first token wins.
        let installed = SIGTERM_TOKEN.get().expect("handler installed");

        let late = ShutdownToken::new();
        install_sigterm(&late).unwrap();
        assert!(sigterm_installed());

        signal::raise(Signal::SIGTERM).unwrap();
        assert!(installed.is_cancelled(), "handler should cancel the first token");
        assert!(!late.is_cancelled(), "later installs are no-ops");
    }

    #[test]
    fn terminate_signals_group_once() {
        let mut child = Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .expect("spawn sleep");
        let group = ProcessGroup::new(Pid::from_raw(child.id() as i32));

        assert!(!group.is_signalled());
        assert!(group.terminate(), "first terminate sends the signal");
        assert!(!group.terminate(), "second terminate is a no-op");
        assert!(group.is_signalled());

        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGTERM as i32));
    }
}
