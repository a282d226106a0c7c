//! POSIX launcher: fork/exec the configured executable and reap it.

use std::ffi::{CString, c_char};

use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};

use super::{LaunchError, LaunchHandle, SUPERVISE_POLL};
use crate::signal::{ProcessGroup, ShutdownToken};

/// Direct child launch. The handle is the child's pid.
#[derive(Debug, Clone)]
pub struct PosixLauncher {
    args: Vec<String>,
    child: Option<Pid>,
}

impl PosixLauncher {
    /// `args[0]` is the executable path.
    pub fn new(args: Vec<String>) -> Self {
        Self { args, child: None }
    }

    #[cfg(test)]
    pub(crate) fn adopt(args: Vec<String>, child: Pid) -> Self {
        Self {
            args,
            child: Some(child),
        }
    }

    #[cfg(test)]
    pub(crate) fn args(&self) -> &[String] {
        &self.args
    }

    fn program(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("<unknown>")
    }

    /// Fork and exec `args[0]` with `args` as its argument vector.
    ///
    /// The child stays in this process's group. If exec fails the child
    /// writes a message to stderr and exits with status 127.
    pub fn launch(&mut self) -> Result<LaunchHandle, LaunchError> {
        let argv = self
            .args
            .iter()
            .map(|arg| CString::new(arg.as_str()).map_err(|_| LaunchError::InvalidArgument(arg.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        if argv.is_empty() {
            return Err(LaunchError::EmptyArgs);
        }
        // Everything the child touches is built before fork; it must not
        // allocate.
        let argv_ptrs: Vec<*const c_char> = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect();
        let exec_failed = format!("ERROR: fail to execve({})\n", self.program());

        // SAFETY: between fork and exec the child only calls execv,
        // write and _exit, none of which allocate.
        match unsafe { fork() }.map_err(LaunchError::Fork)? {
            ForkResult::Child => exec_child(&argv_ptrs, exec_failed.as_bytes()),
            ForkResult::Parent { child } => {
                tracing::debug!(pid = %child, program = self.program(), "launched");
                self.child = Some(child);
                Ok(LaunchHandle::from(child))
            }
        }
    }

    /// Wait for the child to exit, polling `token` between checks.
    ///
    /// `EINTR` is retried. Any other wait failure ends supervision as if
    /// the child had exited. If `token` was cancelled, `group` is
    /// terminated on the way out.
    pub fn supervise(&self, token: &ShutdownToken, group: &ProcessGroup) {
        let Some(child) = self.child else {
            tracing::warn!("supervise called before launch");
            return;
        };
        let program = self.program();

        while !token.is_cancelled() {
            match waitpid(child, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => std::thread::sleep(SUPERVISE_POLL),
                Ok(WaitStatus::Exited(_, code)) => {
                    tracing::info!(program, code, "application terminated");
                    break;
                }
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    tracing::info!(program, ?signal, "application terminated by signal");
                    break;
                }
                Ok(status) => tracing::debug!(?status, "child state changed"),
                Err(Errno::EINTR) => {
                    tracing::debug!("catch EINTR while waitpid()");
                }
                Err(e) => {
                    tracing::warn!(pid = %child, error = %e, "waitpid failed");
                    break;
                }
            }
        }

        if token.is_cancelled() {
            group.terminate();
        }
    }
}

/// `argv` is NULL-terminated and its first entry is the executable.
fn exec_child(argv: &[*const c_char], exec_failed: &[u8]) -> ! {
    // SAFETY: the pointers refer to CStrings built before fork, still
    // present in the child's copy of the address space.
    unsafe { nix::libc::execv(argv[0], argv.as_ptr()) };
    let _ = nix::unistd::write(std::io::stderr(), exec_failed);
    // SAFETY: _exit is async-signal-safe and skips the parent's atexit
    // handlers and stdio buffers.
    unsafe { nix::libc::_exit(127) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;
    use std::os::unix::process::{CommandExt, ExitStatusExt};
    use std::process::Command;
    use std::time::Duration;

    fn sh(script: &str) -> PosixLauncher {
        PosixLauncher::new(vec!["/bin/sh".into(), "-c".into(), script.into()])
    }

    #[test]
    fn launch_returns_child_pid() {
        let mut launcher = sh("exit 0");
        let handle = launcher.launch().unwrap();
        assert!(handle.as_raw() > 0);
        assert_ne!(handle.as_pid(), Pid::this());

        let token = ShutdownToken::new();
        let group = ProcessGroup::own();
        launcher.supervise(&token, &group);
        assert!(!group.is_signalled());
    }

    #[test]
    fn supervise_returns_when_child_exits() {
        let mut launcher = sh("sleep 0.2; exit 3");
        launcher.launch().unwrap();

        let token = ShutdownToken::new();
        let group = ProcessGroup::own();
        launcher.supervise(&token, &group);

        assert!(!token.is_cancelled());
        assert!(!group.is_signalled(), "a normal exit must not signal the group");
    }

    #[test]
    fn exec_failure_exits_child() {
        let mut launcher = PosixLauncher::new(vec!["/nonexistent/runxdg-test-app".into()]);
        let handle = launcher.launch().expect("fork itself succeeds");

        let status = waitpid(handle.as_pid(), None).unwrap();
        assert_eq!(status, WaitStatus::Exited(handle.as_pid(), 127));
    }

    #[test]
    fn child_receives_full_argument_vector() {
        // $0 is "sh", so two further arguments reach the script.
        let mut launcher = PosixLauncher::new(vec![
            "/bin/sh".into(),
            "-c".into(),
            "exit $#".into(),
            "sh".into(),
            "first".into(),
            "second".into(),
        ]);
        let handle = launcher.launch().unwrap();

        let status = waitpid(handle.as_pid(), None).unwrap();
        assert_eq!(status, WaitStatus::Exited(handle.as_pid(), 2));
    }

    #[test]
    fn empty_args_fail() {
        let mut launcher = PosixLauncher::new(Vec::new());
        assert!(matches!(launcher.launch(), Err(LaunchError::EmptyArgs)));
    }

    #[test]
    fn nul_byte_argument_fails() {
        let mut launcher = PosixLauncher::new(vec!["/bin/true".into(), "a\0b".into()]);
        assert!(matches!(
            launcher.launch(),
            Err(LaunchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn cancel_terminates_group_once() {
        // Own process group so the SIGTERM never reaches the test runner.
        let mut child = Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .expect("spawn sleep");
        let pid = Pid::from_raw(child.id() as i32);
        let launcher = PosixLauncher::adopt(vec!["sleep".into(), "30".into()], pid);

        let token = ShutdownToken::new();
        let canceller = token.clone();
        let group = ProcessGroup::new(pid);

        let waker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            canceller.cancel();
        });
        launcher.supervise(&token, &group);
        waker.join().unwrap();

        assert!(group.is_signalled());
        assert!(!group.terminate(), "group must only be signalled once");

        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGTERM as i32));
    }
}
