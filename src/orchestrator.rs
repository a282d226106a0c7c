//! Orchestrator: launch, wait for our surface, activate, supervise.
//!
//! Surface and shell events arrive on one input queue and are applied
//! one at a time. The state they touch (surface table, correlator and
//! pending-activation flag) sits behind a single mutex, so the handlers
//! are also safe to call from other threads directly.
//!
//! Phases run `Idle → Launching → AwaitingSurface → Active → Terminating`.
//! Losing a surface does not leave `Active`; only the supervising wait
//! decides that the application is gone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nix::unistd::Pid;
use tokio::sync::mpsc;

use crate::bridge::{Input, SurfaceEvent, SurfaceId};
use crate::correlate::Correlator;
use crate::error::RunxdgError;
use crate::launcher::{LaunchHandle, Launcher};
use crate::shell::{AREA_NORMAL_FULL, Shell, ShellEvent};
use crate::signal::{self, ProcessGroup, ShutdownToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Launching,
    AwaitingSurface,
    Active,
    Terminating,
}

struct Tracker {
    phase: Phase,
    handle: Option<LaunchHandle>,
    correlator: Correlator,
    /// Creator pid → live surface id, for every surface seen.
    surfaces: HashMap<Pid, SurfaceId>,
    /// Set at launch, cleared on the first correlated surface. While
    /// set, a shortcut tap may have been dropped by the shell.
    pending_activation: bool,
}

pub struct Orchestrator<S> {
    role: String,
    app_id: String,
    launcher: Launcher,
    shell: S,
    token: ShutdownToken,
    group: Arc<ProcessGroup>,
    tracker: Mutex<Tracker>,
}

impl<S: Shell> Orchestrator<S> {
    pub fn new(
        role: String,
        app_id: String,
        launcher: Launcher,
        shell: S,
        token: ShutdownToken,
        group: Arc<ProcessGroup>,
    ) -> Self {
        let correlator = launcher.correlator();
        Self {
            role,
            app_id,
            launcher,
            shell,
            token,
            group,
            tracker: Mutex::new(Tracker {
                phase: Phase::Idle,
                handle: None,
                correlator,
                surfaces: HashMap::new(),
                pending_activation: false,
            }),
        }
    }

    #[cfg(test)]
    fn with_correlator(self, correlator: Correlator) -> Self {
        self.lock().correlator = correlator;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Tracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    #[cfg(test)]
    fn shell(&self) -> &S {
        &self.shell
    }

    /// Install the SIGTERM handler, then launch the application.
    pub async fn start(&mut self) -> Result<LaunchHandle, RunxdgError> {
        signal::install_sigterm(&self.token)?;

        self.lock().phase = Phase::Launching;
        tracing::info!(app = %self.app_id, method = %self.launcher.method(), "launching");

        let handle = self
            .launcher
            .launch(&self.app_id)
            .await
            .map_err(|source| RunxdgError::Launch {
                app: self.app_id.clone(),
                source,
            })?;
        self.on_launched(handle);
        Ok(handle)
    }

    fn on_launched(&self, handle: LaunchHandle) {
        let mut tracker = self.lock();
        tracker.handle = Some(handle);
        tracker.correlator.bind(handle);
        tracker.pending_activation = true;
        tracker.phase = Phase::AwaitingSurface;
        tracing::debug!(handle = %handle, "waiting for notification: surface created");

        // The application may already have a surface up.
        let existing = tracker
            .correlator
            .resolve(handle)
            .and_then(|pid| tracker.surfaces.get(&pid).copied());
        if let Some(surface) = existing {
            tracing::debug!(surface, role = %self.role, "surface already exists");
            self.setup_surface(&mut tracker, surface);
        }
    }

    pub fn dispatch(&self, input: Input) {
        match input {
            Input::Surface(event) => self.handle_surface(event),
            Input::Shell(event) => self.handle_shell(&event),
        }
    }

    /// Apply a surface creation or destruction.
    ///
    /// The surface table is updated whether or not the creator is ours.
    pub fn handle_surface(&self, event: SurfaceEvent) {
        let SurfaceEvent {
            surface,
            creator_pid: pid,
            created,
        } = event;
        let mut tracker = self.lock();

        if !created {
            tracing::debug!(surface, pid = %pid, "ivi surface destroyed");
            tracker.correlator.unregister_creator(pid);
            tracker.surfaces.remove(&pid);
            return;
        }

        tracing::debug!(surface, pid = %pid, "ivi surface created");
        tracker.correlator.register_creator(pid);
        if let Some(handle) = tracker.handle {
            if tracker.correlator.resolve(handle) == Some(pid) {
                tracing::debug!(pid = %pid, handle = %handle, "match");
                self.setup_surface(&mut tracker, surface);
            }
        }
        tracker.surfaces.insert(pid, surface);
    }

    pub fn handle_shell(&self, event: &ShellEvent) {
        match event {
            ShellEvent::TapShortcut => {
                tracing::debug!(role = %self.role, "activate surface");
                self.shell.activate_window(&self.role, AREA_NORMAL_FULL);
            }
            ShellEvent::SyncDraw => {
                tracing::debug!("got sync draw");
                self.shell.end_draw(&self.role);
            }
            ShellEvent::OnScreenMessage(message) => {
                tracing::debug!(message = %message, "got on-screen message");
            }
            other => tracing::debug!(event = ?other, "shell event"),
        }
    }

    fn setup_surface(&self, tracker: &mut Tracker, surface: SurfaceId) {
        tracing::debug!(role = %self.role, surface, "request surface");
        self.shell.request_surface(&self.role, surface);
        tracker.phase = Phase::Active;

        if std::mem::take(&mut tracker.pending_activation) {
            // Replays a first-launch shortcut tap the shell dropped
            // because no surface existed yet.
            self.shell.activate_window(&self.role, AREA_NORMAL_FULL);
        }
    }

    /// Apply inputs until the application exits or shutdown is requested.
    ///
    /// Supervision runs on a blocking thread; inputs are applied on this
    /// task in arrival order. On shutdown the process group is
    /// terminated. Returns the final phase.
    pub async fn run(&self, mut inputs: mpsc::Receiver<Input>) -> Phase {
        let launcher = self.launcher.clone();
        let token = self.token.clone();
        let group = Arc::clone(&self.group);
        let mut supervision =
            tokio::task::spawn_blocking(move || launcher.supervise(&token, &group));

        let mut inputs_open = true;
        loop {
            tokio::select! {
                joined = &mut supervision => {
                    if let Err(e) = joined {
                        tracing::warn!(error = %e, "supervising task failed");
                    }
                    break;
                }
                input = inputs.recv(), if inputs_open => match input {
                    Some(input) => self.dispatch(input),
                    None => {
                        tracing::debug!("input queue closed");
                        inputs_open = false;
                    }
                },
            }
        }

        let mut tracker = self.lock();
        if self.token.is_cancelled() {
            tracker.phase = Phase::Terminating;
            drop(tracker);
            self.group.terminate();
            tracing::info!("terminated by signal");
            return Phase::Terminating;
        }
        tracing::info!(app = %self.app_id, "application exited");
        tracker.phase
    }
}
