//! Shell boundary: window manager and homescreen requests and events.

use serde::{Deserialize, Serialize};

use crate::bridge::SurfaceId;

/// Display area used when activating the application's window.
pub const AREA_NORMAL_FULL: &str = "normal.full";

/// Events pushed by the window manager and homescreen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShellEvent {
    /// The user tapped the application's shortcut on the homescreen.
    TapShortcut,
    /// The window manager waits for the role to finish drawing.
    SyncDraw,
    FlushDraw,
    Active,
    Inactive,
    Visible,
    Invisible,
    OnScreenMessage(String),
}

/// Requests this process makes of the shell.
///
/// Calls must not block: the orchestrator issues them while holding its
/// state lock.
pub trait Shell: Send + Sync {
    /// Associate `surface` with `role`.
    fn request_surface(&self, role: &str, surface: SurfaceId);

    /// Bring the window for `role` to the front of `area`.
    fn activate_window(&self, role: &str, area: &str);

    /// Report that `role` has finished drawing.
    fn end_draw(&self, role: &str);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ShellCall {
        RequestSurface(String, SurfaceId),
        ActivateWindow(String, String),
        EndDraw(String),
    }

    /// Records every call in order.
    #[derive(Debug, Default)]
    pub struct RecordingShell {
        calls: Mutex<Vec<ShellCall>>,
    }

    impl RecordingShell {
        pub fn calls(&self) -> Vec<ShellCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn activations(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, ShellCall::ActivateWindow(..)))
                .count()
        }

        fn push(&self, call: ShellCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl Shell for RecordingShell {
        fn request_surface(&self, role: &str, surface: SurfaceId) {
            self.push(ShellCall::RequestSurface(role.into(), surface));
        }

        fn activate_window(&self, role: &str, area: &str) {
            self.push(ShellCall::ActivateWindow(role.into(), area.into()));
        }

        fn end_draw(&self, role: &str) {
            self.push(ShellCall::EndDraw(role.into()));
        }
    }
}
