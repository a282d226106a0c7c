//! Notification bridge: compositor control notifications to orchestrator input.
//!
//! The compositor reports surface and layer creation and destruction.
//! Only surfaces matter here: the bridge looks up the surface's creator
//! pid and queues a [`SurfaceEvent`]. It does no correlation itself.

use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::shell::ShellEvent;

/// Compositor-assigned surface id.
pub type SurfaceId = u32;

/// Depth of the orchestrator's input queue.
pub const INPUT_QUEUE_DEPTH: usize = 64;

/// Kind of object a control notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Surface,
    Layer,
}

/// A surface was created or destroyed by `creator_pid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceEvent {
    pub surface: SurfaceId,
    pub creator_pid: Pid,
    pub created: bool,
}

/// Everything the orchestrator reacts to, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Surface(SurfaceEvent),
    Shell(ShellEvent),
}

/// Surface property lookup keyed by surface id.
pub trait SurfaceLookup {
    fn creator_pid(&self, surface: SurfaceId) -> Option<Pid>;
}

/// Turn a raw control notification into a [`SurfaceEvent`].
///
/// Layers are logged and dropped. A surface whose creator cannot be
/// looked up is dropped with a warning.
pub fn normalize(
    object: ObjectKind,
    id: u32,
    created: bool,
    lookup: &impl SurfaceLookup,
) -> Option<SurfaceEvent> {
    match object {
        ObjectKind::Layer => {
            tracing::debug!(layer = id, created, "ivi layer notification");
            None
        }
        ObjectKind::Surface => match lookup.creator_pid(id) {
            Some(creator_pid) => Some(SurfaceEvent {
                surface: id,
                creator_pid,
                created,
            }),
            None => {
                tracing::warn!(surface = id, created, "no creator pid for surface");
                None
            }
        },
    }
}

/// Sending half of the orchestrator's input queue.
#[derive(Debug, Clone)]
pub struct NotificationBridge {
    tx: mpsc::Sender<Input>,
}

impl NotificationBridge {
    pub fn new(tx: mpsc::Sender<Input>) -> Self {
        Self { tx }
    }

    /// Forward a control notification. Returns `false` once the
    /// orchestrator has stopped listening.
    pub async fn control(
        &self,
        object: ObjectKind,
        id: u32,
        created: bool,
        lookup: &impl SurfaceLookup,
    ) -> bool {
        match normalize(object, id, created, lookup) {
            Some(event) => self.tx.send(Input::Surface(event)).await.is_ok(),
            None => !self.tx.is_closed(),
        }
    }

    /// Forward a shell event. Returns `false` once the orchestrator has
    /// stopped listening.
    pub async fn shell(&self, event: ShellEvent) -> bool {
        self.tx.send(Input::Shell(event)).await.is_ok()
    }
}
