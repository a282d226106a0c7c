//! Wire messages exchanged with the HMI proxy.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::IpcError;
use crate::bridge::{ObjectKind, SurfaceId};
use crate::shell::ShellEvent;

/// Requests sent to the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HmiRequest {
    /// First frame on every connection. Carries the credentials the
    /// window manager and homescreen sessions are opened with.
    Init { port: u16, token: String, role: String },
    RequestSurface { role: String, surface: SurfaceId },
    ActivateWindow { role: String, area: String },
    EndDraw { role: String },
}

/// Events pushed by the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HmiEvent {
    /// Properties of a surface. Sent before any control notification
    /// that refers to it.
    SurfaceProperties { surface: SurfaceId, creator_pid: i32 },
    /// Compositor object created or destroyed.
    Control {
        object: ObjectKind,
        id: u32,
        created: bool,
    },
    Shell(ShellEvent),
}

/// Serialize a message into one frame body.
pub fn encode<T: Serialize>(msg: &T) -> Result<Bytes, IpcError> {
    Ok(Bytes::from(rmp_serde::to_vec_named(msg)?))
}

/// Deserialize one frame body.
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, IpcError> {
    Ok(rmp_serde::from_slice(frame)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_event_survives_the_wire() {
        let event = HmiEvent::Control {
            object: ObjectKind::Surface,
            id: 9,
            created: true,
        };
        let frame = encode(&event).unwrap();
        assert_eq!(decode::<HmiEvent>(&frame).unwrap(), event);
    }

    #[test]
    fn garbage_frame_is_a_decode_error() {
        let result = decode::<HmiEvent>(&[0xc1, 0x00, 0xff]);
        assert!(matches!(result, Err(IpcError::Decode(_))));
    }
}
