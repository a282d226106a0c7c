//! HMI proxy client: request writer and event pump.
//!
//! [`connect`] splits the socket in two. Shell requests go through
//! [`HmiShell`] to a writer task; incoming events are read by
//! [`EventPump::run`] and handed to the notification bridge.

use std::collections::HashMap;
use std::path::Path;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use nix::unistd::Pid;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use super::IpcError;
use super::protocol::{self, HmiEvent, HmiRequest};
use crate::bridge::{NotificationBridge, ObjectKind, SurfaceId, SurfaceLookup};
use crate::shell::Shell;

type Transport = Framed<UnixStream, LengthDelimitedCodec>;

/// Connect to the proxy and send `init` as the first frame.
pub async fn connect(path: &Path, init: &HmiRequest) -> Result<(HmiShell, EventPump), IpcError> {
    let stream = UnixStream::connect(path)
        .await
        .map_err(|source| IpcError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
    let (mut sink, frames) = Framed::new(stream, LengthDelimitedCodec::new()).split();
    sink.send(protocol::encode(init)?).await?;
    tracing::debug!(path = %path.display(), "connected to HMI proxy");

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(write_requests(sink, rx));

    Ok((
        HmiShell { tx },
        EventPump {
            frames,
            properties: PropertyCache::default(),
        },
    ))
}

async fn write_requests(
    mut sink: SplitSink<Transport, Bytes>,
    mut rx: mpsc::UnboundedReceiver<HmiRequest>,
) {
    while let Some(request) = rx.recv().await {
        let frame = match protocol::encode(&request) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(?request, error = %e, "cannot encode HMI request");
                continue;
            }
        };
        if let Err(e) = sink.send(frame).await {
            tracing::warn!(error = %e, "HMI write failed");
            break;
        }
    }
}

/// [`Shell`] backed by the proxy connection. Requests are queued and
/// never block the caller.
#[derive(Debug, Clone)]
pub struct HmiShell {
    tx: mpsc::UnboundedSender<HmiRequest>,
}

impl HmiShell {
    fn send(&self, request: HmiRequest) {
        if self.tx.send(request).is_err() {
            tracing::warn!("HMI connection closed, request dropped");
        }
    }
}

impl Shell for HmiShell {
    fn request_surface(&self, role: &str, surface: SurfaceId) {
        self.send(HmiRequest::RequestSurface {
            role: role.to_string(),
            surface,
        });
    }

    fn activate_window(&self, role: &str, area: &str) {
        self.send(HmiRequest::ActivateWindow {
            role: role.to_string(),
            area: area.to_string(),
        });
    }

    fn end_draw(&self, role: &str) {
        self.send(HmiRequest::EndDraw {
            role: role.to_string(),
        });
    }
}

/// Surface properties announced by the proxy, keyed by surface id.
#[derive(Debug, Default)]
struct PropertyCache(HashMap<SurfaceId, Pid>);

impl SurfaceLookup for PropertyCache {
    fn creator_pid(&self, surface: SurfaceId) -> Option<Pid> {
        self.0.get(&surface).copied()
    }
}

/// Reading half of the proxy connection.
pub struct EventPump {
    frames: SplitStream<Transport>,
    properties: PropertyCache,
}

impl EventPump {
    /// Forward events to `bridge` until the proxy hangs up or the
    /// orchestrator stops listening. Undecodable frames are skipped.
    pub async fn run(mut self, bridge: NotificationBridge) {
        while let Some(frame) = self.frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(error = %e, "HMI read failed");
                    break;
                }
            };
            let event = match protocol::decode::<HmiEvent>(&frame) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping undecodable HMI frame");
                    continue;
                }
            };
            if !self.apply(event, &bridge).await {
                tracing::debug!("input queue closed, stopping event pump");
                return;
            }
        }
        tracing::info!("HMI proxy connection closed");
    }

    async fn apply(&mut self, event: HmiEvent, bridge: &NotificationBridge) -> bool {
        match event {
            HmiEvent::SurfaceProperties {
                surface,
                creator_pid,
            } => {
                self.properties.0.insert(surface, Pid::from_raw(creator_pid));
                true
            }
            HmiEvent::Control {
                object,
                id,
                created,
            } => {
                let open = bridge.control(object, id, created, &self.properties).await;
                if object == ObjectKind::Surface && !created {
                    self.properties.0.remove(&id);
                }
                open
            }
            HmiEvent::Shell(event) => bridge.shell(event).await,
        }
    }
}
