//! HMI proxy connection: compositor control and shell over one socket.
//!
//! Frames are length-delimited MessagePack values. See [`protocol`] for
//! the message set and [`client`] for the connection halves.

pub mod client;
pub mod protocol;

use std::path::PathBuf;

use thiserror::Error;

pub use client::connect;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("cannot connect to {}: {source}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
