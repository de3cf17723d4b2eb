//! Error types for the acquisition core.

use std::path::PathBuf;

use thiserror::Error;
use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};

/// Errors raised while bringing up a capture backend.
///
/// Recoverable at the engine level: the factory reacts to any of these by
/// falling back to the core-protocol backend.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("cannot open display connection: {0}")]
    Connect(#[from] ConnectError),

    #[error("MIT-SHM extension not advertised by the display server")]
    ShmExtensionMissing,

    #[error("shared memory segment allocation failed: {0}")]
    SegmentAllocation(std::io::Error),

    #[error("shared memory segment could not be mapped: {0}")]
    SegmentMapping(std::io::Error),

    #[error("display protocol error: {0}")]
    Protocol(#[from] ConnectionError),

    #[error("display request failed: {0}")]
    Reply(#[from] ReplyError),

    #[error("id allocation failed: {0}")]
    Id(#[from] ReplyOrIdError),
}

/// Errors raised by a single `snapshot` call.
///
/// All variants are transient from the caller's point of view: the backend
/// stays usable and the caller retries on its next polling tick.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The server did not acknowledge the shared memory transfer.
    #[error("image transfer yielded no reply")]
    NoReply,

    /// The session has been torn down and not rebuilt.
    #[error("capture session is not initialized")]
    NotReady,

    #[error("display protocol error: {0}")]
    Protocol(#[from] ConnectionError),

    #[error("image transfer failed: {0}")]
    Transfer(#[from] ReplyError),
}

/// Errors raised when opening the audio capture stream.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio server connection failed: {0}")]
    Open(libpulse_binding::error::PAErr),
}

impl From<libpulse_binding::error::PAErr> for AudioError {
    fn from(err: libpulse_binding::error::PAErr) -> Self {
        AudioError::Open(err)
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
