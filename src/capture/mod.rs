//! Screen capture engine.
//!
//! Two backends behind one trait: shared-memory-accelerated transfers when
//! the server supports them, plain core-protocol transfers otherwise.

mod capturer;
mod direct;
mod xshm;

pub mod cursor;
pub mod frame;
pub mod shm;

pub use capturer::{create_capturer, Capturer};
pub use direct::DirectCapturer;
pub use frame::{Frame, FrameStats};
pub use xshm::ShmCapturer;

use std::fmt;

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, Window};

use crate::error::CaptureError;

/// Screen dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u16,
    pub height: u16,
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Query the live geometry of `root`.
pub(crate) fn query_geometry<C: Connection>(
    conn: &C,
    root: Window,
) -> Result<Geometry, CaptureError> {
    let reply = conn.get_geometry(root)?.reply()?;
    Ok(Geometry {
        width: reply.width,
        height: reply.height,
    })
}
