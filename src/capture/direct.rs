//! Core-protocol capture backend.
//!
//! Always-available fallback: every frame is a synchronous full-image
//! transfer with a server-side copy. No caching, no background tasks.

use std::time::Instant;

use log::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xfixes::ConnectionExt as _;
use x11rb::protocol::xproto::{ConnectionExt as _, ImageFormat, Window};
use x11rb::rust_connection::RustConnection;

use crate::capture::cursor;
use crate::capture::frame::{self, Frame, FrameStats};
use crate::capture::{query_geometry, Capturer};
use crate::error::{CaptureError, InitError};

pub struct DirectCapturer {
    conn: RustConnection,
    root: Window,
    sequence: u64,
    stats: FrameStats,
}

impl DirectCapturer {
    /// Connect and negotiate XFixes for cursor queries. Image transfers use
    /// the core protocol, so construction only fails when the display itself
    /// is unreachable.
    pub fn new() -> Result<Self, InitError> {
        let (conn, screen_num) = x11rb::connect(None)?;
        let root = conn.setup().roots[screen_num].root;
        conn.xfixes_query_version(5, 0)?.reply()?;
        Ok(Self {
            conn,
            root,
            sequence: 0,
            stats: FrameStats::default(),
        })
    }
}

impl Capturer for DirectCapturer {
    fn snapshot(&mut self, include_cursor: bool) -> Result<Frame, CaptureError> {
        let start = Instant::now();

        // geometry is re-read on every call; a resize simply changes the
        // next transfer rectangle
        let geometry = query_geometry(&self.conn, self.root)?;
        let reply = self
            .conn
            .get_image(
                ImageFormat::Z_PIXMAP,
                self.root,
                0,
                0,
                geometry.width,
                geometry.height,
                !0,
            )?
            .reply()?;

        let expected = frame::expected_len(geometry.width.into(), geometry.height.into());
        let mut data = reply.data;
        if data.len() != expected {
            debug!(
                "transfer returned {} bytes for {}, expected {}",
                data.len(),
                geometry,
                expected
            );
            data.resize(expected, 0);
        }

        let seq = self.sequence;
        self.sequence += 1;
        let mut frame = Frame::new(geometry.width.into(), geometry.height.into(), data, seq);

        if include_cursor {
            cursor::blend_cursor(&self.conn, &mut frame)?;
        }

        self.stats
            .record_capture(frame.data.len(), start.elapsed().as_micros() as u64);
        Ok(frame)
    }

    fn stats(&self) -> FrameStats {
        self.stats.clone()
    }
}
