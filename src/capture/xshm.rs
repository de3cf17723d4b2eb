//! Shared-memory-accelerated capture backend.
//!
//! The server writes each frame straight into a SysV shared memory segment
//! bound to the transfer connection, so a capture is one round trip plus a
//! local copy. The segment must always match the live screen geometry; a
//! background job keeps a cached geometry fresh and `snapshot` rebuilds the
//! whole session when the comparison detects a resize.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info};
use parking_lot::Mutex;
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::shm;
use x11rb::protocol::xfixes::ConnectionExt as _;
use x11rb::protocol::xproto::{ImageFormat, Window};
use x11rb::rust_connection::RustConnection;

use crate::capture::cursor;
use crate::capture::frame::{self, Frame, FrameStats};
use crate::capture::shm::{ShmId, ShmMapping};
use crate::capture::{query_geometry, Capturer, Geometry};
use crate::error::{CaptureError, InitError};
use crate::task::{Scheduler, TaskHandle};

/// How often the background job re-reads the live screen geometry.
pub const REFRESH_PERIOD: Duration = Duration::from_secs(1);

/// The live resources backing the accelerated path: transfer connection,
/// XShm segment binding, and the local mapping, all sized for one geometry.
struct ShmSession {
    conn: Option<RustConnection>,
    root: Window,
    geometry: Geometry,
    seg: shm::Seg,
    shm_id: ShmId,
    mapping: ShmMapping,
}

impl ShmSession {
    fn new() -> Self {
        Self {
            conn: None,
            root: 0,
            geometry: Geometry {
                width: 0,
                height: 0,
            },
            seg: 0,
            shm_id: ShmId::invalid(),
            mapping: ShmMapping::detached(),
        }
    }

    /// Bring the session up for the current screen geometry.
    ///
    /// On any failure the partially acquired resources are released by their
    /// guards and the session stays torn down.
    fn init(&mut self) -> Result<(), InitError> {
        let (conn, screen_num) = x11rb::connect(None)?;
        if conn.extension_information(shm::X11_EXTENSION_NAME)?.is_none() {
            return Err(InitError::ShmExtensionMissing);
        }

        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let geometry = Geometry {
            width: screen.width_in_pixels,
            height: screen.height_in_pixels,
        };

        let seg = conn.generate_id()?;
        let size = frame::expected_len(geometry.width.into(), geometry.height.into());
        let shm_id = ShmId::alloc(size).map_err(InitError::SegmentAllocation)?;
        shm::attach(&conn, seg, shm_id.raw() as u32, false)?.check()?;
        let mapping = ShmMapping::map(&shm_id).map_err(InitError::SegmentMapping)?;

        debug!("shared memory session ready: {geometry}, segment {size} bytes");

        self.conn = Some(conn);
        self.root = root;
        self.geometry = geometry;
        self.seg = seg;
        self.shm_id = shm_id;
        self.mapping = mapping;
        Ok(())
    }

    /// Release everything. Idempotent.
    fn teardown(&mut self) {
        if let Some(conn) = &self.conn {
            let _ = shm::detach(conn, self.seg);
            let _ = conn.flush();
        }
        self.mapping.release();
        self.shm_id.release();
        self.conn = None;
    }

    /// Run one transfer into the segment and copy the result out.
    ///
    /// The reply is the only point at which the segment may be read; the
    /// server mutates it out of band between request and acknowledgment.
    fn transfer(&self) -> Result<Vec<u8>, CaptureError> {
        let conn = self.conn.as_ref().ok_or(CaptureError::NotReady)?;
        let cookie = shm::get_image(
            conn,
            self.root,
            0,
            0,
            self.geometry.width,
            self.geometry.height,
            !0,
            u8::from(ImageFormat::Z_PIXMAP),
            self.seg,
            0,
        )?;
        match cookie.reply() {
            Ok(_) => Ok(self.mapping.copy_out(self.frame_size())),
            Err(err) => {
                debug!("no image transfer reply: {err}");
                Err(CaptureError::NoReply)
            }
        }
    }

    fn frame_size(&self) -> usize {
        frame::expected_len(self.geometry.width.into(), self.geometry.height.into())
    }
}

impl Drop for ShmSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

pub struct ShmCapturer {
    session: ShmSession,

    /// Dedicated cursor-query connection, kept apart from the transfer
    /// connection so cursor requests never interleave with a pending
    /// shared memory transfer.
    cursor_conn: RustConnection,

    /// Live geometry as last seen by the refresh job.
    geometry: Arc<Mutex<Geometry>>,

    refresh: TaskHandle,
    scheduler: Arc<dyn Scheduler>,

    sequence: u64,
    stats: FrameStats,
}

impl ShmCapturer {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Result<Self, InitError> {
        let mut session = ShmSession::new();
        session.init()?;

        let (cursor_conn, _) = x11rb::connect(None)?;
        cursor_conn.xfixes_query_version(5, 0)?.reply()?;

        let (geo_conn, geo_screen) = x11rb::connect(None)?;
        let geo_root = geo_conn.setup().roots[geo_screen].root;
        let geo_conn = Arc::new(geo_conn);

        let geometry = Arc::new(Mutex::new(session.geometry));
        let refresh = schedule_geometry_refresh(
            scheduler.as_ref(),
            REFRESH_PERIOD,
            move || query_geometry(geo_conn.as_ref(), geo_root).ok(),
            Arc::clone(&geometry),
        );

        Ok(Self {
            session,
            cursor_conn,
            geometry,
            refresh,
            scheduler,
            sequence: 0,
            stats: FrameStats::default(),
        })
    }
}

/// Keep `cache` tracking the live screen geometry.
///
/// Advisory only: the job never tears down or rebuilds a session, it just
/// makes the geometry comparison in `snapshot` cheap and current.
fn schedule_geometry_refresh(
    scheduler: &dyn Scheduler,
    period: Duration,
    source: impl Fn() -> Option<Geometry> + Send + 'static,
    cache: Arc<Mutex<Geometry>>,
) -> TaskHandle {
    scheduler.submit(
        period,
        Box::new(move || {
            if let Some(geometry) = source() {
                *cache.lock() = geometry;
            }
        }),
    )
}

impl Capturer for ShmCapturer {
    fn snapshot(&mut self, include_cursor: bool) -> Result<Frame, CaptureError> {
        let start = Instant::now();

        let live = *self.geometry.lock();
        if live != self.session.geometry {
            info!(
                "screen geometry changed {} -> {}, rebuilding shared memory session",
                self.session.geometry, live
            );
            self.session.teardown();
            if let Err(err) = self.session.init() {
                // no further fallback once an accelerated session has been lost
                error!("cannot rebuild shared memory session: {err}");
                std::process::exit(1);
            }
            *self.geometry.lock() = self.session.geometry;
        }

        let data = self.session.transfer()?;
        let seq = self.sequence;
        self.sequence += 1;
        let mut frame = Frame::new(
            self.session.geometry.width.into(),
            self.session.geometry.height.into(),
            data,
            seq,
        );

        if include_cursor {
            cursor::blend_cursor(&self.cursor_conn, &mut frame)?;
        }

        self.stats
            .record_capture(frame.data.len(), start.elapsed().as_micros() as u64);
        Ok(frame)
    }

    fn stats(&self) -> FrameStats {
        self.stats.clone()
    }
}

impl Drop for ShmCapturer {
    fn drop(&mut self) {
        // the refresh job reads the geometry cache through its own
        // connection; it must be unable to fire again before the session's
        // resources go away
        self.scheduler.cancel(self.refresh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::fake::ManualScheduler;

    #[test]
    fn refresh_updates_cache_on_each_fire() {
        let scheduler = ManualScheduler::new();
        let cache = Arc::new(Mutex::new(Geometry {
            width: 800,
            height: 600,
        }));
        let live = Arc::new(Mutex::new(Geometry {
            width: 800,
            height: 600,
        }));

        let source = Arc::clone(&live);
        let handle = schedule_geometry_refresh(
            &scheduler,
            REFRESH_PERIOD,
            move || Some(*source.lock()),
            Arc::clone(&cache),
        );

        *live.lock() = Geometry {
            width: 1024,
            height: 768,
        };
        scheduler.fire(handle);
        assert_eq!(
            *cache.lock(),
            Geometry {
                width: 1024,
                height: 768
            }
        );
    }

    #[test]
    fn failed_geometry_read_leaves_cache_untouched() {
        let scheduler = ManualScheduler::new();
        let cache = Arc::new(Mutex::new(Geometry {
            width: 800,
            height: 600,
        }));

        let handle = schedule_geometry_refresh(
            &scheduler,
            REFRESH_PERIOD,
            || None,
            Arc::clone(&cache),
        );

        scheduler.fire(handle);
        assert_eq!(
            *cache.lock(),
            Geometry {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn no_cache_update_after_cancellation() {
        let scheduler = ManualScheduler::new();
        let cache = Arc::new(Mutex::new(Geometry {
            width: 800,
            height: 600,
        }));

        let handle = schedule_geometry_refresh(
            &scheduler,
            REFRESH_PERIOD,
            || {
                Some(Geometry {
                    width: 2560,
                    height: 1440,
                })
            },
            Arc::clone(&cache),
        );

        assert!(scheduler.cancel(handle));
        // a tick that would have fired after cancellation must have no effect
        scheduler.fire(handle);
        assert_eq!(
            *cache.lock(),
            Geometry {
                width: 800,
                height: 600
            }
        );
        assert_eq!(scheduler.pending(), 0);
    }
}
