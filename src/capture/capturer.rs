//! Capture backend selection.

use std::sync::Arc;

use log::{info, warn};

use crate::capture::direct::DirectCapturer;
use crate::capture::frame::{Frame, FrameStats};
use crate::capture::xshm::ShmCapturer;
use crate::error::{CaptureError, InitError};
use crate::task::Scheduler;

/// One concrete capture strategy.
pub trait Capturer: Send {
    /// Capture a single frame, optionally compositing the cursor in.
    ///
    /// Errors are transient: the backend stays usable and the caller is
    /// expected to retry on its next tick.
    fn snapshot(&mut self, include_cursor: bool) -> Result<Frame, CaptureError>;

    /// Get capture statistics
    fn stats(&self) -> FrameStats;
}

/// Build the capture engine.
///
/// Tries the shared memory path first and falls back to core protocol
/// transfers when it cannot initialize. The chosen backend is kept for the
/// engine's whole lifetime; there is no runtime re-selection. The only
/// outward failure is a display connection that cannot be opened at all.
pub fn create_capturer(scheduler: Arc<dyn Scheduler>) -> Result<Box<dyn Capturer>, InitError> {
    match ShmCapturer::new(scheduler) {
        Ok(capturer) => {
            info!("using MIT-SHM accelerated capture");
            Ok(Box::new(capturer))
        }
        Err(err) => {
            warn!("shared memory capture unavailable ({err}), using core protocol transfers");
            Ok(Box::new(DirectCapturer::new()?))
        }
    }
}
