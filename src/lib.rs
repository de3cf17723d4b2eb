//! beamcast-core - frame and audio acquisition core
//!
//! Produces raw BGRX pixel buffers (optionally with the cursor composited
//! in) and raw S16LE audio samples for an external encode and transport
//! pipeline.

pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod task;

// Re-exports
pub use capture::{create_capturer, Capturer, Frame};
pub use config::Config;
pub use error::{AudioError, CaptureError, ConfigError, InitError};
pub use task::{Scheduler, TaskHandle, ThreadScheduler};
