//! beamcast-core - Main entry point
//!
//! Drives the capture engine and the audio reader; produced frames and
//! samples are consumed by an external encode/transport pipeline.

mod args;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use args::Args;
use beamcast_core::audio::{Microphone, SampleSpec};
use beamcast_core::capture::create_capturer;
use beamcast_core::config::Config;
use beamcast_core::task::{Scheduler, ThreadScheduler};
use clap::Parser;
use log::{debug, error, info, warn};
use tokio::task;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::new()
        .parse_filters(&std::env::var("BEAMCAST_LOG").unwrap_or_else(|_| log_level.to_string()))
        .init();

    info!("beamcast-core v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match args.load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        }
    };

    // Apply command line overrides
    if let Some(fps) = args.fps {
        config.capture.fps = fps;
    }
    if args.no_cursor {
        config.capture.include_cursor = false;
    }
    if args.audio {
        config.audio.enabled = true;
    }
    config.validate()?;

    if let Some(ref display) = args.display {
        std::env::set_var("DISPLAY", display);
    }

    let scheduler: Arc<dyn Scheduler> = Arc::new(ThreadScheduler::new());
    let running = Arc::new(AtomicBool::new(true));

    if config.audio.enabled {
        let spec = SampleSpec {
            rate: config.audio.sample_rate,
            channels: config.audio.channels,
        };
        let audio_running = Arc::clone(&running);
        std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                // no fallback audio path exists: an open failure ends the process
                let mut mic = match Microphone::open("beamcast", spec) {
                    Ok(mic) => mic,
                    Err(err) => {
                        error!("cannot open audio capture: {}", err);
                        std::process::exit(1);
                    }
                };
                info!("audio capture opened ({} Hz, {} ch)", spec.rate, spec.channels);
                let chunk = spec.samples_for(20);
                let mut total = 0u64;
                while audio_running.load(Ordering::Relaxed) {
                    total += mic.sample(chunk).len() as u64;
                }
                info!("audio capture stopped after {} samples", total);
            })?;
    }

    let loop_running = Arc::clone(&running);
    let loop_config = config.clone();
    let loop_scheduler = Arc::clone(&scheduler);
    let frame_limit = args.frames;
    // snapshot blocks for the duration of a server round trip
    let mut capture =
        task::spawn_blocking(move || capture_loop(loop_config, loop_scheduler, loop_running, frame_limit));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            running.store(false, Ordering::Relaxed);
            capture.await??;
        }
        result = &mut capture => {
            running.store(false, Ordering::Relaxed);
            result??;
        }
    }

    Ok(())
}

fn capture_loop(
    config: Config,
    scheduler: Arc<dyn Scheduler>,
    running: Arc<AtomicBool>,
    frame_limit: Option<u64>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut capturer = create_capturer(scheduler)?;
    let interval = Duration::from_secs(1) / config.capture.fps.max(1);
    let mut produced = 0u64;
    let mut last_report = Instant::now();

    while running.load(Ordering::Relaxed) {
        let tick = Instant::now();

        match capturer.snapshot(config.capture.include_cursor) {
            Ok(frame) => {
                debug!("{}", frame);
                produced += 1;
            }
            // transient: the backend stays usable, retry on the next tick
            Err(err) => debug!("dropped frame: {}", err),
        }

        if last_report.elapsed() >= Duration::from_secs(10) {
            let stats = capturer.stats();
            info!(
                "captured {} frames, {} bytes, last capture {} us",
                stats.total_frames, stats.total_bytes, stats.last_capture_time_us
            );
            last_report = Instant::now();
        }

        if frame_limit.is_some_and(|limit| produced >= limit) {
            break;
        }

        let elapsed = tick.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }

    let stats = capturer.stats();
    info!(
        "capture loop finished: {} frames, {} bytes",
        stats.total_frames, stats.total_bytes
    );
    Ok(())
}
