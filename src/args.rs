use std::path::PathBuf;

use clap::Parser;

use beamcast_core::config::Config;
use beamcast_core::error::ConfigError;

#[derive(Parser, Debug)]
#[command(name = "beamcast-core")]
#[command(author = "Beamcast Team")]
#[command(version)]
#[command(about = "Frame and audio acquisition core for remote rendering", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/beamcast-core.toml")]
    pub config: PathBuf,

    /// X11 display to capture (overrides DISPLAY)
    #[arg(short, long)]
    pub display: Option<String>,

    /// Capture rate override in frames per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// Do not composite the cursor into frames
    #[arg(long, action)]
    pub no_cursor: bool,

    /// Stop after capturing this many frames
    #[arg(long)]
    pub frames: Option<u64>,

    /// Enable audio capture regardless of config
    #[arg(long, action)]
    pub audio: bool,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        Config::load(&self.config)
    }
}
