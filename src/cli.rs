use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::DisplayMode;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Re-segment an SRT file into readable subtitle lines
    Segment {
        /// Input SRT file with raw caption cues
        #[arg(short, long)]
        input: PathBuf,

        /// Output SRT file
        #[arg(short, long)]
        output: PathBuf,

        /// Use the deterministic segmenter only, without calling the model
        #[arg(long)]
        offline: bool,
    },

    /// Simulate playback over an SRT file, segmenting and translating around the playhead
    Play {
        /// Input SRT file with raw caption cues
        #[arg(short, long)]
        input: PathBuf,

        /// Output SRT file with translations
        #[arg(short, long)]
        output: PathBuf,

        /// Target language (overrides config)
        #[arg(short, long)]
        target_lang: Option<String>,

        /// Video title given to the translator as context (defaults to the file name)
        #[arg(long)]
        title: Option<String>,

        /// How translated subtitles are written (overrides config)
        #[arg(long, value_enum)]
        display_mode: Option<DisplayModeArg>,

        /// Playback speed multiplier
        #[arg(long, default_value_t = 1.0)]
        speed: f64,

        /// Wait for segmentation and translation after every tick
        #[arg(long)]
        lockstep: bool,

        /// Start playback at this position (seconds)
        #[arg(long)]
        seek: Option<f64>,
    },

    /// Create a default configuration file
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DisplayModeArg {
    Bilingual,
    TranslationOnly,
}

impl From<DisplayModeArg> for DisplayMode {
    fn from(arg: DisplayModeArg) -> Self {
        match arg {
            DisplayModeArg::Bilingual => DisplayMode::Bilingual,
            DisplayModeArg::TranslationOnly => DisplayMode::TranslationOnly,
        }
    }
}
