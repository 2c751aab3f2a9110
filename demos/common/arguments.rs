use std::path::PathBuf;

use arg::{parse_args, Args};

use grainloop::{Error, GrainWindowMode, VoiceOptions};

// -------------------------------------------------------------------------------------------------

const DEFAULT_LOG_LEVEL: log::Level = if cfg!(debug_assertions) {
    log::Level::Debug
} else {
    log::Level::Info
};

const DEFAULT_SAMPLE_PATHS: &str = "assets/loop.wav";

// -------------------------------------------------------------------------------------------------

/// Default program arguments for grainloop demo applications.
#[derive(Args, Debug, Default)]
#[allow(unused)]
pub struct Arguments {
    #[arg(short = "s", long = "samples")]
    /// Comma separated list of audio files to loop, one voice per file.
    pub sample_paths: Option<String>,
    #[arg(short = "b", long = "bpm")]
    /// Initial tempo in beats per minute. By default 120.
    pub bpm: Option<f64>,
    #[arg(long = "grain-length")]
    /// Grain length in milliseconds (1 - 1000). By default 80.
    pub grain_length_ms: Option<f32>,
    #[arg(long = "grain-rate")]
    /// Grain trigger rate in Hz (1 - 100). By default 25.
    pub grain_rate_hz: Option<f32>,
    #[arg(short = "w", long = "window")]
    /// Grain window: \"hann\", \"blackman\", \"triangle\" or \"tukey\". By default \"hann\".
    pub window: Option<GrainWindowMode>,
    #[arg(short = "o", long = "output")]
    /// Render audio into the given wav file, instead of using the default audio device.
    pub output_path: Option<PathBuf>,
    #[arg(short = "m", long = "midi-port")]
    /// MIDI input port to read tap and voice notes from. By default \"USB MIDI keyboard\",
    /// or the first available port.
    pub midi_port: Option<String>,
    #[arg(long = "list-midi-ports")]
    /// List all available MIDI input ports and exit.
    pub list_midi_ports: bool,
    #[arg(short = "d", long = "duration")]
    /// Duration of rendered wav files in seconds. By default 10.
    pub duration: Option<u64>,
    #[arg(short = "l", long = "log-level")]
    /// Set logging level to \"debug\", \"info\", \"warn\" or \"error\".
    /// By default \"debug\" in dev builds and \"info\" in release builds.
    pub log_level: Option<log::Level>,
}

impl Arguments {
    /// Sample paths, split from the comma separated samples argument.
    #[allow(unused)]
    pub fn sample_paths(&self) -> Vec<PathBuf> {
        self.sample_paths
            .as_deref()
            .unwrap_or(DEFAULT_SAMPLE_PATHS)
            .split(',')
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    /// Voice options from the grain arguments, validated.
    #[allow(unused)]
    pub fn voice_options(&self) -> Result<VoiceOptions, Error> {
        let mut options = VoiceOptions::default();
        if let Some(grain_length_ms) = self.grain_length_ms {
            options = options.grain_length_ms(grain_length_ms);
        }
        if let Some(grain_rate_hz) = self.grain_rate_hz {
            options = options.grain_rate_hz(grain_rate_hz);
        }
        if let Some(window) = self.window {
            options = options.window(window);
        }
        options.validate()?;
        Ok(options)
    }
}

/// Parse common demo arguments and apply the log-level arg to the logger
#[allow(unused)]
pub fn parse() -> Arguments {
    let args = parse_args::<Arguments>();

    create_logger(args.log_level);
    args
}

// -------------------------------------------------------------------------------------------------

/// Create default logger from arguments. Invoked from `parse`.
#[allow(unused)]
pub fn create_logger(log_level: Option<log::Level>) {
    simple_logger::SimpleLogger::new()
        // use default or arg level by default
        .with_level(log_level.unwrap_or(DEFAULT_LOG_LEVEL).to_level_filter())
        // disable logging in chatty modules
        .with_module_level("symphonia_core", log::LevelFilter::Warn)
        .with_module_level("symphonia_format", log::LevelFilter::Warn)
        .init()
        .expect("Failed to set logger");
}
