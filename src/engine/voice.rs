//! A looping granular voice.

use std::{path::Path, sync::Arc};

use super::{
    grain::{EnvelopeTable, Grain},
    scheduler::GrainScheduler,
};
use crate::{
    utils::{
        buffer::clear_buffer, decoder::load_mono_file, milliseconds_to_frames,
        resampler::resample_mono,
        window::GrainWindowMode,
    },
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Options to configure a [`Voice`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceOptions {
    /// Length of each grain in milliseconds. By default 80 ms.
    pub grain_length_ms: f32,
    /// Number of grains spawned per second. By default 25 Hz.
    pub grain_rate_hz: f32,
    /// Envelope window applied to each grain. By default Hann.
    pub window: GrainWindowMode,
    /// Linear gain applied to the voice's output. By default 1.0.
    pub volume: f32,
}

impl Default for VoiceOptions {
    fn default() -> Self {
        Self {
            grain_length_ms: 80.0,
            grain_rate_hz: 25.0,
            window: GrainWindowMode::Hann,
            volume: 1.0,
        }
    }
}

impl VoiceOptions {
    pub fn grain_length_ms(mut self, grain_length_ms: f32) -> Self {
        self.grain_length_ms = grain_length_ms;
        self
    }

    pub fn grain_rate_hz(mut self, grain_rate_hz: f32) -> Self {
        self.grain_rate_hz = grain_rate_hz;
        self
    }

    pub fn window(mut self, window: GrainWindowMode) -> Self {
        self.window = window;
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Validate all options. Returns Error::ParameterError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        if !(1.0..=1000.0).contains(&self.grain_length_ms) {
            return Err(Error::ParameterError(format!(
                "voice option 'grain_length_ms' must be in range 1..=1000, but is '{}'",
                self.grain_length_ms
            )));
        }
        if !(1.0..=100.0).contains(&self.grain_rate_hz) {
            return Err(Error::ParameterError(format!(
                "voice option 'grain_rate_hz' must be in range 1..=100, but is '{}'",
                self.grain_rate_hz
            )));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(Error::ParameterError(format!(
                "voice option 'volume' must be >= 0, but is '{}'",
                self.volume
            )));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Plays a looped source buffer by continuously spawning overlapping grains from it.
///
/// Each spawn starts a grain at the voice's spawn position, then moves the spawn position
/// forward by half a grain length (50% overlap), wrapping back to the buffer's start when
/// the next grain would not fit into the buffer anymore.
///
/// Voices with an empty source buffer, e.g. because the file failed to load, play silence.
pub struct Voice {
    name: String,
    sample_rate: u32,
    source: Arc<[f32]>,
    envelope: EnvelopeTable,
    grain_length: usize,
    grain_hop: usize,
    scheduler: GrainScheduler,
    spawn_position: usize,
    grains: Vec<Grain>,
    volume: f32,
    skipped_spawns: usize,
    load_error: Option<String>,
}

impl Voice {
    /// Default number of frames a voice expects to process per call, when not prepared
    /// otherwise via [`Voice::prepare`].
    pub const DEFAULT_MAX_BLOCK_FRAMES: usize = 4096;

    /// Create a new voice from a decoded mono buffer with the given sample rate.
    pub fn new(
        name: &str,
        samples: impl Into<Arc<[f32]>>,
        sample_rate: u32,
        options: VoiceOptions,
    ) -> Result<Self, Error> {
        options.validate()?;
        if sample_rate == 0 {
            return Err(Error::ParameterError(
                "voice sample rate must be > 0".to_string(),
            ));
        }
        let grain_length = milliseconds_to_frames(options.grain_length_ms, sample_rate);
        if grain_length == 0 {
            return Err(Error::ParameterError(format!(
                "grain length of {}ms is shorter than a sample at {sample_rate}Hz",
                options.grain_length_ms
            )));
        }
        let scheduler = GrainScheduler::new(sample_rate, options.grain_rate_hz)?;
        let source = samples.into();
        let envelope = EnvelopeTable::new(options.window, grain_length);
        let grain_hop = (grain_length / 2).max(1);

        let mut voice = Self {
            name: name.to_string(),
            sample_rate,
            source,
            envelope,
            grain_length,
            grain_hop,
            scheduler,
            spawn_position: 0,
            grains: Vec::new(),
            volume: options.volume,
            skipped_spawns: 0,
            load_error: None,
        };
        voice.prepare(Self::DEFAULT_MAX_BLOCK_FRAMES);
        if voice.source.is_empty() {
            log::warn!("voice '{name}' has an empty source buffer and will play silence");
        }
        Ok(voice)
    }

    /// Create a new voice from an audio file. Invalid options are reported as errors.
    ///
    /// Files with a different sample rate get resampled to the given rate. Files which can't be
    /// loaded do not fail: the error gets logged once and the voice plays silence. See
    /// [`Voice::load_error`].
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        options: VoiceOptions,
        sample_rate: u32,
    ) -> Result<Self, Error> {
        options.validate()?;
        let name = path.as_ref().display().to_string();
        let loaded = load_mono_file(path.as_ref()).and_then(|decoded| {
            if decoded.sample_rate == sample_rate {
                return Ok(decoded.samples);
            }
            log::info!(
                "resampling '{name}' from {}Hz to {sample_rate}Hz",
                decoded.sample_rate
            );
            resample_mono(&decoded.samples, decoded.sample_rate, sample_rate)
        });
        match loaded {
            Ok(samples) => Self::new(&name, samples, sample_rate, options),
            Err(err) => {
                let load_error = err.to_string();
                log::error!("failed to load voice '{name}': {load_error}. Playing silence instead.");
                let mut voice = Self::new(&name, Vec::<f32>::new(), sample_rate, options)?;
                voice.load_error = Some(load_error);
                Ok(voice)
            }
        }
    }

    /// The voice's name, usually the path of the loaded file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sample rate of the voice's source buffer.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Grain length in samples.
    pub fn grain_length(&self) -> usize {
        self.grain_length
    }

    /// Grain spawn interval in samples.
    pub fn grain_interval(&self) -> f64 {
        self.scheduler.interval()
    }

    /// Position in the source at which the next grain will start.
    pub fn spawn_position(&self) -> usize {
        self.spawn_position
    }

    /// Number of currently playing grains.
    pub fn active_grain_count(&self) -> usize {
        self.grains.len()
    }

    /// Number of source frames, after decoding and resampling.
    pub fn source_len(&self) -> usize {
        self.source.len()
    }

    /// Number of grain spawns which got dropped because all preallocated grain slots were
    /// in use. Stays 0 as long as the voice is prepared for the processed block sizes.
    pub fn skipped_spawn_count(&self) -> usize {
        self.skipped_spawns
    }

    /// True when the voice has no source material and thus only produces silence.
    pub fn is_silent(&self) -> bool {
        self.source.is_empty()
    }

    /// Loading error message, when the voice's file failed to load.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Preallocate grain slots for processing blocks of up to `max_block_frames` frames.
    /// Must not be called from the audio thread.
    pub fn prepare(&mut self, max_block_frames: usize) {
        let interval = self.scheduler.interval();
        // grains alive at the block start plus all grains spawned within one block
        let alive = (self.grain_length as f64 / interval).ceil() as usize + 1;
        let spawned = (max_block_frames as f64 / interval).ceil() as usize + 1;
        let capacity = alive + spawned;
        if self.grains.capacity() < capacity {
            self.grains.reserve_exact(capacity - self.grains.len());
        }
    }

    /// Stop all playing grains and rewind the voice to the start of its source.
    pub fn reset(&mut self) {
        self.grains.clear();
        self.scheduler.reset();
        self.spawn_position = 0;
    }

    /// Render the next `frame_count` frames into a new buffer. Allocates: use
    /// [`Voice::process`] in real-time contexts.
    pub fn tick(&mut self, frame_count: usize) -> Vec<f32> {
        self.prepare(frame_count);
        let mut output = vec![0.0; frame_count];
        self.process(&mut output);
        output
    }

    /// Render the next `output.len()` frames into the given buffer, overwriting its content.
    ///
    /// Output is not clamped. Does not allocate as long as the voice got prepared for the
    /// given block size: spawns which don't fit into the preallocated grain slots are skipped.
    pub fn process(&mut self, output: &mut [f32]) {
        clear_buffer(output);

        // continue playing grains from previous blocks
        for grain in &mut self.grains {
            grain.produce(output);
        }

        // spawn new grains at their exact frame offsets within this block
        for offset in self.scheduler.advance(output.len()) {
            if self.grains.len() == self.grains.capacity() {
                self.skipped_spawns += 1;
                continue;
            }
            if let Some(mut grain) = self.spawn_grain() {
                grain.produce(&mut output[offset..]);
                self.grains.push(grain);
            }
        }

        self.grains.retain(|grain| !grain.is_exhausted());

        if self.volume != 1.0 {
            for sample in output.iter_mut() {
                *sample *= self.volume;
            }
        }
    }

    /// Create a new grain at the current spawn position and move the spawn position forward.
    fn spawn_grain(&mut self) -> Option<Grain> {
        if self.source.is_empty() {
            return None;
        }
        let grain = Grain::spawn(
            Arc::clone(&self.source),
            self.spawn_position,
            self.envelope.clone(),
        );
        self.spawn_position += self.grain_hop;
        if self.spawn_position + self.grain_length > self.source.len() {
            self.spawn_position = 0;
        }
        Some(grain)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;

    fn sine(sample_rate: u32, seconds: f32, frequency: f32) -> Vec<f32> {
        let len = (sample_rate as f32 * seconds) as usize;
        (0..len)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn invalid_options() {
        let samples = vec![0.0; 100];
        let options = VoiceOptions::default().grain_length_ms(0.0);
        assert!(Voice::new("zero length", samples.clone(), 44100, options).is_err());
        let options = VoiceOptions::default().grain_rate_hz(0.0);
        assert!(Voice::new("zero rate", samples.clone(), 44100, options).is_err());
        let options = VoiceOptions::default().volume(-1.0);
        assert!(Voice::new("negative volume", samples.clone(), 44100, options).is_err());
        // 1ms at 100Hz is shorter than a sample
        let options = VoiceOptions::default().grain_length_ms(1.0);
        assert!(Voice::new("too short", samples, 100, options).is_err());
    }

    #[test]
    fn grain_geometry() -> Result<(), Error> {
        let voice = Voice::new("sine", sine(44100, 5.0, 440.0), 44100, Default::default())?;
        assert_eq!(voice.grain_length(), 3528);
        assert_eq!(voice.grain_interval(), 1764.0);
        assert_eq!(voice.active_grain_count(), 0);
        assert!(!voice.is_silent());
        Ok(())
    }

    #[test]
    fn spawns_within_two_intervals() -> Result<(), Error> {
        let mut voice = Voice::new("sine", sine(44100, 5.0, 440.0), 44100, Default::default())?;
        let mut frames = 0;
        while frames < 2 * 1764 {
            let _ = voice.tick(256);
            frames += 256;
        }
        assert!(voice.active_grain_count() >= 1);
        Ok(())
    }

    #[test]
    fn first_block() -> Result<(), Error> {
        let mut voice = Voice::new("sine", sine(44100, 5.0, 440.0), 44100, Default::default())?;
        let output = voice.tick(4096);
        assert_eq!(output.len(), 4096);
        // grains spawned at frames 1763 and 3527, both still playing
        assert_eq!(voice.active_grain_count(), 2);
        assert!(output[..1763].iter().all(|s| *s == 0.0));
        assert!(output[1763..].iter().any(|s| *s != 0.0));
        assert_eq!(voice.spawn_position(), 2 * 1764);
        Ok(())
    }

    #[test]
    fn steady_state_overlap() -> Result<(), Error> {
        let mut voice = Voice::new("sine", sine(44100, 5.0, 440.0), 44100, Default::default())?;
        // warm up
        let _ = voice.tick(8192);
        for block_size in [64, 100, 512, 1024, 1500].iter().cycle().take(400) {
            let _ = voice.tick(*block_size);
            let count = voice.active_grain_count();
            assert!(count == 1 || count == 2, "active grains: {count}");
        }
        Ok(())
    }

    #[test]
    fn spawn_position_wraps() -> Result<(), Error> {
        // 10 grains hops of source
        let samples = vec![0.25; 1764 * 10];
        let mut voice = Voice::new("wrap", samples, 44100, Default::default())?;
        let mut max_position = 0;
        for _ in 0..200 {
            let _ = voice.tick(1024);
            max_position = max_position.max(voice.spawn_position());
            assert!(voice.spawn_position() + voice.grain_length() <= 1764 * 10);
        }
        assert_eq!(max_position, 1764 * 8);
        Ok(())
    }

    #[test]
    fn source_shorter_than_grain() -> Result<(), Error> {
        let samples = vec![0.5; 1000];
        let mut voice = Voice::new("short", samples, 44100, Default::default())?;
        for _ in 0..100 {
            let output = voice.tick(512);
            assert!(output.iter().all(|s| s.abs() <= 1.0));
            assert_eq!(voice.spawn_position(), 0);
        }
        Ok(())
    }

    #[test]
    fn large_blocks_spawn_multiple_grains() -> Result<(), Error> {
        let mut voice = Voice::new("sine", sine(44100, 5.0, 440.0), 44100, Default::default())?;
        let _ = voice.tick(44100);
        // 25 spawns, of which the last two are still playing
        assert_eq!(voice.spawn_position(), 25 * 1764 % (44100 * 5));
        assert_eq!(voice.active_grain_count(), 2);
        Ok(())
    }

    #[test]
    fn volume() -> Result<(), Error> {
        let samples = sine(44100, 1.0, 220.0);
        let mut full = Voice::new("full", samples.clone(), 44100, Default::default())?;
        let mut half = Voice::new(
            "half",
            samples,
            44100,
            VoiceOptions::default().volume(0.5),
        )?;
        let full_output = full.tick(8192);
        let half_output = half.tick(8192);
        for (f, h) in full_output.iter().zip(&half_output) {
            assert!((f * 0.5 - h).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn silent_voice() -> Result<(), Error> {
        let mut voice = Voice::new("empty", Vec::<f32>::new(), 44100, Default::default())?;
        assert!(voice.is_silent());
        for _ in 0..10 {
            let output = voice.tick(4096);
            assert_eq!(output.len(), 4096);
            assert!(output.iter().all(|s| *s == 0.0));
        }
        assert_eq!(voice.active_grain_count(), 0);
        Ok(())
    }

    #[test]
    fn missing_file_plays_silence() -> Result<(), Error> {
        let mut voice =
            Voice::from_file("does/not/exist.wav", VoiceOptions::default(), 44100)?;
        assert!(voice.is_silent());
        assert!(voice.load_error().is_some());
        let output = voice.tick(1024);
        assert!(output.iter().all(|s| *s == 0.0));

        // invalid options still fail
        let options = VoiceOptions::default().grain_rate_hz(1000.0);
        assert!(Voice::from_file("does/not/exist.wav", options, 44100).is_err());
        Ok(())
    }

    #[test]
    fn resample_files_with_other_rates() -> Result<(), Box<dyn std::error::Error>> {
        let path = std::env::temp_dir().join("grainloop_voice_48k_test.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec)?;
        for sample in sine(48000, 2.0, 440.0) {
            writer.write_sample((sample * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;

        let voice = Voice::from_file(&path, VoiceOptions::default(), 44100);
        std::fs::remove_file(&path)?;
        let mut voice = voice?;

        assert!(!voice.is_silent());
        assert_eq!(voice.load_error(), None);
        assert_eq!(voice.sample_rate(), 44100);
        assert_eq!(voice.source_len(), 2 * 44100);
        assert_eq!(voice.grain_length(), 3528);

        let output = voice.tick(44100);
        let peak = output.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()));
        assert!(peak > 0.25, "peak: {peak}");
        Ok(())
    }

    #[test]
    fn reset() -> Result<(), Error> {
        let mut voice = Voice::new("sine", sine(44100, 5.0, 440.0), 44100, Default::default())?;
        let _ = voice.tick(10000);
        voice.reset();
        assert_eq!(voice.active_grain_count(), 0);
        assert_eq!(voice.spawn_position(), 0);
        let output = voice.tick(1000);
        assert!(output.iter().all(|s| *s == 0.0));
        Ok(())
    }
}
