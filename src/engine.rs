//! The granular engine: a tempo clock and a set of voices, mixed into one output stream.

use std::{sync::Arc, time::Instant};

pub mod clock;
pub mod grain;
pub mod scheduler;
pub mod status;
pub mod voice;

use clock::{TempoClock, TempoHandle};
use status::{CpuLoad, CpuLoadMeter, EngineStatus, SharedStatus, StatusHandle};
use voice::Voice;

use crate::{
    utils::{
        buffer::{add_buffers, clamp_buffer, clear_buffer},
        sample::OutputSample,
    },
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Options to configure an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
    /// Output sample rate. By default 44100 Hz.
    pub sample_rate: u32,
    /// Initial tempo in beats per minute. By default 120.
    pub bpm: f64,
    /// Size of the engine's internal mix buffers in frames. Larger output blocks get
    /// processed in chunks of this size. By default 1024.
    pub max_block_frames: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            bpm: 120.0,
            max_block_frames: 1024,
        }
    }
}

impl EngineOptions {
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn bpm(mut self, bpm: f64) -> Self {
        self.bpm = bpm;
        self
    }

    pub fn max_block_frames(mut self, max_block_frames: usize) -> Self {
        self.max_block_frames = max_block_frames;
        self
    }

    /// Validate all options. Returns Error::ParameterError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sample_rate == 0 {
            return Err(Error::ParameterError(
                "engine option 'sample_rate' must be > 0".to_string(),
            ));
        }
        clock::validate_bpm(self.bpm)?;
        if self.max_block_frames == 0 {
            return Err(Error::ParameterError(
                "engine option 'max_block_frames' must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Mixes all voices into a single mono output stream, while advancing the tempo clock.
///
/// Voices get mixed in floating point. The mix is clamped once into -1.0..=1.0 and only then
/// converted to the output's sample format, so overlapping grains and voices never wrap around.
///
/// `process` is real-time safe: it neither allocates nor locks. The engine's tempo can be
/// changed from other threads via its [`TempoHandle`], and its status can be observed via its
/// [`StatusHandle`]. Each `process` call gets timed against the duration of the rendered
/// audio: the resulting [`CpuLoad`] is published once per second of processed audio.
pub struct Engine {
    sample_rate: u32,
    clock: TempoClock,
    voices: Vec<Voice>,
    max_block_frames: usize,
    mix_buffer: Vec<f32>,
    voice_buffer: Vec<f32>,
    status: Arc<SharedStatus>,
    cpu_load_meter: CpuLoadMeter,
    cpu_load: CpuLoad,
}

impl Engine {
    /// Create a new engine without voices.
    pub fn new(options: EngineOptions) -> Result<Self, Error> {
        options.validate()?;
        let clock = TempoClock::new(options.sample_rate, options.bpm)?;
        log::info!(
            "creating engine at {}Hz and {} bpm",
            options.sample_rate,
            options.bpm
        );
        Ok(Self {
            sample_rate: options.sample_rate,
            clock,
            voices: Vec::new(),
            max_block_frames: options.max_block_frames,
            mix_buffer: vec![0.0; options.max_block_frames],
            voice_buffer: vec![0.0; options.max_block_frames],
            status: Arc::new(SharedStatus::new()),
            cpu_load_meter: CpuLoadMeter::new(options.sample_rate, options.sample_rate as u64),
            cpu_load: CpuLoad::default(),
        })
    }

    /// Output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Add a new voice. Its sample rate must match the engine's rate.
    ///
    /// Voices should only be added while the engine is not processing, e.g. before handing it
    /// over to an output.
    pub fn add_voice(&mut self, mut voice: Voice) -> Result<(), Error> {
        if voice.sample_rate() != self.sample_rate {
            return Err(Error::ParameterError(format!(
                "voice '{}' has a sample rate of {}Hz, but the engine runs at {}Hz",
                voice.name(),
                voice.sample_rate(),
                self.sample_rate
            )));
        }
        voice.prepare(self.max_block_frames);
        log::info!(
            "adding voice #{} '{}': grain length {} frames every {:.1} frames",
            self.voices.len(),
            voice.name(),
            voice.grain_length(),
            voice.grain_interval()
        );
        self.voices.push(voice);
        self.status.set_voice_count(self.voices.len());
        Ok(())
    }

    /// All voices in playback order.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Number of voices in the engine.
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Access to the engine's tempo clock.
    pub fn clock(&self) -> &TempoClock {
        &self.clock
    }

    /// Current tempo in beats per minute.
    pub fn bpm(&self) -> f64 {
        self.clock.bpm()
    }

    /// Change the tempo. Rejects non finite or non positive values, keeping the previous tempo.
    pub fn set_bpm(&self, bpm: f64) -> Result<(), Error> {
        self.clock.set_bpm(bpm)
    }

    /// Current beat position.
    pub fn beat(&self) -> f64 {
        self.clock.beat()
    }

    /// A handle to change the tempo from other threads.
    pub fn tempo_handle(&self) -> TempoHandle {
        self.clock.handle()
    }

    /// A handle to observe the engine's status from other threads.
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle::new(Arc::clone(&self.status), self.clock.handle())
    }

    /// Current status of the engine.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            bpm: self.clock.bpm(),
            beat: self.clock.beat(),
            sample_position: self.clock.sample_position(),
            voice_count: self.voices.len(),
            active_grain_count: self.active_grain_count(),
            cpu_load: self.cpu_load,
        }
    }

    /// CPU load of the last completed measurement interval.
    pub fn cpu_load(&self) -> CpuLoad {
        self.cpu_load
    }

    /// Number of grains playing in all voices.
    pub fn active_grain_count(&self) -> usize {
        self.voices.iter().map(Voice::active_grain_count).sum()
    }

    /// Rewind the clock and all voices.
    pub fn reset(&mut self) {
        self.clock.reset();
        for voice in &mut self.voices {
            voice.reset();
        }
        self.cpu_load_meter.reset();
        self.status.publish(0.0, 0, 0);
    }

    /// Render the next `frame_count` frames into a new buffer. Allocates: use
    /// [`Engine::process`] in real-time contexts.
    pub fn tick<S: OutputSample>(&mut self, frame_count: usize) -> Vec<S> {
        let mut output = vec![S::EQUILIBRIUM; frame_count];
        self.process(&mut output);
        output
    }

    /// Render the next `output.len()` frames into the given buffer.
    pub fn process<S: OutputSample>(&mut self, output: &mut [S]) {
        if output.is_empty() {
            return;
        }
        let start_time = Instant::now();
        self.clock.advance(output.len());

        for chunk in output.chunks_mut(self.max_block_frames) {
            let frame_count = chunk.len();
            let mix_buffer = &mut self.mix_buffer[..frame_count];
            let voice_buffer = &mut self.voice_buffer[..frame_count];

            clear_buffer(mix_buffer);
            for voice in &mut self.voices {
                voice.process(voice_buffer);
                add_buffers(mix_buffer, voice_buffer);
            }
            clamp_buffer(mix_buffer, 1.0);

            for (o, m) in chunk.iter_mut().zip(mix_buffer.iter()) {
                *o = S::from_clamped(*m);
            }
        }

        self.status.publish(
            self.clock.beat(),
            self.clock.sample_position(),
            self.active_grain_count(),
        );

        if let Some(cpu_load) = self
            .cpu_load_meter
            .record(start_time.elapsed(), output.len())
        {
            self.cpu_load = cpu_load;
            self.status.publish_cpu_load(cpu_load);
        }
    }
}

// -------------------------------------------------------------------------------------------------
