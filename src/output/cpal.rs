use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

#[cfg(feature = "assert-allocs")]
use assert_no_alloc::*;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SizedSample, StreamConfig,
};

use crate::{
    error::Error,
    utils::{buffer::mono_to_interleaved, sample::OutputSample},
    Engine,
};

// -------------------------------------------------------------------------------------------------

const PREFERRED_CHANNELS: cpal::ChannelCount = 1;
const PREFERRED_BUFFER_SIZE: cpal::BufferSize = if cfg!(debug_assertions) {
    cpal::BufferSize::Default
} else {
    cpal::BufferSize::Fixed(1024)
};

/// Size of the mono render buffer. Larger device buffers are rendered in chunks.
const RENDER_BUFFER_FRAMES: usize = 2048;

// -------------------------------------------------------------------------------------------------

/// Plays an [`Engine`] on the system's default audio output device.
///
/// The engine is moved into the device's audio callback. Use the engine's tempo and status
/// handles to control and observe it after opening the output.
///
/// The mono engine output is copied to all device channels. The device must support the
/// engine's sample rate in `f32` or `i16` sample format: resampling is not performed.
pub struct CpalOutput {
    stream: cpal::Stream,
    _device: cpal::Device,
    channel_count: usize,
    sample_rate: u32,
    playback_pos: Arc<AtomicU64>,
}

impl CpalOutput {
    /// Open the default output device and start playing the given engine.
    pub fn open(engine: Engine) -> Result<Self, Error> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(cpal::DefaultStreamConfigError::DeviceNotAvailable)?;

        if let Ok(name) = device.name() {
            log::info!("using audio device: {}", name);
        }

        let supported = Self::preferred_output_config(&device, engine.sample_rate())?;
        let config = StreamConfig {
            buffer_size: PREFERRED_BUFFER_SIZE,
            ..supported.config()
        };
        let channel_count = config.channels as usize;
        let playback_pos = Arc::new(AtomicU64::new(0));

        log::info!(
            "opening output stream: {:?} {:?}",
            supported.sample_format(),
            config
        );
        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config, engine, Arc::clone(&playback_pos))?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config, engine, Arc::clone(&playback_pos))?
            }
            sample_format => {
                return Err(Error::OutputDeviceError(
                    format!("unsupported output sample format: {sample_format}").into(),
                ))
            }
        };
        stream.play()?;

        Ok(Self {
            stream,
            _device: device,
            channel_count,
            sample_rate: config.sample_rate.0,
            playback_pos,
        })
    }

    /// Actual device's output channel count.
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Actual device's output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames the device consumed so far.
    pub fn sample_position(&self) -> u64 {
        self.playback_pos.load(Ordering::Relaxed)
    }

    /// Pause playback. The engine does not advance while paused.
    pub fn pause(&self) -> Result<(), Error> {
        log::debug!("pausing audio output stream");
        Ok(self.stream.pause()?)
    }

    /// Resume paused playback.
    pub fn resume(&self) -> Result<(), Error> {
        log::debug!("resuming audio output stream");
        Ok(self.stream.play()?)
    }

    /// Stop playback and release the device, dropping the engine.
    pub fn close(self) {
        log::debug!("closing audio output stream");
        if let Err(err) = self.stream.pause() {
            log::warn!("failed to pause stream before closing: {}", err);
        }
    }

    fn preferred_output_config(
        device: &cpal::Device,
        sample_rate: u32,
    ) -> Result<cpal::SupportedStreamConfig, Error> {
        let sample_rate = cpal::SampleRate(sample_rate);
        let mut fallback = None;
        for s in device.supported_output_configs()? {
            let rates = s.min_sample_rate()..=s.max_sample_rate();
            let formats = [cpal::SampleFormat::F32, cpal::SampleFormat::I16];
            if !rates.contains(&sample_rate) || !formats.contains(&s.sample_format()) {
                continue;
            }
            if s.channels() == PREFERRED_CHANNELS {
                return Ok(s.with_sample_rate(sample_rate));
            }
            if fallback.is_none() {
                fallback = Some(s.with_sample_rate(sample_rate));
            }
        }
        if let Some(config) = fallback {
            return Ok(config);
        }

        let default = device.default_output_config()?;
        if default.sample_rate() != sample_rate {
            return Err(Error::OutputDeviceError(
                format!(
                    "output device does not support a sample rate of {}Hz",
                    sample_rate.0
                )
                .into(),
            ));
        }
        Ok(default)
    }

    fn build_stream<S: OutputSample + SizedSample>(
        device: &cpal::Device,
        config: &StreamConfig,
        engine: Engine,
        playback_pos: Arc<AtomicU64>,
    ) -> Result<cpal::Stream, Error> {
        let mut callback = StreamCallback {
            engine,
            buffer: vec![S::EQUILIBRIUM; RENDER_BUFFER_FRAMES],
            channel_count: config.channels as usize,
            playback_pos,
        };
        let stream = device.build_output_stream(
            config,
            move |output: &mut [S], _: &cpal::OutputCallbackInfo| {
                #[cfg(not(feature = "assert-allocs"))]
                callback.write_samples(output);
                #[cfg(feature = "assert-allocs")]
                assert_no_alloc(|| callback.write_samples(output));
            },
            |err| {
                log::error!("audio output error: {}", err);
            },
            None,
        )?;
        Ok(stream)
    }
}

// -------------------------------------------------------------------------------------------------

struct StreamCallback<S: OutputSample> {
    engine: Engine,
    buffer: Vec<S>,
    channel_count: usize,
    playback_pos: Arc<AtomicU64>,
}

impl<S: OutputSample> StreamCallback<S> {
    fn write_samples(&mut self, output: &mut [S]) {
        let mut frame_count = 0;
        for chunk in output.chunks_mut(self.buffer.len() * self.channel_count) {
            let chunk_frames = chunk.len() / self.channel_count;
            let mono = &mut self.buffer[..chunk_frames];
            self.engine.process(mono);
            mono_to_interleaved(mono, chunk, self.channel_count);
            frame_count += chunk_frames;
        }
        self.playback_pos
            .fetch_add(frame_count as u64, Ordering::Relaxed);
    }
}

// -------------------------------------------------------------------------------------------------

impl From<cpal::DefaultStreamConfigError> for Error {
    fn from(err: cpal::DefaultStreamConfigError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::SupportedStreamConfigsError> for Error {
    fn from(err: cpal::SupportedStreamConfigsError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::BuildStreamError> for Error {
    fn from(err: cpal::BuildStreamError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::PlayStreamError> for Error {
    fn from(err: cpal::PlayStreamError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::PauseStreamError> for Error {
    fn from(err: cpal::PauseStreamError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}
