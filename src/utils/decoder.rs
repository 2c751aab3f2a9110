use std::{fs::File, io, path::Path};

use symphonia::core::{
    audio::{SampleBuffer, SignalSpec},
    codecs::{Decoder, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::error::Error;

// -------------------------------------------------------------------------------------------------

/// A fully decoded, mono audio file.
#[derive(Debug, Clone, Default)]
pub struct DecodedBuffer {
    /// Mono samples in range -1.0..=1.0.
    pub samples: Vec<f32>,
    /// Sample rate of the decoded samples.
    pub sample_rate: u32,
}

// -------------------------------------------------------------------------------------------------

/// Decode the given audio file into a mono buffer. Multi channel files are down-mixed by
/// averaging all channels of a frame.
pub fn load_mono_file<P: AsRef<Path>>(path: P) -> Result<DecodedBuffer, Error> {
    let mut decoder = AudioDecoder::from_file(path.as_ref())?;
    let sample_rate = decoder.sample_rate().ok_or(Error::MediaFileProbeError)?;

    let mut samples = Vec::with_capacity(decoder.frame_count_hint().unwrap_or(0) as usize);
    while decoder.read_packet(&mut samples).is_some() {}

    if samples.is_empty() {
        return Err(Error::AudioDecodingError(Box::new(
            SymphoniaError::DecodeError("file contains no audio frames"),
        )));
    }
    log::info!(
        "decoded '{}': {} frames at {} Hz",
        path.as_ref().display(),
        samples.len(),
        sample_rate
    );
    Ok(DecodedBuffer {
        samples,
        sample_rate,
    })
}

// -------------------------------------------------------------------------------------------------

/// Thin wrapper around a symphonia format reader and decoder for the file's default track.
pub struct AudioDecoder {
    track_id: u32,
    decoder: Box<dyn Decoder>,
    format: Box<dyn FormatReader>,
    sample_buffer: Option<SampleBuffer<f32>>,
    sample_buffer_frames: u64,
}

impl AudioDecoder {
    /// Create a new decoder from the given file path.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)?;
        let source_stream = MediaSourceStream::new(Box::new(file), Default::default());

        // Help the format registry to guess what format reader is appropriate.
        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }
        Self::from_source_stream(source_stream, hint)
    }

    /// Create a new decoder from the given symphonia MediaSourceStream.
    pub fn from_source_stream(source_stream: MediaSourceStream, hint: Hint) -> Result<Self, Error> {
        // Use the default options when reading and decoding.
        let format_opts: FormatOptions = Default::default();
        let metadata_opts: MetadataOptions = Default::default();
        let decoder_opts: DecoderOptions = Default::default();

        // Probe the media source stream for a format.
        let probed = symphonia::default::get_probe()
            .format(&hint, source_stream, &format_opts, &metadata_opts)
            .map_err(|_| Error::MediaFileProbeError)?;

        let format = probed.format;
        let track = format.default_track().ok_or(Error::MediaFileProbeError)?;
        let track_id = track.id;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &decoder_opts)
            .map_err(|err| Error::AudioDecodingError(Box::new(err)))?;

        Ok(Self {
            track_id,
            decoder,
            format,
            sample_buffer: None,
            sample_buffer_frames: 0,
        })
    }

    /// The decoded track's sample rate, if known.
    pub fn sample_rate(&self) -> Option<u32> {
        self.decoder.codec_params().sample_rate
    }

    /// Total number of frames in the track, if known.
    pub fn frame_count_hint(&self) -> Option<u64> {
        self.decoder.codec_params().n_frames
    }

    /// Decode the next packet and append its down-mixed mono samples to `output`.
    /// Returns `None` on EOF or unrecoverable errors.
    pub fn read_packet(&mut self, output: &mut Vec<f32>) -> Option<usize> {
        loop {
            // Demux an encoded packet from the media format.
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(io)) if io.kind() == io::ErrorKind::UnexpectedEof => {
                    return None; // End of this stream.
                }
                Err(err) => {
                    log::error!("format error: {err}");
                    return None;
                }
            };
            // If the packet does not belong to the selected track, skip over it.
            if packet.track_id() != self.track_id {
                continue;
            }
            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::IoError(err)) => {
                    log::warn!("io decode error: {err}");
                    continue;
                }
                Err(SymphoniaError::DecodeError(err)) => {
                    log::warn!("decode error: {err}");
                    continue;
                }
                Err(err) => {
                    log::error!("fatal decode error: {err}");
                    return None;
                }
            };
            let spec: SignalSpec = *decoded.spec();
            let frames = decoded.capacity() as u64;
            if self.sample_buffer.is_none() || self.sample_buffer_frames < frames {
                self.sample_buffer = Some(SampleBuffer::new(frames, spec));
                self.sample_buffer_frames = frames;
            }
            let Some(sample_buffer) = self.sample_buffer.as_mut() else {
                return None;
            };
            sample_buffer.copy_interleaved_ref(decoded);

            let channel_count = spec.channels.count().max(1);
            let samples = sample_buffer.samples();
            let frame_count = samples.len() / channel_count;
            match channel_count {
                1 => output.extend_from_slice(samples),
                _ => output.extend(
                    samples
                        .chunks_exact(channel_count)
                        .map(|frame| frame.iter().sum::<f32>() / channel_count as f32),
                ),
            }
            return Some(frame_count);
        }
    }
}

// -------------------------------------------------------------------------------------------------
