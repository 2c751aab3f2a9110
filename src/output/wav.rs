use std::{path::Path, time::Duration};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{error::Error, Engine};

// -------------------------------------------------------------------------------------------------

const BUFFER_SIZE_FRAMES: usize = 1024;

// -------------------------------------------------------------------------------------------------

/// Render the given engine offline into a 16-bit mono wav file.
///
/// Renders `duration` worth of frames at the engine's sample rate, starting at the engine's
/// current position. Returns the number of written frames.
pub fn render_to_wav<P: AsRef<Path>>(
    engine: &mut Engine,
    file_path: P,
    duration: Duration,
) -> Result<u64, Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: engine.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let frame_count = (duration.as_secs_f64() * spec.sample_rate as f64).round() as u64;
    log::info!(
        "rendering {} frames into '{}'",
        frame_count,
        file_path.as_ref().display()
    );

    let mut writer = WavWriter::create(file_path, spec)?;
    let mut buffer = vec![0_i16; BUFFER_SIZE_FRAMES];
    let mut written = 0;
    while written < frame_count {
        let block_len = (frame_count - written).min(BUFFER_SIZE_FRAMES as u64) as usize;
        let block = &mut buffer[..block_len];
        engine.process(block);
        for sample in block.iter() {
            writer.write_sample(*sample)?;
        }
        written += block_len as u64;
    }
    writer.finalize()?;

    log::debug!("engine status after rendering: {}", engine.status());
    Ok(written)
}

// -------------------------------------------------------------------------------------------------

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Error {
        match err {
            hound::Error::IoError(err) => Error::IoError(err),
            err => Error::OutputDeviceError(Box::new(err)),
        }
    }
}

// -------------------------------------------------------------------------------------------------
