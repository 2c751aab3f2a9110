//! Offline sample rate conversion of preloaded mono buffers.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::Error;

// -------------------------------------------------------------------------------------------------

const CHUNK_SIZE: usize = 1024;

// -------------------------------------------------------------------------------------------------

/// Convert a mono buffer from `input_rate` to `output_rate` with a bandlimited sinc resampler.
///
/// The resampler's delay is compensated, so the output is aligned with the input and has
/// `round(len * output_rate / input_rate)` samples. Allocates: call this when loading files,
/// never from the audio thread.
pub fn resample_mono(samples: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>, Error> {
    if input_rate == 0 || output_rate == 0 {
        return Err(Error::ParameterError(
            "resampling rates must be > 0".to_string(),
        ));
    }
    if input_rate == output_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = output_rate as f64 / input_rate as f64;
    let parameters = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, parameters, CHUNK_SIZE, 1)?;

    let expected_len = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected_len + delay + resampler.output_frames_max());

    let mut chunks = samples.chunks_exact(CHUNK_SIZE);
    for chunk in &mut chunks {
        let resampled = resampler.process(&[chunk], None)?;
        output.extend_from_slice(&resampled[0]);
    }
    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let resampled = resampler.process_partial(Some(&[remainder][..]), None)?;
        output.extend_from_slice(&resampled[0]);
    }
    // flush the resampler's delay line
    while output.len() < expected_len + delay {
        let resampled = resampler.process_partial(None::<&[Vec<f32>]>, None)?;
        if resampled[0].is_empty() {
            break;
        }
        output.extend_from_slice(&resampled[0]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected_len, 0.0);
    Ok(output)
}

// -------------------------------------------------------------------------------------------------

impl From<rubato::ResamplerConstructionError> for Error {
    fn from(err: rubato::ResamplerConstructionError) -> Error {
        Error::ResamplingError(Box::new(err))
    }
}

impl From<rubato::ResampleError> for Error {
    fn from(err: rubato::ResampleError) -> Error {
        Error::ResamplingError(Box::new(err))
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;

    fn sine(sample_rate: u32, frequency: f32) -> Vec<f32> {
        (0..sample_rate)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    fn zero_crossings(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|pair| (pair[0] < 0.0) != (pair[1] < 0.0))
            .count()
    }

    #[test]
    fn same_rate_is_a_copy() -> Result<(), Error> {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_mono(&samples, 44100, 44100)?, samples);
        assert!(resample_mono(&[], 48000, 44100)?.is_empty());
        assert!(resample_mono(&samples, 0, 44100).is_err());
        Ok(())
    }

    #[test]
    fn down_and_up_sampling() -> Result<(), Error> {
        for (input_rate, output_rate) in [(48000, 44100), (22050, 44100)] {
            let input = sine(input_rate, 440.0);
            let output = resample_mono(&input, input_rate, output_rate)?;
            // one second of audio stays one second long
            assert_eq!(output.len(), output_rate as usize);
            // and keeps its pitch: 440 periods with two zero crossings each
            let crossings = zero_crossings(&output);
            assert!((876..=884).contains(&crossings), "crossings: {crossings}");
            // and its level, away from the edges
            let peak = output[1000..output.len() - 1000]
                .iter()
                .fold(0.0_f32, |peak, s| peak.max(s.abs()));
            assert!((peak - 0.5).abs() < 0.02, "peak: {peak}");
        }
        Ok(())
    }
}
