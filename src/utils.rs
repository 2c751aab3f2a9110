//! Buffer, window and sample format helpers used by the engine and its outputs.

pub mod buffer;
pub mod decoder;
pub mod resampler;
pub mod sample;
pub mod window;

// -------------------------------------------------------------------------------------------------

/// Convert a duration in milliseconds into a number of sample frames at the given rate.
pub fn milliseconds_to_frames(milliseconds: f32, sample_rate: u32) -> usize {
    debug_assert!(sample_rate > 0, "Invalid sample rate");
    (sample_rate as f64 * milliseconds as f64 / 1000.0) as usize
}

// -------------------------------------------------------------------------------------------------
