//! Tempo clock: maps elapsed sample frames to musical beats.

use std::sync::{atomic::Ordering, Arc};

use atomic_float::AtomicF64;

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Validate a beats per minute value. Returns Error::ParameterError on errors.
pub(crate) fn validate_bpm(bpm: f64) -> Result<(), Error> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(Error::ParameterError(format!(
            "bpm must be a finite value > 0, but is '{bpm}'"
        )));
    }
    Ok(())
}

// -------------------------------------------------------------------------------------------------

/// Transport state, which converts elapsed sample frames into beats at a mutable tempo.
///
/// The clock itself is owned and advanced by the audio thread. The tempo lives in a single
/// atomic slot which can be changed from other threads via a [`TempoHandle`]. Tempo changes
/// apply to all frames advanced after the change; the already elapsed beat position is never
/// recalculated, so tempo changes never make the beat position jump.
///
/// Beats are derived from the frames elapsed since the last tempo change, so the position
/// doesn't accumulate rounding errors over long runs with many small blocks.
#[derive(Debug)]
pub struct TempoClock {
    sample_rate: u32,
    tempo: Arc<AtomicF64>,
    bpm: f64,
    samples_per_beat: f64,
    sample_position: u64,
    beat: f64,
    // position of the last applied tempo change
    position_at_change: u64,
    beat_at_change: f64,
}

impl TempoClock {
    /// Create a new clock at position 0 with the given sample rate and initial tempo.
    pub fn new(sample_rate: u32, bpm: f64) -> Result<Self, Error> {
        if sample_rate == 0 {
            return Err(Error::ParameterError(
                "clock sample rate must be > 0".to_string(),
            ));
        }
        validate_bpm(bpm)?;
        Ok(Self {
            sample_rate,
            tempo: Arc::new(AtomicF64::new(bpm)),
            bpm,
            samples_per_beat: Self::samples_per_beat_at(sample_rate, bpm),
            sample_position: 0,
            beat: 0.0,
            position_at_change: 0,
            beat_at_change: 0.0,
        })
    }

    /// A handle to read or change the clock's tempo from any thread.
    pub fn handle(&self) -> TempoHandle {
        TempoHandle {
            tempo: Arc::clone(&self.tempo),
        }
    }

    /// The clock's sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current tempo in beats per minute.
    #[inline]
    pub fn bpm(&self) -> f64 {
        self.tempo.load(Ordering::Acquire)
    }

    /// Change the tempo. Rejects non finite or non positive values, keeping the previous tempo.
    pub fn set_bpm(&self, bpm: f64) -> Result<(), Error> {
        validate_bpm(bpm)?;
        self.tempo.store(bpm, Ordering::Release);
        Ok(())
    }

    /// Number of sample frames per beat at the current tempo.
    pub fn samples_per_beat(&self) -> f64 {
        Self::samples_per_beat_at(self.sample_rate, self.bpm())
    }

    /// Total number of sample frames the clock advanced.
    #[inline]
    pub fn sample_position(&self) -> u64 {
        self.sample_position
    }

    /// Current, fractional beat position.
    #[inline]
    pub fn beat(&self) -> f64 {
        self.beat
    }

    /// Move the clock forward by the given number of frames, applying the latest tempo.
    pub fn advance(&mut self, frame_count: usize) {
        let bpm = self.bpm();
        if bpm != self.bpm {
            self.bpm = bpm;
            self.samples_per_beat = Self::samples_per_beat_at(self.sample_rate, bpm);
            self.position_at_change = self.sample_position;
            self.beat_at_change = self.beat;
        }
        self.sample_position += frame_count as u64;
        self.beat = self.beat_at_change
            + (self.sample_position - self.position_at_change) as f64 / self.samples_per_beat;
    }

    /// Rewind the clock to position 0, keeping its tempo.
    pub fn reset(&mut self) {
        self.sample_position = 0;
        self.beat = 0.0;
        self.position_at_change = 0;
        self.beat_at_change = 0.0;
    }

    #[inline]
    fn samples_per_beat_at(sample_rate: u32, bpm: f64) -> f64 {
        sample_rate as f64 * 60.0 / bpm
    }
}

// -------------------------------------------------------------------------------------------------

/// Thread-safe handle to a [`TempoClock`]'s tempo.
///
/// Reads and writes are single atomic operations, so readers never observe partially written
/// values. The audio thread picks up a new tempo with its next block.
#[derive(Debug, Clone)]
pub struct TempoHandle {
    tempo: Arc<AtomicF64>,
}

impl TempoHandle {
    /// Current tempo in beats per minute.
    pub fn bpm(&self) -> f64 {
        self.tempo.load(Ordering::Acquire)
    }

    /// Change the tempo. Rejects non finite or non positive values, keeping the previous tempo.
    pub fn set_bpm(&self, bpm: f64) -> Result<(), Error> {
        validate_bpm(bpm)?;
        self.tempo.store(bpm, Ordering::Release);
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn invalid_construction() {
        assert!(TempoClock::new(0, 120.0).is_err());
        assert!(TempoClock::new(44100, 0.0).is_err());
        assert!(TempoClock::new(44100, -90.0).is_err());
        assert!(TempoClock::new(44100, f64::INFINITY).is_err());
    }

    #[test]
    fn beat_position() -> Result<(), Error> {
        let mut clock = TempoClock::new(44100, 120.0)?;
        assert_eq!(clock.samples_per_beat(), 22050.0);

        clock.advance(4096);
        assert_eq!(clock.sample_position(), 4096);
        assert_eq!(clock.beat(), 4096.0 / (44100.0 * 60.0 / 120.0));

        clock.advance(22050 - 4096);
        assert!((clock.beat() - 1.0).abs() < 1e-12);

        clock.reset();
        assert_eq!(clock.sample_position(), 0);
        assert_eq!(clock.beat(), 0.0);
        assert_eq!(clock.bpm(), 120.0);
        Ok(())
    }

    #[test]
    fn no_drift_with_small_blocks() -> Result<(), Error> {
        let mut clock = TempoClock::new(44100, 133.0)?;
        let block_sizes = [1, 7, 64, 333, 1000];
        // almost two hours of audio
        for block in 0..1_000_000 {
            clock.advance(block_sizes[block % block_sizes.len()]);
        }
        let position = clock.sample_position();
        assert_eq!(position, 1405 * 200_000);
        assert_eq!(clock.beat(), position as f64 / clock.samples_per_beat());

        // after a tempo change, beats continue from the change position
        let beat_at_change = clock.beat();
        clock.set_bpm(97.0)?;
        for block in 0..100_000 {
            clock.advance(block_sizes[block % block_sizes.len()]);
        }
        let elapsed = clock.sample_position() - position;
        assert_eq!(
            clock.beat(),
            beat_at_change + elapsed as f64 / clock.samples_per_beat()
        );
        Ok(())
    }

    #[test]
    fn tempo_changes_are_not_retroactive() -> Result<(), Error> {
        let mut clock = TempoClock::new(48000, 90.0)?;
        clock.advance(12345);
        let beat_before = clock.beat();

        clock.set_bpm(140.0)?;
        clock.advance(1000);
        let expected = 1000.0 / (48000.0 * 60.0 / 140.0);
        assert!((clock.beat() - beat_before - expected).abs() < 1e-12);
        assert_eq!(clock.sample_position(), 13345);
        Ok(())
    }

    #[test]
    fn reject_invalid_bpm() -> Result<(), Error> {
        let clock = TempoClock::new(44100, 120.0)?;
        assert!(clock.set_bpm(0.0).is_err());
        assert!(clock.set_bpm(-10.0).is_err());
        assert!(clock.set_bpm(f64::NAN).is_err());
        assert_eq!(clock.bpm(), 120.0);

        let handle = clock.handle();
        assert!(handle.set_bpm(0.0).is_err());
        assert_eq!(handle.bpm(), 120.0);
        Ok(())
    }

    #[test]
    fn tempo_from_other_thread() -> Result<(), Error> {
        let mut clock = TempoClock::new(44100, 120.0)?;
        let handle = clock.handle();

        let writer = thread::spawn(move || {
            for step in 0..1000 {
                let bpm = if step % 2 == 0 { 90.0 } else { 150.0 };
                handle.set_bpm(bpm).expect("valid bpm");
            }
            handle.set_bpm(100.0).expect("valid bpm");
        });
        for _ in 0..1000 {
            clock.advance(64);
            let bpm = clock.bpm();
            assert!(bpm == 120.0 || bpm == 90.0 || bpm == 150.0 || bpm == 100.0);
        }
        writer.join().expect("writer thread panicked");

        let beat_before = clock.beat();
        clock.advance(26460);
        assert_eq!(clock.bpm(), 100.0);
        assert!((clock.beat() - beat_before - 1.0).abs() < 1e-9);
        Ok(())
    }
}
