//! Fixed rate grain trigger timing.

use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Countdown timer which triggers grain spawns at a fixed rate.
///
/// The countdown is kept as a fractional sample count, so rates which do not evenly divide
/// the sample rate don't drift: each trigger adds the interval to the remaining countdown
/// instead of resetting it.
#[derive(Debug, Clone)]
pub struct GrainScheduler {
    interval: f64,
    countdown: f64,
}

impl GrainScheduler {
    /// Create a new scheduler which triggers `rate_hz` times per second at the given sample
    /// rate. The first trigger happens after one full interval.
    pub fn new(sample_rate: u32, rate_hz: f32) -> Result<Self, Error> {
        if sample_rate == 0 {
            return Err(Error::ParameterError(
                "scheduler sample rate must be > 0".to_string(),
            ));
        }
        if !rate_hz.is_finite() || rate_hz <= 0.0 {
            return Err(Error::ParameterError(format!(
                "grain rate must be > 0 Hz, but is '{rate_hz}'"
            )));
        }
        Self::with_interval(sample_rate as f64 / rate_hz as f64)
    }

    /// Create a new scheduler with the given trigger interval in samples.
    pub fn with_interval(interval: f64) -> Result<Self, Error> {
        if !interval.is_finite() || interval < 1.0 {
            return Err(Error::ParameterError(format!(
                "grain trigger interval must be >= 1 sample, but is '{interval}'"
            )));
        }
        Ok(Self {
            interval,
            countdown: interval,
        })
    }

    /// Trigger interval in samples.
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Samples left until the next trigger.
    pub fn countdown(&self) -> f64 {
        self.countdown
    }

    /// Restart counting from a full interval.
    pub fn reset(&mut self) {
        self.countdown = self.interval;
    }

    /// Advance the countdown by `sample_count` samples and return all triggers which happen
    /// within this range, in temporal order. See [`GrainSpawns`].
    pub fn advance(&mut self, sample_count: usize) -> GrainSpawns {
        let spawns = GrainSpawns {
            next: self.countdown,
            interval: self.interval,
            sample_count: sample_count as f64,
        };
        self.countdown = spawns.first_after_block() - sample_count as f64;
        debug_assert!(self.countdown > 0.0 && self.countdown <= self.interval + 1e-6);
        spawns
    }
}

// -------------------------------------------------------------------------------------------------

/// Iterator over grain spawn events of a single [`GrainScheduler::advance`] call.
///
/// Yields each event's frame offset within the advanced block: the index of the sample at
/// which the countdown reached zero, so offsets are always `< sample_count`.
#[derive(Debug, Clone, Copy)]
pub struct GrainSpawns {
    next: f64,
    interval: f64,
    sample_count: f64,
}

impl GrainSpawns {
    /// Countdown position of the first trigger after the advanced block.
    fn first_after_block(mut self) -> f64 {
        while self.next <= self.sample_count {
            self.next += self.interval;
        }
        self.next
    }
}

impl Iterator for GrainSpawns {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next <= self.sample_count {
            let offset = (self.next.ceil() as usize).saturating_sub(1);
            self.next += self.interval;
            Some(offset)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = (*self).count();
        (count, Some(count))
    }
}

impl ExactSizeIterator for GrainSpawns {}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_rates() {
        assert!(GrainScheduler::new(0, 25.0).is_err());
        assert!(GrainScheduler::new(44100, 0.0).is_err());
        assert!(GrainScheduler::new(44100, -1.0).is_err());
        assert!(GrainScheduler::new(44100, f32::NAN).is_err());
        assert!(GrainScheduler::with_interval(0.5).is_err());
    }

    #[test]
    fn single_sample_steps() -> Result<(), Error> {
        let mut scheduler = GrainScheduler::new(44100, 25.0)?;
        assert_eq!(scheduler.interval(), 1764.0);

        let mut spawn_positions = Vec::new();
        for sample in 0..10_000 {
            if scheduler.advance(1).len() > 0 {
                spawn_positions.push(sample);
            }
        }
        assert_eq!(spawn_positions, vec![1763, 3527, 5291, 7055, 8819]);
        Ok(())
    }

    #[test]
    fn block_steps_match_single_steps() -> Result<(), Error> {
        for block_size in [1, 64, 512, 1764, 4096, 10_000] {
            let mut scheduler = GrainScheduler::new(44100, 25.0)?;
            let mut spawn_positions = Vec::new();
            let mut block_start = 0;
            while block_start < 10_000 {
                let block_len = block_size.min(10_000 - block_start);
                for offset in scheduler.advance(block_len) {
                    assert!(offset < block_len);
                    spawn_positions.push(block_start + offset);
                }
                block_start += block_len;
            }
            assert_eq!(
                spawn_positions,
                vec![1763, 3527, 5291, 7055, 8819],
                "block size {block_size}"
            );
        }
        Ok(())
    }

    #[test]
    fn multiple_spawns_per_call() -> Result<(), Error> {
        let mut scheduler = GrainScheduler::with_interval(100.0)?;
        let spawns = scheduler.advance(1000);
        assert_eq!(spawns.len(), 10);
        assert_eq!(
            spawns.collect::<Vec<_>>(),
            vec![99, 199, 299, 399, 499, 599, 699, 799, 899, 999]
        );
        assert_eq!(scheduler.countdown(), 100.0);

        assert_eq!(scheduler.advance(0).len(), 0);
        assert_eq!(scheduler.countdown(), 100.0);
        Ok(())
    }

    #[test]
    fn fractional_interval_does_not_drift() -> Result<(), Error> {
        // 44100 / 40 = 1102.5 samples
        let mut scheduler = GrainScheduler::new(44100, 40.0)?;
        let mut spawn_count = 0;
        for _ in 0..(44100 / 100) {
            spawn_count += scheduler.advance(100).len();
        }
        assert_eq!(spawn_count, 40);
        assert!(scheduler.countdown() > 0.0 && scheduler.countdown() <= scheduler.interval());
        Ok(())
    }

    #[test]
    fn reset() -> Result<(), Error> {
        let mut scheduler = GrainScheduler::with_interval(10.0)?;
        let _ = scheduler.advance(7);
        assert_eq!(scheduler.countdown(), 3.0);
        scheduler.reset();
        assert_eq!(scheduler.countdown(), 10.0);
        Ok(())
    }
}
