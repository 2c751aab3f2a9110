//! Engine telemetry: playback status and CPU load, published lock-free by the audio thread.

use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use atomic_float::{AtomicF32, AtomicF64};

use super::clock::TempoHandle;

// -------------------------------------------------------------------------------------------------

/// Snapshot of an engine's playback state, as published by the audio thread.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct EngineStatus {
    /// Current tempo in beats per minute.
    pub bpm: f64,
    /// Beat position at the end of the last processed block.
    pub beat: f64,
    /// Total number of processed sample frames.
    pub sample_position: u64,
    /// Number of voices in the engine.
    pub voice_count: usize,
    /// Number of grains playing in all voices at the end of the last processed block.
    pub active_grain_count: usize,
    /// CPU load of the engine's processing, updated once per second of processed audio.
    pub cpu_load: CpuLoad,
}

impl Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{:.2} bpm, beat {:.2}, {} voices, {} grains, cpu {}",
            self.bpm, self.beat, self.voice_count, self.active_grain_count, self.cpu_load
        ))
    }
}

// -------------------------------------------------------------------------------------------------

/// CPU load of the engine's audio processing.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct CpuLoad {
    /// Average CPU load over the measurement interval. A value of 1.0 means processing took
    /// as much time as the duration of the audio it produced.
    pub average: f32,
    /// Peak CPU load of a single block in the last measurement interval.
    pub peak: f32,
}

impl Display for CpuLoad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "{:.2}% ({:.2}%)",
            self.average * 100.0,
            self.peak * 100.0
        ))
    }
}

// -------------------------------------------------------------------------------------------------

/// Accumulates processing times of audio blocks and computes a [`CpuLoad`] once per
/// measurement interval. The interval is counted in processed frames, not wall clock time.
#[derive(Debug, Clone)]
pub(crate) struct CpuLoadMeter {
    sample_rate: u32,
    interval_frames: u64,
    processing_time: Duration,
    frames: u64,
    peak: f32,
}

impl CpuLoadMeter {
    /// Create a meter which reports once per `interval_frames` processed frames.
    pub fn new(sample_rate: u32, interval_frames: u64) -> Self {
        debug_assert!(sample_rate > 0, "invalid sample rate");
        Self {
            sample_rate,
            interval_frames: interval_frames.max(1),
            processing_time: Duration::ZERO,
            frames: 0,
            peak: 0.0,
        }
    }

    /// Record the processing time of a single block. Returns the load of the finished
    /// interval, when the block completed one.
    pub fn record(&mut self, processing_time: Duration, frame_count: usize) -> Option<CpuLoad> {
        if frame_count == 0 {
            return None;
        }
        let audio_secs = frame_count as f64 / self.sample_rate as f64;
        let block_load = (processing_time.as_secs_f64() / audio_secs) as f32;
        self.peak = self.peak.max(block_load);
        self.processing_time += processing_time;
        self.frames += frame_count as u64;

        if self.frames < self.interval_frames {
            return None;
        }
        let total_audio_secs = self.frames as f64 / self.sample_rate as f64;
        let load = CpuLoad {
            average: (self.processing_time.as_secs_f64() / total_audio_secs) as f32,
            peak: self.peak,
        };
        self.reset();
        Some(load)
    }

    /// Drop all measurements of the current interval.
    pub fn reset(&mut self) {
        self.processing_time = Duration::ZERO;
        self.frames = 0;
        self.peak = 0.0;
    }
}

// -------------------------------------------------------------------------------------------------

/// Lock-free status slots, written by the engine, read by any number of [`StatusHandle`]s.
#[derive(Debug)]
pub(crate) struct SharedStatus {
    beat: AtomicF64,
    sample_position: AtomicU64,
    voice_count: AtomicUsize,
    active_grain_count: AtomicUsize,
    cpu_load_average: AtomicF32,
    cpu_load_peak: AtomicF32,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self {
            beat: AtomicF64::new(0.0),
            sample_position: AtomicU64::new(0),
            voice_count: AtomicUsize::new(0),
            active_grain_count: AtomicUsize::new(0),
            cpu_load_average: AtomicF32::new(0.0),
            cpu_load_peak: AtomicF32::new(0.0),
        }
    }

    pub fn set_voice_count(&self, voice_count: usize) {
        self.voice_count.store(voice_count, Ordering::Relaxed);
    }

    pub fn publish(&self, beat: f64, sample_position: u64, active_grain_count: usize) {
        self.beat.store(beat, Ordering::Relaxed);
        self.sample_position
            .store(sample_position, Ordering::Relaxed);
        self.active_grain_count
            .store(active_grain_count, Ordering::Relaxed);
    }

    pub fn publish_cpu_load(&self, cpu_load: CpuLoad) {
        self.cpu_load_average
            .store(cpu_load.average, Ordering::Relaxed);
        self.cpu_load_peak.store(cpu_load.peak, Ordering::Relaxed);
    }
}

// -------------------------------------------------------------------------------------------------

/// Thread-safe, read-only view of an engine's status for telemetry and UIs.
///
/// Individual values are read atomically, but a snapshot may combine values of two
/// consecutive blocks.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    shared: Arc<SharedStatus>,
    tempo: TempoHandle,
}

impl StatusHandle {
    pub(crate) fn new(shared: Arc<SharedStatus>, tempo: TempoHandle) -> Self {
        Self { shared, tempo }
    }

    /// Current tempo in beats per minute.
    pub fn bpm(&self) -> f64 {
        self.tempo.bpm()
    }

    /// Number of voices in the engine.
    pub fn voice_count(&self) -> usize {
        self.shared.voice_count.load(Ordering::Relaxed)
    }

    /// Latest measured CPU load of the engine.
    pub fn cpu_load(&self) -> CpuLoad {
        CpuLoad {
            average: self.shared.cpu_load_average.load(Ordering::Relaxed),
            peak: self.shared.cpu_load_peak.load(Ordering::Relaxed),
        }
    }

    /// Read all status values.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            bpm: self.tempo.bpm(),
            beat: self.shared.beat.load(Ordering::Relaxed),
            sample_position: self.shared.sample_position.load(Ordering::Relaxed),
            voice_count: self.shared.voice_count.load(Ordering::Relaxed),
            active_grain_count: self.shared.active_grain_count.load(Ordering::Relaxed),
            cpu_load: self.cpu_load(),
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::clock::TempoClock, Error};

    #[test]
    fn publish_and_read() -> Result<(), Error> {
        let clock = TempoClock::new(44100, 90.0)?;
        let shared = Arc::new(SharedStatus::new());
        let handle = StatusHandle::new(Arc::clone(&shared), clock.handle());
        assert_eq!(
            handle.status(),
            EngineStatus {
                bpm: 90.0,
                ..Default::default()
            }
        );

        shared.set_voice_count(3);
        shared.publish(1.5, 33075, 5);
        shared.publish_cpu_load(CpuLoad {
            average: 0.125,
            peak: 0.5,
        });
        clock.set_bpm(100.0)?;
        let status = handle.clone().status();
        assert_eq!(status.bpm, 100.0);
        assert_eq!(status.beat, 1.5);
        assert_eq!(status.sample_position, 33075);
        assert_eq!(status.voice_count, 3);
        assert_eq!(status.active_grain_count, 5);
        assert_eq!(status.cpu_load, handle.cpu_load());
        assert_eq!(
            status.to_string(),
            "100.00 bpm, beat 1.50, 3 voices, 5 grains, cpu 12.50% (50.00%)"
        );
        Ok(())
    }

    #[test]
    fn cpu_load_meter() {
        let mut meter = CpuLoadMeter::new(1000, 1000);
        assert_eq!(meter.record(Duration::from_millis(100), 0), None);
        // 500 frames are 0.5 seconds of audio
        assert_eq!(meter.record(Duration::from_millis(10), 500), None);
        let load = meter.record(Duration::from_millis(50), 500).expect("finished interval");
        assert!((load.average - 0.06).abs() < 1e-6);
        assert!((load.peak - 0.1).abs() < 1e-6);

        // next interval starts from scratch
        assert_eq!(meter.record(Duration::from_millis(5), 250), None);
        meter.reset();
        assert_eq!(meter.record(Duration::from_millis(500), 999), None);
        let load = meter.record(Duration::ZERO, 1).expect("finished interval");
        assert!((load.average - 0.5).abs() < 1e-6);
        assert!(load.peak > 0.5);
    }
}
