//! Grains and their shared envelope tables.

use std::sync::Arc;

use crate::utils::window::{fill_window, GrainWindowMode};

// -------------------------------------------------------------------------------------------------

/// Precomputed, immutable grain envelope, shared by all grains of a voice.
///
/// Cloning an envelope table only clones a reference to the table, so grains can hold on to
/// it without allocating.
#[derive(Debug, Clone)]
pub struct EnvelopeTable {
    mode: GrainWindowMode,
    gains: Arc<[f32]>,
}

impl EnvelopeTable {
    /// Create a new symmetric envelope table with the given window mode and length.
    pub fn new(mode: GrainWindowMode, length: usize) -> Self {
        let mut gains = vec![0.0; length];
        fill_window(mode, &mut gains);
        Self {
            mode,
            gains: gains.into(),
        }
    }

    /// The window shape of this table.
    pub fn mode(&self) -> GrainWindowMode {
        self.mode
    }

    /// Number of gain values in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.gains.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.gains.is_empty()
    }

    /// Access to the raw gain values.
    #[inline]
    pub fn gains(&self) -> &[f32] {
        &self.gains
    }
}

// -------------------------------------------------------------------------------------------------

/// A single, short, envelope windowed slice of a source buffer which plays exactly once.
///
/// Grains never read outside of their source buffer: when a grain's nominal range reaches
/// past the end of the source, the grain exhausts at the buffer's end instead. Once exhausted,
/// a grain stays exhausted.
#[derive(Debug, Clone)]
pub struct Grain {
    source: Arc<[f32]>,
    envelope: EnvelopeTable,
    start: usize,
    length: usize,
    cursor: usize,
}

impl Grain {
    /// Create a new grain which plays `envelope.len()` samples of `source`, starting at the
    /// given `start` offset.
    pub fn spawn(source: Arc<[f32]>, start: usize, envelope: EnvelopeTable) -> Self {
        debug_assert!(!envelope.is_empty(), "Grain length must be > 0");
        let length = envelope.len();
        Self {
            source,
            envelope,
            start,
            length,
            cursor: 0,
        }
    }

    /// Start offset of the grain in its source buffer.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Nominal length of the grain in samples.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of samples the grain produced so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// True when the grain played all its samples or reached the end of its source.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.length
    }

    /// Produce up to `output.len()` windowed samples and **add** them to the output.
    /// Returns the number of produced samples and advances the grain's cursor.
    pub fn produce(&mut self, output: &mut [f32]) -> usize {
        if self.is_exhausted() {
            return 0;
        }
        let read_pos = self.start.saturating_add(self.cursor);
        let readable = self.source.len().saturating_sub(read_pos);
        let remaining = self.length - self.cursor;
        let count = output.len().min(remaining).min(readable);

        if count > 0 {
            let source = &self.source[read_pos..read_pos + count];
            let gains = &self.envelope.gains()[self.cursor..self.cursor + count];
            for ((o, s), g) in output[..count].iter_mut().zip(source).zip(gains) {
                *o += *s * *g;
            }
        }
        self.cursor += count;

        // hit the source buffer's end before reaching the grain's length
        if count == readable && count < remaining {
            self.cursor = self.length;
        }
        count
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_source(len: usize) -> Arc<[f32]> {
        (0..len).map(|i| i as f32 / len as f32).collect()
    }

    #[test]
    fn envelope_table() {
        let table = EnvelopeTable::new(GrainWindowMode::Hann, 3528);
        assert_eq!(table.len(), 3528);
        assert_eq!(table.mode(), GrainWindowMode::Hann);
        assert!(table.gains()[0] < 1e-6);
        assert!(table.gains()[3527] < 1e-6);

        // clones share the table
        let clone = table.clone();
        assert!(std::ptr::eq(table.gains(), clone.gains()));
    }

    #[test]
    fn produce_whole_grain() {
        let source: Arc<[f32]> = vec![1.0; 100].into();
        let envelope = EnvelopeTable::new(GrainWindowMode::Triangle, 11);
        let mut grain = Grain::spawn(source, 10, envelope.clone());

        let mut output = vec![0.0; 4];
        let mut produced = Vec::new();
        let mut total = 0;
        while !grain.is_exhausted() {
            output.fill(0.0);
            let count = grain.produce(&mut output);
            assert!(count > 0);
            produced.extend_from_slice(&output[..count]);
            total += count;
        }
        assert_eq!(total, 11);
        assert_eq!(grain.cursor(), grain.length());
        // constant source: output is the envelope itself
        assert_eq!(produced.as_slice(), envelope.gains());

        // exhausted grains stay silent
        output.fill(0.0);
        assert_eq!(grain.produce(&mut output), 0);
        assert!(output.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn produce_mixes_into_output() {
        let source: Arc<[f32]> = vec![0.5; 16].into();
        let envelope = EnvelopeTable::new(GrainWindowMode::Hann, 9);
        let mut grain = Grain::spawn(source, 0, envelope.clone());
        let mut output = vec![1.0; 9];
        assert_eq!(grain.produce(&mut output), 9);
        for (o, g) in output.iter().zip(envelope.gains()) {
            assert!((o - (1.0 + 0.5 * g)).abs() < 1e-6);
        }
    }

    #[test]
    fn clamp_at_source_end() {
        let source = ramp_source(50);
        let envelope = EnvelopeTable::new(GrainWindowMode::Hann, 20);
        let mut grain = Grain::spawn(source.clone(), 40, envelope);

        let mut output = vec![0.0; 64];
        let count = grain.produce(&mut output);
        assert_eq!(count, 10);
        assert!(grain.is_exhausted());
        assert!(output[10..].iter().all(|s| *s == 0.0));

        // start offset beyond the source: exhausts without reading
        let envelope = EnvelopeTable::new(GrainWindowMode::Hann, 20);
        let mut grain = Grain::spawn(source, 80, envelope);
        assert_eq!(grain.produce(&mut output), 0);
        assert!(grain.is_exhausted());
    }

    #[test]
    fn clamp_at_source_end_in_small_blocks() {
        let source = ramp_source(30);
        let envelope = EnvelopeTable::new(GrainWindowMode::Hann, 20);
        let mut grain = Grain::spawn(source, 20, envelope);

        let mut output = vec![0.0; 4];
        let mut total = 0;
        while !grain.is_exhausted() {
            total += grain.produce(&mut output);
        }
        assert_eq!(total, 10);
    }
}
