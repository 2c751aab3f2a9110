// -------------------------------------------------------------------------------------------------

/// Sample formats the engine can deliver its final mixdown in.
///
/// Conversion happens exactly once per output sample, after all voices got mixed and the mix
/// got clamped into the normalized range `-1.0..=1.0`.
pub trait OutputSample: Copy + Send + 'static {
    /// Silence in this sample format.
    const EQUILIBRIUM: Self;

    /// Convert a sample, which already is clamped into `-1.0..=1.0`, to this format.
    fn from_clamped(value: f32) -> Self;
}

impl OutputSample for f32 {
    const EQUILIBRIUM: Self = 0.0;

    #[inline]
    fn from_clamped(value: f32) -> Self {
        debug_assert!((-1.0..=1.0).contains(&value), "Sample is not clamped");
        value
    }
}

impl OutputSample for i16 {
    const EQUILIBRIUM: Self = 0;

    #[inline]
    fn from_clamped(value: f32) -> Self {
        debug_assert!((-1.0..=1.0).contains(&value), "Sample is not clamped");
        // symmetric scaling: -1.0 maps to -32767, never to i16::MIN
        (value * i16::MAX as f32).round() as i16
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion() {
        assert_eq!(f32::from_clamped(0.5), 0.5);
        assert_eq!(i16::from_clamped(0.0), 0);
        assert_eq!(i16::from_clamped(1.0), i16::MAX);
        assert_eq!(i16::from_clamped(-1.0), -i16::MAX);
        assert_eq!(i16::from_clamped(0.5), 16384);
    }
}
