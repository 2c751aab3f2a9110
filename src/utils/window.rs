use std::f64::consts::PI;

// -------------------------------------------------------------------------------------------------

/// Grain envelope window shapes. All windows are symmetric and start and end at zero gain.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
)]
#[strum(ascii_case_insensitive)]
#[repr(u8)]
pub enum GrainWindowMode {
    /// Raised cosine window. Sums to a constant gain with 50% overlap.
    #[default]
    Hann,
    /// Steeper cosine window with lower side lobes than Hann.
    Blackman,
    /// Linear rise to the midpoint, linear fall.
    Triangle,
    /// Tapered cosine with a flat top (alpha = 0.5).
    Tukey,
}

impl GrainWindowMode {
    /// Window gain at the given normalized phase in range [0.0, 1.0].
    pub fn gain(&self, phase: f64) -> f64 {
        debug_assert!((0.0..=1.0).contains(&phase));
        let gain = match self {
            GrainWindowMode::Hann => 0.5 * (1.0 - (2.0 * PI * phase).cos()),
            GrainWindowMode::Blackman => {
                0.42 - 0.5 * (2.0 * PI * phase).cos() + 0.08 * (4.0 * PI * phase).cos()
            }
            GrainWindowMode::Triangle => 1.0 - (2.0 * phase - 1.0).abs(),
            GrainWindowMode::Tukey => {
                const WIDTH: f64 = 0.5 / 2.0;
                if phase < WIDTH {
                    0.5 * (1.0 - (PI * phase / WIDTH).cos())
                } else if phase > 1.0 - WIDTH {
                    0.5 * (1.0 - (PI * (1.0 - phase) / WIDTH).cos())
                } else {
                    1.0
                }
            }
        };
        // the cosine sums may undershoot zero by a rounding error at the edges
        gain.clamp(0.0, 1.0)
    }
}

// -------------------------------------------------------------------------------------------------

/// Fill the given table with a symmetric window of `table.len()` points: the first and last
/// point are the window's edges, the midpoint is its peak. A single point table is set to 1.
pub fn fill_window(mode: GrainWindowMode, table: &mut [f32]) {
    match table.len() {
        0 => (),
        1 => table[0] = 1.0,
        len => {
            let last = (len - 1) as f64;
            for (index, value) in table.iter_mut().enumerate() {
                *value = mode.gain(index as f64 / last) as f32;
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
