// -------------------------------------------------------------------------------------------------

/// Set all samples of the given buffer to zero.
#[inline]
pub fn clear_buffer(buffer: &mut [f32]) {
    buffer.fill(0.0);
}

// -------------------------------------------------------------------------------------------------

/// Add (mix) the source buffer into the destination buffer. Only the common prefix of
/// both buffers is processed.
#[inline]
pub fn add_buffers(destination: &mut [f32], source: &[f32]) {
    for (d, s) in destination.iter_mut().zip(source) {
        *d += *s;
    }
}

// -------------------------------------------------------------------------------------------------

/// Hard clip all samples into the symmetric range `-limit..=limit`. NaN values become silence.
#[inline]
pub fn clamp_buffer(buffer: &mut [f32], limit: f32) {
    debug_assert!(limit > 0.0, "Invalid clamp limit");
    for sample in buffer.iter_mut() {
        *sample = if sample.is_nan() {
            0.0
        } else {
            sample.clamp(-limit, limit)
        };
    }
}

// -------------------------------------------------------------------------------------------------

/// Copy a mono buffer into an interleaved buffer with the given channel layout, duplicating
/// each mono sample into all channels of its frame.
pub fn mono_to_interleaved<T: Copy>(mono: &[T], interleaved: &mut [T], channel_count: usize) {
    debug_assert!(channel_count > 0, "Invalid channel count");
    match channel_count {
        1 => {
            for (i, m) in interleaved.iter_mut().zip(mono) {
                *i = *m;
            }
        }
        2 => {
            for (frame, m) in interleaved.chunks_exact_mut(2).zip(mono) {
                frame[0] = *m;
                frame[1] = *m;
            }
        }
        _ => {
            for (frame, m) in interleaved.chunks_exact_mut(channel_count).zip(mono) {
                frame.fill(*m);
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixing() {
        let mut destination = vec![0.25, 0.5, -0.5, 1.0];
        add_buffers(&mut destination, &[0.25, 0.75, -0.75]);
        assert_eq!(destination, vec![0.5, 1.25, -1.25, 1.0]);

        clamp_buffer(&mut destination, 1.0);
        assert_eq!(destination, vec![0.5, 1.0, -1.0, 1.0]);

        let mut with_nan = vec![f32::NAN, 2.0];
        clamp_buffer(&mut with_nan, 1.0);
        assert_eq!(with_nan, vec![0.0, 1.0]);

        clear_buffer(&mut destination);
        assert!(destination.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn mono_interleaved() {
        let mono = vec![1.0, 2.0, 3.0];

        let mut interleaved_mono = vec![0.0; 3];
        mono_to_interleaved(&mono, &mut interleaved_mono, 1);
        assert_eq!(interleaved_mono, mono);

        let mut interleaved_stereo = vec![0.0; 6];
        mono_to_interleaved(&mono, &mut interleaved_stereo, 2);
        assert_eq!(interleaved_stereo, vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);

        let mut interleaved_general = vec![0.0; 9];
        mono_to_interleaved(&mono, &mut interleaved_general, 3);
        assert_eq!(
            interleaved_general,
            vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0]
        );
    }
}
