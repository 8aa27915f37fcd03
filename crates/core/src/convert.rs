//! Interleave/deinterleave routines.
//!
//! Samples pass through untouched: no resampling, dithering or clipping.

/// Deinterleaves `frames` frames of `input` into one slice per channel.
///
/// The channel count is `outputs.len()`. `input` must hold at least
/// `frames * outputs.len()` samples and every output at least `frames`.
pub fn deinterleave(input: &[f32], outputs: &mut [&mut [f32]], frames: usize) {
    let channels = outputs.len();
    if channels == 0 || frames == 0 {
        return;
    }

    for (f, frame) in input.chunks_exact(channels).take(frames).enumerate() {
        for (out, &sample) in outputs.iter_mut().zip(frame) {
            out[f] = sample;
        }
    }
}

/// Interleaves the first `frames` frames of each channel into `output`.
///
/// The channel count is `inputs.len()`; `output` must hold at least
/// `frames * inputs.len()` samples.
pub fn interleave(inputs: &[&[f32]], output: &mut [f32], frames: usize) {
    let channels = inputs.len();
    if channels == 0 || frames == 0 {
        return;
    }

    for (f, frame) in output.chunks_exact_mut(channels).take(frames).enumerate() {
        for (sample, input) in frame.iter_mut().zip(inputs) {
            *sample = input[f];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave_stereo() {
        let input = [1.0, -1.0, 2.0, -2.0, 3.0, -3.0];
        let mut left = [0.0; 3];
        let mut right = [0.0; 3];

        let mut outputs: [&mut [f32]; 2] = [&mut left, &mut right];
        deinterleave(&input, &mut outputs, 3);

        assert_eq!(left, [1.0, 2.0, 3.0]);
        assert_eq!(right, [-1.0, -2.0, -3.0]);
    }

    #[test]
    fn test_deinterleave_partial_frames() {
        let input = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut a = [9.0; 3];
        let mut b = [9.0; 3];

        let mut outputs: [&mut [f32]; 2] = [&mut a, &mut b];
        deinterleave(&input, &mut outputs, 2);

        // Only the first two frames are touched
        assert_eq!(a, [1.0, 3.0, 9.0]);
        assert_eq!(b, [2.0, 4.0, 9.0]);
    }

    #[test]
    fn test_interleave_three_channels() {
        let a = [1.0, 4.0];
        let b = [2.0, 5.0];
        let c = [3.0, 6.0];
        let mut output = [0.0; 6];

        let inputs: [&[f32]; 3] = [&a, &b, &c];
        interleave(&inputs, &mut output, 2);

        assert_eq!(output, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_values_pass_through_unmodified() {
        let input = [f32::MAX, f32::MIN_POSITIVE, -0.0, 1.5e-42];
        let mut ch = [0.0; 4];

        let mut outputs: [&mut [f32]; 1] = [&mut ch];
        deinterleave(&input, &mut outputs, 4);
        let mut back = [0.0; 4];
        let inputs: [&[f32]; 1] = [&ch];
        interleave(&inputs, &mut back, 4);

        for (a, b) in input.iter().zip(back.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_zero_channels_is_noop() {
        let mut output = [7.0; 2];
        interleave(&[], &mut output, 2);
        assert_eq!(output, [7.0, 7.0]);
        deinterleave(&[1.0, 2.0], &mut [], 2);
    }
}
