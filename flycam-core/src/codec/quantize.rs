//! Truncating bit-depth reduction.
//!
//! Each sample keeps its `bits` most significant bits: `s >> (8 - bits)`.
//! Expansion shifts back and zero-fills, so the reconstruction error of a
//! channel never exceeds `2^(8 - bits) - 1`.

use crate::codec::widths::BitWidths;
use crate::error::FlycamError;
use crate::types::{Frame, QuantizedFrame};

/// Quantize every sample of `frame` to its channel's width.
pub fn quantize(frame: &Frame, widths: &BitWidths) -> Result<QuantizedFrame, FlycamError> {
    check_channels(frame.channels, widths)?;
    frame.check_shape()?;

    let lanes = widths.lanes();
    let mut samples = Vec::with_capacity(frame.data.len());
    for pixel in frame.data.chunks_exact(lanes.len()) {
        samples.extend(pixel.iter().zip(lanes).map(|(&s, lane)| s >> lane.shift));
    }

    Ok(QuantizedFrame {
        width: frame.width,
        height: frame.height,
        channels: frame.channels,
        samples,
    })
}

/// Reconstruct 8-bit samples by left-shifting each quantized value back
/// into place. The discarded low bits come back as zero.
pub fn expand(quantized: &QuantizedFrame, widths: &BitWidths) -> Result<Frame, FlycamError> {
    check_channels(quantized.channels, widths)?;

    let lanes = widths.lanes();
    let mut data = Vec::with_capacity(quantized.samples.len());
    for pixel in quantized.samples.chunks_exact(lanes.len()) {
        data.extend(pixel.iter().zip(lanes).map(|(&q, lane)| q << lane.shift));
    }

    Frame::new(quantized.width, quantized.height, quantized.channels, data)
}

pub(crate) fn check_channels(channels: u8, widths: &BitWidths) -> Result<(), FlycamError> {
    if channels as usize != widths.channels() {
        return Err(FlycamError::ShapeMismatch(format!(
            "frame has {channels} channels, bit widths describe {}",
            widths.channels()
        )));
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn random_frame(w: u32, h: u32, c: u8, seed: u64) -> Frame {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data = vec![0u8; (w * h * c as u32) as usize];
        rng.fill(data.as_mut_slice());
        Frame::new(w, h, c, data).unwrap()
    }

    /// Vertical gradient: row `i` has every sample set to `i * 255 / h`.
    fn gradient(w: u32, h: u32) -> Frame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            let v = (y * 255 / h) as u8;
            data.extend(std::iter::repeat_n(v, (w * 3) as usize));
        }
        Frame::new(w, h, 3, data).unwrap()
    }

    #[test]
    fn quantized_values_stay_below_channel_range() {
        let frame = random_frame(16, 16, 3, 1);
        for bits in [[1, 1, 1], [5, 8, 6], [8, 8, 8], [3, 5, 4], [7, 2, 4]] {
            let widths = BitWidths::new(bits.to_vec()).unwrap();
            let q = quantize(&frame, &widths).unwrap();
            for (ch, &b) in bits.iter().enumerate() {
                assert!(q.channel(ch).all(|s| (s as u16) < (1u16 << b)), "bits={bits:?}");
            }
        }
    }

    #[test]
    fn truncates_rather_than_rounds() {
        let frame = Frame::new(1, 1, 3, vec![0xFF, 0x0F, 0x80]).unwrap();
        let widths = BitWidths::new(vec![5, 4, 1]).unwrap();
        let q = quantize(&frame, &widths).unwrap();
        assert_eq!(q.samples, vec![0x1F, 0x00, 0x01]);
    }

    #[test]
    fn eight_bits_is_identity() {
        let frame = random_frame(8, 8, 3, 2);
        let widths = BitWidths::uniform(8, 3).unwrap();
        let q = quantize(&frame, &widths).unwrap();
        assert_eq!(q.samples, frame.data);
    }

    #[test]
    fn expansion_error_is_bounded() {
        let frame = random_frame(32, 32, 3, 3);
        let widths = BitWidths::new(vec![5, 8, 6]).unwrap();
        let restored = expand(&quantize(&frame, &widths).unwrap(), &widths).unwrap();
        for (i, (&a, &b)) in frame.data.iter().zip(&restored.data).enumerate() {
            let ch = i % 3;
            assert!(a.abs_diff(b) <= widths.max_error(ch));
            // Leading bits survive exactly.
            assert_eq!(a >> (8 - widths.as_slice()[ch]), b >> (8 - widths.as_slice()[ch]));
        }
    }

    #[test]
    fn gradient_error_per_channel() {
        let frame = gradient(100, 100);
        let widths = BitWidths::new(vec![5, 8, 6]).unwrap();
        let restored = expand(&quantize(&frame, &widths).unwrap(), &widths).unwrap();

        let max_err = |ch: usize| {
            frame
                .data
                .iter()
                .zip(&restored.data)
                .skip(ch)
                .step_by(3)
                .map(|(&a, &b)| a.abs_diff(b))
                .max()
                .unwrap()
        };
        assert!(max_err(0) <= 7);
        assert_eq!(max_err(1), 0);
        assert!(max_err(2) <= 3);
    }

    #[test]
    fn channel_mismatch_is_rejected() {
        let frame = random_frame(4, 4, 3, 4);
        let widths = BitWidths::uniform(6, 4).unwrap();
        assert!(matches!(
            quantize(&frame, &widths),
            Err(FlycamError::ShapeMismatch(_))
        ));
    }
}
