//! Single-pass quantize + pack.
//!
//! Produces exactly the bytes of `pack(quantize(frame))` without
//! materialising the intermediate [`QuantizedFrame`](crate::types::QuantizedFrame).
//! The hot path uses [`quantize_and_pack_into`] to write straight into the
//! framer's payload region.

use crate::codec::pack::BitWriter;
use crate::codec::quantize::check_channels;
use crate::codec::widths::BitWidths;
use crate::error::FlycamError;
use crate::types::Frame;

/// Quantize and pack `frame` into a freshly allocated bitstream.
pub fn quantize_and_pack(frame: &Frame, widths: &BitWidths) -> Result<Vec<u8>, FlycamError> {
    let mut out = vec![0u8; widths.packed_len(frame.width as usize, frame.height as usize)];
    quantize_and_pack_into(frame, widths, &mut out)?;
    Ok(out)
}

/// Quantize and pack into `out`, returning the number of bytes written.
pub fn quantize_and_pack_into(
    frame: &Frame,
    widths: &BitWidths,
    out: &mut [u8],
) -> Result<usize, FlycamError> {
    check_channels(frame.channels, widths)?;
    frame.check_shape()?;
    let needed = widths.packed_len(frame.width as usize, frame.height as usize);
    if out.len() < needed {
        return Err(FlycamError::BufferTooSmall {
            needed,
            capacity: out.len(),
        });
    }
    let out = &mut out[..needed];

    // Full depth everywhere: the bitstream is the frame itself.
    if widths.is_full_depth() {
        out.copy_from_slice(&frame.data);
        return Ok(needed);
    }

    let lanes = widths.lanes();
    let mut writer = BitWriter::new(out);
    for pixel in frame.data.chunks_exact(lanes.len()) {
        for (&sample, lane) in pixel.iter().zip(lanes) {
            writer.put(sample >> lane.shift, lane.bits);
        }
    }
    Ok(writer.finish())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{pack, quantize, unpack};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn random_frame(w: u32, h: u32, c: u8, seed: u64) -> Frame {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data = vec![0u8; (w * h * c as u32) as usize];
        rng.fill(data.as_mut_slice());
        Frame::new(w, h, c, data).unwrap()
    }

    #[test]
    fn fused_matches_two_stage() {
        let frame = random_frame(13, 7, 3, 42);
        for bits in [
            vec![1, 1, 1],
            vec![8, 8, 8],
            vec![5, 8, 6],
            vec![3, 5, 4],
            vec![7, 7, 7],
            vec![2, 1, 8],
        ] {
            let widths = BitWidths::new(bits.clone()).unwrap();
            let staged = pack(&quantize(&frame, &widths).unwrap(), &widths).unwrap();
            let fused = quantize_and_pack(&frame, &widths).unwrap();
            assert_eq!(fused, staged, "bits={bits:?}");
        }
    }

    #[test]
    fn fused_matches_for_other_channel_counts() {
        for (c, bits) in [(1u8, vec![3]), (4, vec![4, 6, 2, 8]), (2, vec![8, 8])] {
            let frame = random_frame(9, 5, c, c as u64);
            let widths = BitWidths::new(bits).unwrap();
            let staged = pack(&quantize(&frame, &widths).unwrap(), &widths).unwrap();
            assert_eq!(quantize_and_pack(&frame, &widths).unwrap(), staged);
        }
    }

    #[test]
    fn fused_output_roundtrips() {
        let frame = random_frame(10, 10, 3, 3);
        let widths = BitWidths::new(vec![5, 8, 6]).unwrap();
        let packed = quantize_and_pack(&frame, &widths).unwrap();
        assert_eq!(packed.len(), 238);
        let q = unpack(&packed, &widths, 10, 10, 3).unwrap();
        assert_eq!(q, quantize(&frame, &widths).unwrap());
    }

    #[test]
    fn into_writes_only_the_prefix() {
        let frame = random_frame(4, 4, 3, 8);
        let widths = BitWidths::new(vec![5, 8, 6]).unwrap();
        let mut out = vec![0xAA; 64];
        let n = quantize_and_pack_into(&frame, &widths, &mut out).unwrap();
        assert_eq!(n, 38);
        assert_eq!(&out[..n], quantize_and_pack(&frame, &widths).unwrap().as_slice());
        assert!(out[n..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn malformed_frame_is_rejected() {
        let mut frame = random_frame(4, 4, 3, 1);
        frame.data.pop();
        let widths = BitWidths::uniform(4, 3).unwrap();
        assert!(quantize_and_pack(&frame, &widths).is_err());
    }
}
