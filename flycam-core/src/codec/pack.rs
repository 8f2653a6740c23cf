//! Variable-width bit packing.
//!
//! ## Bitstream layout
//!
//! Samples are visited in row-major pixel order, channels in declared
//! order. Each sample contributes exactly `bits[channel]` bits, most
//! significant bit first, to one continuous bit cursor:
//!
//! ```text
//! bits = [5, 8, 6]
//! pixel 0: rrrrr gggggggg bbbbbb | pixel 1: rrrrr ...
//! byte 0:  r4 r3 r2 r1 r0 g7 g6 g5
//! byte 1:  g4 g3 g2 g1 g0 b5 b4 b3
//! ```
//!
//! No padding between samples; only the last byte may carry unused
//! (zero) low bits. Output length is `ceil(H * W * sum(bits) / 8)`.

use crate::codec::quantize::check_channels;
use crate::codec::widths::BitWidths;
use crate::error::FlycamError;
use crate::types::QuantizedFrame;

// ── BitWriter ────────────────────────────────────────────────────

/// MSB-first bit accumulator writing into a preallocated slice.
///
/// The caller guarantees `out` is large enough for everything it pushes.
pub(crate) struct BitWriter<'a> {
    out: &'a mut [u8],
    pos: usize,
    acc: u32,
    filled: u32,
}

impl<'a> BitWriter<'a> {
    pub(crate) fn new(out: &'a mut [u8]) -> Self {
        Self {
            out,
            pos: 0,
            acc: 0,
            filled: 0,
        }
    }

    /// Append the low `bits` bits of `value` (`bits` in `1..=8`).
    #[inline]
    pub(crate) fn put(&mut self, value: u8, bits: u32) {
        self.acc = (self.acc << bits) | value as u32;
        self.filled += bits;
        if self.filled >= 8 {
            self.filled -= 8;
            self.out[self.pos] = (self.acc >> self.filled) as u8;
            self.pos += 1;
            self.acc &= (1 << self.filled) - 1;
        }
    }

    /// Flush the partial byte (zero-padded) and return bytes written.
    pub(crate) fn finish(mut self) -> usize {
        if self.filled > 0 {
            self.out[self.pos] = (self.acc << (8 - self.filled)) as u8;
            self.pos += 1;
        }
        self.pos
    }
}

// ── BitReader ────────────────────────────────────────────────────

/// MSB-first reader over a slice already checked to be long enough.
struct BitReader<'a> {
    src: &'a [u8],
    pos: usize,
    acc: u32,
    avail: u32,
}

impl<'a> BitReader<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self {
            src,
            pos: 0,
            acc: 0,
            avail: 0,
        }
    }

    #[inline]
    fn take(&mut self, bits: u32) -> u8 {
        if self.avail < bits {
            self.acc = (self.acc << 8) | self.src[self.pos] as u32;
            self.pos += 1;
            self.avail += 8;
        }
        self.avail -= bits;
        let value = (self.acc >> self.avail) & ((1 << bits) - 1);
        self.acc &= (1 << self.avail) - 1;
        value as u8
    }
}

// ── pack / unpack ────────────────────────────────────────────────

/// Pack a quantized frame into a freshly allocated bitstream.
pub fn pack(quantized: &QuantizedFrame, widths: &BitWidths) -> Result<Vec<u8>, FlycamError> {
    let len = widths.packed_len(quantized.width as usize, quantized.height as usize);
    let mut out = vec![0u8; len];
    pack_into(quantized, widths, &mut out)?;
    Ok(out)
}

/// Pack into `out`, returning the number of bytes written.
///
/// Bits above a channel's width are masked off, so an out-of-range
/// sample can never bleed into its neighbours.
pub fn pack_into(
    quantized: &QuantizedFrame,
    widths: &BitWidths,
    out: &mut [u8],
) -> Result<usize, FlycamError> {
    check_channels(quantized.channels, widths)?;
    let pixels = quantized.width as usize * quantized.height as usize;
    if quantized.samples.len() != pixels * widths.channels() {
        return Err(FlycamError::ShapeMismatch(format!(
            "quantized frame carries {} samples, expected {}",
            quantized.samples.len(),
            pixels * widths.channels(),
        )));
    }
    let needed = widths.packed_len(quantized.width as usize, quantized.height as usize);
    if out.len() < needed {
        return Err(FlycamError::BufferTooSmall {
            needed,
            capacity: out.len(),
        });
    }

    let lanes = widths.lanes();
    let mut writer = BitWriter::new(&mut out[..needed]);
    for pixel in quantized.samples.chunks_exact(lanes.len()) {
        for (&sample, lane) in pixel.iter().zip(lanes) {
            writer.put(sample & lane.mask, lane.bits);
        }
    }
    Ok(writer.finish())
}

/// Unpack a bitstream produced by [`pack`].
///
/// `bytes` must hold at least `ceil(H * W * sum(bits) / 8)` bytes;
/// anything shorter fails with [`FlycamError::Truncated`]. Trailing bytes
/// past that length are ignored.
pub fn unpack(
    bytes: &[u8],
    widths: &BitWidths,
    height: u32,
    width: u32,
    channels: u8,
) -> Result<QuantizedFrame, FlycamError> {
    check_channels(channels, widths)?;
    let needed = widths.packed_len(width as usize, height as usize);
    if bytes.len() < needed {
        return Err(FlycamError::Truncated {
            needed,
            actual: bytes.len(),
        });
    }

    let pixels = width as usize * height as usize;
    let lanes = widths.lanes();
    let mut samples = Vec::with_capacity(pixels * lanes.len());
    let mut reader = BitReader::new(&bytes[..needed]);
    for _ in 0..pixels {
        for lane in lanes {
            samples.push(reader.take(lane.bits));
        }
    }

    Ok(QuantizedFrame {
        width,
        height,
        channels,
        samples,
    })
}

// ── Tests ────────────────────────────────────────────────────────
