//! Per-channel bit widths.

use crate::error::FlycamError;

/// Largest channel count the one-byte header field can describe.
pub const MAX_CHANNELS: usize = u8::MAX as usize;

/// RGB widths used when none are configured: green keeps full depth.
pub const DEFAULT_BITS: [u8; 3] = [5, 8, 6];

/// Per-channel constants the codec loops read for every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Lane {
    pub(crate) bits: u32,
    /// `8 - bits`: the truncating right shift.
    pub(crate) shift: u32,
    /// Low `bits` bits set.
    pub(crate) mask: u8,
}

impl Lane {
    fn new(bits: u8) -> Self {
        Self {
            bits: bits as u32,
            shift: 8 - bits as u32,
            mask: ((1u16 << bits) - 1) as u8,
        }
    }
}

/// Ordered per-channel bit widths, each in `1..=8`.
///
/// Constructed once from configuration and shared read-only by every
/// codec call. Uniform mode is the case where all entries are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitWidths {
    bits: Box<[u8]>,
    lanes: Box<[Lane]>,
    bits_per_pixel: u32,
}

impl BitWidths {
    /// Validate a width vector. Out-of-range entries are rejected, never
    /// clamped.
    pub fn new(bits: impl Into<Vec<u8>>) -> Result<Self, FlycamError> {
        let bits = bits.into();
        if bits.is_empty() {
            return Err(FlycamError::InvalidConfig(
                "bit width vector must name at least one channel".into(),
            ));
        }
        if bits.len() > MAX_CHANNELS {
            return Err(FlycamError::InvalidConfig(format!(
                "{} channels exceeds the maximum of {MAX_CHANNELS}",
                bits.len()
            )));
        }
        if let Some((channel, b)) = bits.iter().enumerate().find(|(_, b)| !(1..=8).contains(*b)) {
            return Err(FlycamError::InvalidConfig(format!(
                "channel {channel} bit width {b} is outside 1..=8"
            )));
        }
        Ok(Self::from_checked(bits))
    }

    fn from_checked(bits: Vec<u8>) -> Self {
        Self {
            lanes: bits.iter().map(|&b| Lane::new(b)).collect(),
            bits_per_pixel: bits.iter().map(|&b| b as u32).sum(),
            bits: bits.into_boxed_slice(),
        }
    }

    /// The same width broadcast to `channels` channels.
    pub fn uniform(bits: u8, channels: usize) -> Result<Self, FlycamError> {
        Self::new(vec![bits; channels])
    }

    pub fn channels(&self) -> usize {
        self.bits.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bits
    }

    /// Sum of all channel widths.
    pub fn bits_per_pixel(&self) -> u32 {
        self.bits_per_pixel
    }

    pub fn is_uniform(&self) -> bool {
        self.bits.windows(2).all(|w| w[0] == w[1])
    }

    /// True when every channel keeps all 8 bits.
    pub fn is_full_depth(&self) -> bool {
        self.bits.iter().all(|&b| b == 8)
    }

    pub(crate) fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    /// Exact packed size of a `width` × `height` frame:
    /// `ceil(width * height * bits_per_pixel / 8)`.
    pub fn packed_len(&self, width: usize, height: usize) -> usize {
        (width * height * self.bits_per_pixel as usize).div_ceil(8)
    }

    /// Worst-case reconstruction error for `channel`: `2^(8 - bits) - 1`.
    pub fn max_error(&self, channel: usize) -> u8 {
        ((1u16 << (8 - self.bits[channel])) - 1) as u8
    }
}

impl Default for BitWidths {
    fn default() -> Self {
        Self::from_checked(DEFAULT_BITS.to_vec())
    }
}
