//! Shared frame types used between pipeline stages.
//!
//! These are **internal** representations. What actually crosses the
//! link is the framed packet built by [`crate::wire`].

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::FlycamError;

// ── TimestampUnit ────────────────────────────────────────────────

/// Resolution of the 32-bit timestamp field written into packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampUnit {
    /// Unix seconds.
    #[default]
    Seconds,
    /// Unix milliseconds.
    Millis,
}

impl TimestampUnit {
    /// Convert a wall-clock instant into the wire timestamp, truncated to
    /// 32 bits. Instants before the epoch map to 0.
    pub fn wire_timestamp(self, at: SystemTime) -> u32 {
        let since = at.duration_since(UNIX_EPOCH).unwrap_or_default();
        match self {
            TimestampUnit::Seconds => since.as_secs() as u32,
            TimestampUnit::Millis => since.as_millis() as u32,
        }
    }
}

impl FromStr for TimestampUnit {
    type Err = FlycamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "sec" | "seconds" => Ok(TimestampUnit::Seconds),
            "ms" | "millis" | "milliseconds" => Ok(TimestampUnit::Millis),
            other => Err(FlycamError::InvalidConfig(format!(
                "unknown timestamp unit {other:?} (expected seconds or millis)"
            ))),
        }
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// A captured frame: `height` rows of `width` pixels, each pixel
/// `channels` consecutive 8-bit samples. No row padding.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Samples per pixel.
    pub channels: u8,
    /// Interleaved samples, `width * height * channels` bytes.
    pub data: Vec<u8>,
    /// Wall-clock capture time.
    pub captured_at: SystemTime,
}

impl Frame {
    /// Build a frame, checking that `data` matches the geometry.
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self, FlycamError> {
        let frame = Self {
            width,
            height,
            channels,
            data,
            captured_at: SystemTime::now(),
        };
        frame.check_shape()?;
        Ok(frame)
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Expected byte length for this geometry.
    pub fn byte_len(&self) -> usize {
        self.pixel_count() * self.channels as usize
    }

    /// Returns the samples of pixel `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels as usize;
        let offset = (y as usize * self.width as usize + x as usize) * c;
        &self.data[offset..offset + c]
    }

    /// Verify that the sample buffer agrees with the declared geometry.
    pub fn check_shape(&self) -> Result<(), FlycamError> {
        if self.channels == 0 {
            return Err(FlycamError::ShapeMismatch("frame has zero channels".into()));
        }
        if self.data.len() != self.byte_len() {
            return Err(FlycamError::ShapeMismatch(format!(
                "{}x{}x{} frame carries {} bytes, expected {}",
                self.width,
                self.height,
                self.channels,
                self.data.len(),
                self.byte_len(),
            )));
        }
        Ok(())
    }
}

// ── QuantizedFrame ───────────────────────────────────────────────

/// A frame whose samples have been reduced to per-channel bit widths.
///
/// Same layout as [`Frame`]; sample `i` belongs to channel
/// `i % channels` and is below `2^bits[channel]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedFrame {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub samples: Vec<u8>,
}

impl QuantizedFrame {
    /// Samples of one channel, in row-major pixel order.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = u8> + '_ {
        self.samples
            .iter()
            .skip(channel)
            .step_by(self.channels.max(1) as usize)
            .copied()
    }
}

// ── Tests ────────────────────────────────────────────────────────
