//! Optional reversible block compression of the packed bitstream.
//!
//! The packet's payload-length field records the *compressed* length; the
//! receiver derives the decompressed length from the header's geometry and
//! bit widths, so neither backend stores a size prefix.

use std::fmt;
use std::str::FromStr;

use crate::error::FlycamError;

// ── CompressionKind ──────────────────────────────────────────────

/// Which block compressor, if any, is applied to payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionKind {
    /// Payloads go out as raw bitstreams.
    None,
    /// LZ4 block format without a size prefix.
    #[default]
    Lz4,
    /// Zstandard frame.
    Zstd,
}

impl CompressionKind {
    /// Instantiate the compressor, or `None` when compression is off.
    ///
    /// `level` is the zstd level, or the LZ4 acceleration factor
    /// (values `<= 1` select the default LZ4 mode).
    pub fn build(self, level: i32) -> Option<Box<dyn Compressor>> {
        match self {
            CompressionKind::None => None,
            CompressionKind::Lz4 => Some(Box::new(Lz4Compressor::new(level))),
            CompressionKind::Zstd => Some(Box::new(ZstdCompressor::new(level))),
        }
    }
}

impl FromStr for CompressionKind {
    type Err = FlycamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(CompressionKind::None),
            "lz4" => Ok(CompressionKind::Lz4),
            "zstd" => Ok(CompressionKind::Zstd),
            other => Err(FlycamError::InvalidConfig(format!(
                "unknown compression codec {other:?} (expected none, lz4 or zstd)"
            ))),
        }
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompressionKind::None => "none",
            CompressionKind::Lz4 => "lz4",
            CompressionKind::Zstd => "zstd",
        })
    }
}

// ── Compressor ───────────────────────────────────────────────────

/// A reversible byte-stream transform.
pub trait Compressor: Send {
    /// Short codec name for logs.
    fn name(&self) -> &'static str;

    /// Compress `src` into `dst`, replacing its contents. `dst` keeps its
    /// capacity across calls.
    fn compress_into(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<(), FlycamError>;

    /// Reverse [`compress_into`](Self::compress_into). `original_len` is
    /// the exact decompressed length, known from the packet header.
    fn decompress(&self, src: &[u8], original_len: usize) -> Result<Vec<u8>, FlycamError>;

    /// Allocating convenience wrapper around `compress_into`.
    fn compress(&mut self, src: &[u8]) -> Result<Vec<u8>, FlycamError> {
        let mut dst = Vec::new();
        self.compress_into(src, &mut dst)?;
        Ok(dst)
    }
}

// ── Lz4Compressor ────────────────────────────────────────────────

/// LZ4 block compression (no embedded size).
pub struct Lz4Compressor {
    mode: Option<lz4::block::CompressionMode>,
}

impl Lz4Compressor {
    pub fn new(acceleration: i32) -> Self {
        let mode = (acceleration > 1).then_some(lz4::block::CompressionMode::FAST(acceleration));
        Self { mode }
    }
}

impl Compressor for Lz4Compressor {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress_into(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<(), FlycamError> {
        let bound = lz4::block::compress_bound(src.len())
            .map_err(|e| FlycamError::Compression(format!("lz4 bound: {e}")))?;
        dst.resize(bound, 0);
        let written = lz4::block::compress_to_buffer(src, self.mode, false, dst)
            .map_err(|e| FlycamError::Compression(format!("lz4 compress: {e}")))?;
        dst.truncate(written);
        Ok(())
    }

    fn decompress(&self, src: &[u8], original_len: usize) -> Result<Vec<u8>, FlycamError> {
        let size = i32::try_from(original_len).map_err(|_| {
            FlycamError::Compression(format!("{original_len} bytes exceeds the lz4 block limit"))
        })?;
        let out = lz4::block::decompress(src, Some(size))
            .map_err(|e| FlycamError::Compression(format!("lz4 decompress: {e}")))?;
        check_len(out, original_len)
    }
}

// ── ZstdCompressor ───────────────────────────────────────────────

/// Zstandard compression at a fixed level.
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    /// Level 1 favours speed, which is what a frame-rate hot path wants.
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Compressor for ZstdCompressor {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress_into(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<(), FlycamError> {
        dst.clear();
        zstd::stream::copy_encode(src, &mut *dst, self.level)
            .map_err(|e| FlycamError::Compression(format!("zstd encode failed: {e}")))
    }

    fn decompress(&self, src: &[u8], original_len: usize) -> Result<Vec<u8>, FlycamError> {
        let out = zstd::decode_all(src)
            .map_err(|e| FlycamError::Compression(format!("zstd decode failed: {e}")))?;
        check_len(out, original_len)
    }
}

fn check_len(out: Vec<u8>, expected: usize) -> Result<Vec<u8>, FlycamError> {
    if out.len() != expected {
        return Err(FlycamError::Compression(format!(
            "decompressed {} bytes, header implies {expected}",
            out.len()
        )));
    }
    Ok(out)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> Vec<u8> {
        // Repetitive, like a packed frame of a mostly static scene.
        (0..8192u32).map(|i| (i / 64) as u8).collect()
    }

    #[test]
    fn lz4_roundtrip_and_shrinks() {
        let mut c = Lz4Compressor::new(1);
        let data = payload();
        let packed = c.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(c.decompress(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn zstd_roundtrip_and_shrinks() {
        let mut c = ZstdCompressor::new(1);
        let data = payload();
        let packed = c.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(c.decompress(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn compress_into_reuses_buffer() {
        let mut c = Lz4Compressor::new(4);
        let mut dst = Vec::with_capacity(16 * 1024);
        let data = payload();
        c.compress_into(&data, &mut dst).unwrap();
        let first = dst.clone();
        c.compress_into(&data, &mut dst).unwrap();
        assert_eq!(dst, first);
    }

    #[test]
    fn wrong_length_is_an_error() {
        let mut c = ZstdCompressor::new(1);
        let data = payload();
        let packed = c.compress(&data).unwrap();
        assert!(c.decompress(&packed, data.len() + 1).is_err());
    }

    #[test]
    fn kind_parsing() {
        assert_eq!("LZ4".parse::<CompressionKind>().unwrap(), CompressionKind::Lz4);
        assert_eq!("off".parse::<CompressionKind>().unwrap(), CompressionKind::None);
        assert!("brotli".parse::<CompressionKind>().is_err());
        assert!(CompressionKind::None.build(1).is_none());
        assert_eq!(CompressionKind::Zstd.build(3).unwrap().name(), "zstd");
    }
}
