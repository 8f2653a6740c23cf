//! Domain-specific error types for the flycam pipeline.
//!
//! All fallible operations return `Result<T, FlycamError>`.
//! Per-frame errors are recoverable; only configuration errors are meant
//! to stop the process, and they surface before the first frame.

use thiserror::Error;

/// The canonical error type for the flycam pipeline.
#[derive(Debug, Error)]
pub enum FlycamError {
    // ── Configuration Errors ─────────────────────────────────────
    /// A configuration value is out of range. Reported at setup, never
    /// clamped.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A frame or buffer does not match the configured geometry.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    // ── Codec Errors ─────────────────────────────────────────────
    /// The packed bitstream is shorter than the shape implies.
    #[error("truncated input: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    /// A caller-provided output buffer cannot hold the result.
    #[error("output buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    /// The block compressor rejected its input.
    #[error("compression failed: {0}")]
    Compression(String),

    // ── Framing Errors ───────────────────────────────────────────
    /// The payload exceeds the framer's preallocated capacity.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A framer stage was invoked out of order.
    #[error("framing out of order: expected {expected}, framer is {actual}")]
    FramingOrder {
        expected: &'static str,
        actual: &'static str,
    },

    // ── Capture Errors ───────────────────────────────────────────
    /// A finite capture source has no more frames.
    #[error("capture source exhausted")]
    EndOfStream,

    /// The capture source failed to deliver a frame or metadata.
    #[error("capture error: {0}")]
    Capture(String),

    // ── Transport Errors ─────────────────────────────────────────
    /// The IO layer reported an error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for FlycamError {
    fn from(s: String) -> Self {
        FlycamError::Other(s)
    }
}

impl From<&str> for FlycamError {
    fn from(s: &str) -> Self {
        FlycamError::Other(s.to_string())
    }
}

impl From<image::ImageError> for FlycamError {
    fn from(e: image::ImageError) -> Self {
        FlycamError::Other(format!("jpeg encode failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = FlycamError::Truncated {
            needed: 238,
            actual: 200,
        };
        assert!(e.to_string().contains("238"));
        assert!(e.to_string().contains("200"));

        let e = FlycamError::PayloadTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));
    }

    #[test]
    fn from_string() {
        let e: FlycamError = "something broke".into();
        assert!(matches!(e, FlycamError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: FlycamError = io_err.into();
        assert!(matches!(e, FlycamError::Io(_)));
    }
}
