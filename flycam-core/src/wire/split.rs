//! Split video / metadata packets.
//!
//! Used when the payload is an encoded image (JPEG) and metadata travels
//! on its own low-rate channel.
//!
//! ## Wire format (little-endian)
//!
//! **Video packet** (16 byte header + payload):
//! ```text
//! timestamp:    u32  (4)
//! width:        u32  (4)
//! height:       u32  (4)
//! payload_len:  u32  (4)
//! payload:      [u8] (payload_len)
//! ```
//!
//! **Metadata packet** (8 byte header + entries):
//! ```text
//! timestamp:    u32  (4)
//! entry_count:  u32  (4)
//! entries:      entry_count × (name[8] + f32)
//! ```

use crate::error::FlycamError;
use crate::wire::metadata::MetadataTable;

// ── VideoFramer ──────────────────────────────────────────────────

/// Reusable arena for video packets. Width and height are written once.
pub struct VideoFramer {
    buf: Vec<u8>,
    payload_capacity: usize,
}

impl VideoFramer {
    pub const HEADER_SIZE: usize = 16;

    pub fn new(width: u32, height: u32, payload_capacity: usize) -> Self {
        let mut buf = vec![0u8; Self::HEADER_SIZE + payload_capacity];
        buf[4..8].copy_from_slice(&width.to_le_bytes());
        buf[8..12].copy_from_slice(&height.to_le_bytes());
        Self {
            buf,
            payload_capacity,
        }
    }

    pub fn payload_capacity(&self) -> usize {
        self.payload_capacity
    }

    /// Write one video packet and return its bytes.
    pub fn frame(&mut self, timestamp: u32, payload: &[u8]) -> Result<&[u8], FlycamError> {
        if payload.len() > self.payload_capacity {
            return Err(FlycamError::PayloadTooLarge {
                size: payload.len(),
                max: self.payload_capacity,
            });
        }
        self.buf[0..4].copy_from_slice(&timestamp.to_le_bytes());
        self.buf[12..16].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        let end = Self::HEADER_SIZE + payload.len();
        self.buf[Self::HEADER_SIZE..end].copy_from_slice(payload);
        Ok(&self.buf[..end])
    }
}

// ── MetadataFramer ───────────────────────────────────────────────

/// Reusable arena for metadata packets carrying the configured entries.
pub struct MetadataFramer {
    buf: Vec<u8>,
    entries: usize,
}

impl MetadataFramer {
    pub const HEADER_SIZE: usize = 8;

    pub fn new(table: &MetadataTable) -> Self {
        let entries_len = table.entries_bytes().len();
        let mut buf = vec![0u8; Self::HEADER_SIZE + entries_len];
        buf[4..8].copy_from_slice(&(table.len() as u32).to_le_bytes());
        buf[Self::HEADER_SIZE..].copy_from_slice(table.entries_bytes());
        Self {
            buf,
            entries: table.len(),
        }
    }

    /// Write one metadata packet from the current table values.
    pub fn frame(&mut self, timestamp: u32, table: &MetadataTable) -> Result<&[u8], FlycamError> {
        if table.len() != self.entries {
            return Err(FlycamError::ShapeMismatch(format!(
                "metadata framer sized for {} entries, table has {}",
                self.entries,
                table.len()
            )));
        }
        self.buf[0..4].copy_from_slice(&timestamp.to_le_bytes());
        self.buf[Self::HEADER_SIZE..].copy_from_slice(table.entries_bytes());
        Ok(&self.buf)
    }
}

// ── Tests ────────────────────────────────────────────────────────
