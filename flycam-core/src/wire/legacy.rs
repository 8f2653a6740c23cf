//! Fixed-header packet with an inline 256-slot metadata table.
//!
//! ## Wire format (little-endian)
//!
//! ```text
//! timestamp:    u32        (4)
//! width:        u32        (4)
//! height:       u32        (4)
//! channels:     u8         (1)
//! bits:         [u8; C]    (C)
//! compressed:   u8         (1)   0 = raw, 1 = compressed
//! payload_len:  u32        (4)
//! payload:      [u8]       (payload_len)
//! metadata:     [u8; 3072] (256 × (name[8] + f32))
//! ```
//!
//! With three channels the header is 21 bytes.

use crate::codec::BitWidths;
use crate::error::FlycamError;
use crate::wire::metadata::{METADATA_TABLE_SIZE, MetadataTable};

// ── Header offsets ───────────────────────────────────────────────

const TIMESTAMP_AT: usize = 0;
const WIDTH_AT: usize = 4;
const HEIGHT_AT: usize = 8;
const CHANNELS_AT: usize = 12;
const BITS_AT: usize = 13;

/// Header size for `channels` channels.
pub const fn header_len(channels: usize) -> usize {
    BITS_AT + channels + 1 + 4
}

// ── FramerState ──────────────────────────────────────────────────

/// Progress of the packet currently being assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    New,
    HeaderWritten,
    PayloadWritten,
    MetadataWritten,
    Complete,
}

impl FramerState {
    pub fn name(self) -> &'static str {
        match self {
            FramerState::New => "new",
            FramerState::HeaderWritten => "header-written",
            FramerState::PayloadWritten => "payload-written",
            FramerState::MetadataWritten => "metadata-written",
            FramerState::Complete => "complete",
        }
    }
}

// ── LegacyFramer ─────────────────────────────────────────────────

/// Reusable packet arena for the fixed-header format.
///
/// Sized once for the largest payload the stream can produce. Width,
/// height, channel count and bit widths are written at construction and
/// never touched again; each packet only rewrites timestamp, flag,
/// payload length, payload and the metadata block.
pub struct LegacyFramer {
    buf: Vec<u8>,
    header_len: usize,
    payload_capacity: usize,
    payload_len: usize,
    state: FramerState,
}

impl LegacyFramer {
    /// Framer for a `width` × `height` stream whose largest payload is
    /// the uncompressed bitstream.
    pub fn new(width: u32, height: u32, widths: &BitWidths) -> Self {
        let capacity = widths.packed_len(width as usize, height as usize);
        Self::with_capacity(width, height, widths, capacity)
    }

    /// Framer with an explicit payload capacity.
    pub fn with_capacity(width: u32, height: u32, widths: &BitWidths, payload_capacity: usize) -> Self {
        let channels = widths.channels();
        let header_len = header_len(channels);
        let mut buf = vec![0u8; header_len + payload_capacity + METADATA_TABLE_SIZE];

        buf[WIDTH_AT..WIDTH_AT + 4].copy_from_slice(&width.to_le_bytes());
        buf[HEIGHT_AT..HEIGHT_AT + 4].copy_from_slice(&height.to_le_bytes());
        buf[CHANNELS_AT] = channels as u8;
        buf[BITS_AT..BITS_AT + channels].copy_from_slice(widths.as_slice());

        Self {
            buf,
            header_len,
            payload_capacity,
            payload_len: 0,
            state: FramerState::New,
        }
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn payload_capacity(&self) -> usize {
        self.payload_capacity
    }

    /// Total packet length for a given payload length.
    pub fn packet_len(&self, payload_len: usize) -> usize {
        self.header_len + payload_len + METADATA_TABLE_SIZE
    }

    /// Start a new packet. Any partially built packet is abandoned.
    pub fn begin(&mut self, timestamp: u32) {
        self.buf[TIMESTAMP_AT..TIMESTAMP_AT + 4].copy_from_slice(&timestamp.to_le_bytes());
        self.payload_len = 0;
        self.state = FramerState::HeaderWritten;
    }

    /// Copy `payload` into the packet.
    pub fn write_payload(&mut self, payload: &[u8], compressed: bool) -> Result<(), FlycamError> {
        self.fill_payload(compressed, |region| {
            let max = region.len();
            let dst = region.get_mut(..payload.len()).ok_or(FlycamError::PayloadTooLarge {
                size: payload.len(),
                max,
            })?;
            dst.copy_from_slice(payload);
            Ok(payload.len())
        })
    }

    /// Let `fill` write the payload directly into the arena. It receives
    /// the whole payload region and returns how many bytes it used.
    pub fn fill_payload<F>(&mut self, compressed: bool, fill: F) -> Result<(), FlycamError>
    where
        F: FnOnce(&mut [u8]) -> Result<usize, FlycamError>,
    {
        self.expect(FramerState::HeaderWritten)?;
        let start = self.header_len;
        let region = &mut self.buf[start..start + self.payload_capacity];
        let written = match fill(region) {
            Ok(n) if n <= self.payload_capacity => n,
            Ok(n) => {
                self.state = FramerState::New;
                return Err(FlycamError::PayloadTooLarge {
                    size: n,
                    max: self.payload_capacity,
                });
            }
            Err(e) => {
                self.state = FramerState::New;
                return Err(e);
            }
        };

        let flag_at = self.header_len - 5;
        self.buf[flag_at] = compressed as u8;
        self.buf[flag_at + 1..flag_at + 5].copy_from_slice(&(written as u32).to_le_bytes());
        self.payload_len = written;
        self.state = FramerState::PayloadWritten;
        Ok(())
    }

    /// Append the metadata table after the payload.
    pub fn write_metadata(&mut self, table: &MetadataTable) -> Result<(), FlycamError> {
        self.expect(FramerState::PayloadWritten)?;
        let at = self.header_len + self.payload_len;
        self.buf[at..at + METADATA_TABLE_SIZE].copy_from_slice(table.as_bytes());
        self.state = FramerState::MetadataWritten;
        Ok(())
    }

    /// Seal the packet and return its bytes.
    pub fn finish(&mut self) -> Result<&[u8], FlycamError> {
        self.expect(FramerState::MetadataWritten)?;
        self.state = FramerState::Complete;
        Ok(&self.buf[..self.packet_len(self.payload_len)])
    }

    /// The last completed packet, if the framer is in `Complete`.
    pub fn packet(&self) -> Option<&[u8]> {
        (self.state == FramerState::Complete).then(|| &self.buf[..self.packet_len(self.payload_len)])
    }

    /// Build a whole packet in one call.
    pub fn frame(
        &mut self,
        timestamp: u32,
        payload: &[u8],
        compressed: bool,
        metadata: &MetadataTable,
    ) -> Result<&[u8], FlycamError> {
        self.begin(timestamp);
        self.write_payload(payload, compressed)?;
        self.write_metadata(metadata)?;
        self.finish()
    }

    fn expect(&mut self, expected: FramerState) -> Result<(), FlycamError> {
        if self.state != expected {
            let actual = self.state;
            self.state = FramerState::New;
            return Err(FlycamError::FramingOrder {
                expected: expected.name(),
                actual: actual.name(),
            });
        }
        Ok(())
    }
}

// ── LegacyHeader ─────────────────────────────────────────────────

/// Parsed view of a legacy packet.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyPacket<'a> {
    pub timestamp: u32,
    pub width: u32,
    pub height: u32,
    pub bits: Vec<u8>,
    pub compressed: bool,
    pub payload: &'a [u8],
    pub metadata: &'a [u8],
}

impl<'a> LegacyPacket<'a> {
    /// Split a received packet into its fields without copying the payload.
    pub fn parse(data: &'a [u8]) -> Result<Self, FlycamError> {
        let short = |needed: usize| FlycamError::Truncated {
            needed,
            actual: data.len(),
        };
        if data.len() < BITS_AT {
            return Err(short(header_len(0)));
        }
        let channels = data[CHANNELS_AT] as usize;
        let hlen = header_len(channels);
        if data.len() < hlen {
            return Err(short(hlen));
        }
        let u32_at = |at: usize| u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);

        let payload_len = u32_at(hlen - 4) as usize;
        let total = hlen + payload_len + METADATA_TABLE_SIZE;
        if data.len() < total {
            return Err(short(total));
        }

        Ok(Self {
            timestamp: u32_at(TIMESTAMP_AT),
            width: u32_at(WIDTH_AT),
            height: u32_at(HEIGHT_AT),
            bits: data[BITS_AT..BITS_AT + channels].to_vec(),
            compressed: data[hlen - 5] != 0,
            payload: &data[hlen..hlen + payload_len],
            metadata: &data[hlen + payload_len..total],
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::metadata::read_entries;

    fn widths() -> BitWidths {
        BitWidths::new(vec![5, 8, 6]).unwrap()
    }

    fn table() -> MetadataTable {
        let mut t = MetadataTable::from_names(&["exposure", "gain"]).unwrap();
        t.set_all(&[8000.0, 1.5]).unwrap();
        t
    }

    #[test]
    fn three_channel_layout_matches_reference_offsets() {
        assert_eq!(header_len(3), 21);
        let mut framer = LegacyFramer::new(10, 10, &widths());
        let payload = vec![0x5A; 238];
        let pkt = framer.frame(0x0102_0304, &payload, true, &table()).unwrap();

        assert_eq!(pkt.len(), 21 + 238 + 3072);
        assert_eq!(&pkt[0..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&pkt[4..8], &10u32.to_le_bytes());
        assert_eq!(&pkt[8..12], &10u32.to_le_bytes());
        assert_eq!(pkt[12], 3);
        assert_eq!(&pkt[13..16], &[5, 8, 6]);
        assert_eq!(pkt[16], 1);
        assert_eq!(&pkt[17..21], &238u32.to_le_bytes());
        assert!(pkt[21..259].iter().all(|&b| b == 0x5A));
        assert_eq!(&pkt[259..267], b"exposure");
    }

    #[test]
    fn parse_roundtrip() {
        let mut framer = LegacyFramer::new(4, 2, &widths());
        let payload = [1u8, 2, 3, 4, 5];
        let pkt = framer.frame(77, &payload, false, &table()).unwrap().to_vec();

        let parsed = LegacyPacket::parse(&pkt).unwrap();
        assert_eq!(parsed.timestamp, 77);
        assert_eq!((parsed.width, parsed.height), (4, 2));
        assert_eq!(parsed.bits, vec![5, 8, 6]);
        assert!(!parsed.compressed);
        assert_eq!(parsed.payload, &payload);
        let entries = read_entries(parsed.metadata).unwrap();
        assert_eq!(entries[1], ("gain".to_string(), 1.5));
    }

    #[test]
    fn stages_must_run_in_order() {
        let mut framer = LegacyFramer::new(4, 4, &widths());
        assert!(matches!(
            framer.write_payload(&[1], false),
            Err(FlycamError::FramingOrder { .. })
        ));
        framer.begin(1);
        assert!(framer.write_metadata(&table()).is_err());
        assert_eq!(framer.state(), FramerState::New);
        framer.begin(1);
        framer.write_payload(&[1], false).unwrap();
        assert!(framer.finish().is_err());
    }

    #[test]
    fn oversized_payload_keeps_constants() {
        let mut framer = LegacyFramer::new(2, 2, &widths());
        let cap = framer.payload_capacity();
        assert_eq!(cap, 10);

        framer.begin(5);
        let err = framer.write_payload(&vec![0; cap + 1], true).unwrap_err();
        assert!(matches!(err, FlycamError::PayloadTooLarge { size: 11, max: 10 }));
        assert_eq!(framer.state(), FramerState::New);

        // Next packet is unaffected.
        let pkt = framer.frame(6, &[9; 10], false, &table()).unwrap().to_vec();
        let parsed = LegacyPacket::parse(&pkt).unwrap();
        assert_eq!((parsed.width, parsed.height), (2, 2));
        assert_eq!(parsed.bits, vec![5, 8, 6]);
        assert_eq!(parsed.payload, &[9; 10]);
    }

    #[test]
    fn fill_payload_writes_in_place() {
        let w = widths();
        let mut framer = LegacyFramer::new(3, 3, &w);
        framer.begin(1);
        framer
            .fill_payload(false, |region| {
                region[..3].copy_from_slice(&[7, 8, 9]);
                Ok(3)
            })
            .unwrap();
        framer.write_metadata(&table()).unwrap();
        let pkt = framer.finish().unwrap();
        assert_eq!(&pkt[21..24], &[7, 8, 9]);
        assert_eq!(pkt.len(), 21 + 3 + 3072);
        assert!(framer.packet().is_some());
    }

    #[test]
    fn buffer_never_grows() {
        let mut framer = LegacyFramer::new(8, 8, &widths());
        let cap = framer.buf.capacity();
        for ts in 0..10 {
            framer.frame(ts, &[ts as u8; 100], ts % 2 == 0, &table()).unwrap();
        }
        assert_eq!(framer.buf.capacity(), cap);
    }

    #[test]
    fn parse_rejects_truncated() {
        let mut framer = LegacyFramer::new(4, 2, &widths());
        let pkt = framer.frame(1, &[1, 2, 3], false, &table()).unwrap().to_vec();
        assert!(LegacyPacket::parse(&pkt[..pkt.len() - 1]).is_err());
        assert!(LegacyPacket::parse(&pkt[..10]).is_err());
    }
}
