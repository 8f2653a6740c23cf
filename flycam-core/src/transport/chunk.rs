//! Datagram chunking for packets larger than one MTU.
//!
//! ## Wire format
//!
//! Every datagram carries a 12 byte header followed by a slice of the
//! packet:
//! ```text
//! sequence:     u32  (4)   one per packet, wrapping
//! total_len:    u32  (4)   full packet length
//! chunk_index:  u16  (2)
//! chunk_count:  u16  (2)
//! data:         [u8] (≤ MTU − 12)
//! ```
//!
//! All chunks but the last are full-size, so the receiver can place each
//! chunk without an explicit offset field.
//!
//! Senders number packets from 0, so a sequence far behind the newest one
//! seen means the sender restarted and the receiver follows it.

use crate::error::FlycamError;

/// Sequences at most this far behind the newest one are stale duplicates
/// or reordered datagrams; anything further back is a restarted sender.
pub const RESTART_WINDOW: u32 = 64;

// ── ChunkHeader ──────────────────────────────────────────────────

/// Per-datagram framing header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub sequence: u32,
    pub total_len: u32,
    pub chunk_index: u16,
    pub chunk_count: u16,
}

impl ChunkHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 12;

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.sequence.to_le_bytes());
        buf[4..8].copy_from_slice(&self.total_len.to_le_bytes());
        buf[8..10].copy_from_slice(&self.chunk_index.to_le_bytes());
        buf[10..12].copy_from_slice(&self.chunk_count.to_le_bytes());
        buf
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, FlycamError> {
        if data.len() < Self::SIZE {
            return Err(FlycamError::Truncated {
                needed: Self::SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            sequence: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            total_len: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
            chunk_index: u16::from_le_bytes([data[8], data[9]]),
            chunk_count: u16::from_le_bytes([data[10], data[11]]),
        })
    }
}

/// Number of datagrams needed for `len` bytes at `mtu`.
pub fn chunk_count(len: usize, mtu: usize) -> Result<u16, FlycamError> {
    let per_chunk = mtu.saturating_sub(ChunkHeader::SIZE);
    if per_chunk == 0 {
        return Err(FlycamError::InvalidConfig(format!(
            "mtu {mtu} leaves no room after the {} byte chunk header",
            ChunkHeader::SIZE
        )));
    }
    let count = len.div_ceil(per_chunk).max(1);
    u16::try_from(count).map_err(|_| FlycamError::PayloadTooLarge {
        size: len,
        max: per_chunk * u16::MAX as usize,
    })
}

// ── PacketAssembler ──────────────────────────────────────────────

/// Receiver-side reassembly that keeps only the newest packet.
///
/// A chunk from a newer sequence abandons whatever was in progress;
/// chunks up to [`RESTART_WINDOW`] sequences older, and duplicates, are
/// dropped.
#[derive(Debug, Default)]
pub struct PacketAssembler {
    sequence: Option<u32>,
    buf: Vec<u8>,
    received: Vec<bool>,
    remaining: usize,
    abandoned: u64,
    restarts: u64,
}

impl PacketAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets abandoned because a newer one started first.
    pub fn abandoned(&self) -> u64 {
        self.abandoned
    }

    /// Times the sequence jumped back past [`RESTART_WINDOW`].
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Feed one datagram. Returns the packet when its last chunk lands.
    pub fn push(&mut self, datagram: &[u8]) -> Result<Option<Vec<u8>>, FlycamError> {
        let header = ChunkHeader::decode(datagram)?;
        let data = &datagram[ChunkHeader::SIZE..];
        let count = header.chunk_count as usize;
        let index = header.chunk_index as usize;
        let total = header.total_len as usize;
        if count == 0 || index >= count {
            return Err(FlycamError::Other(format!(
                "chunk {index} of {count} is out of range"
            )));
        }

        match self.sequence {
            Some(current) if current == header.sequence => {}
            Some(current) if current.wrapping_sub(header.sequence) <= RESTART_WINDOW => {
                return Ok(None);
            }
            current => {
                if let Some(current) = current {
                    if self.remaining > 0 {
                        self.abandoned += 1;
                    }
                    if (header.sequence.wrapping_sub(current) as i32) < 0 {
                        self.restarts += 1;
                    }
                }
                self.start(header.sequence, total, count);
            }
        }

        if self.remaining == 0 || self.received.len() != count || self.buf.len() != total {
            return Ok(None);
        }
        if self.received[index] {
            return Ok(None);
        }

        let offset = if index + 1 == count {
            total.checked_sub(data.len())
        } else {
            index.checked_mul(data.len())
        };
        let Some(offset) = offset.filter(|o| o + data.len() <= total) else {
            return Err(FlycamError::Other(format!(
                "chunk {index} of sequence {} does not fit a {total} byte packet",
                header.sequence
            )));
        };

        self.buf[offset..offset + data.len()].copy_from_slice(data);
        self.received[index] = true;
        self.remaining -= 1;
        if self.remaining == 0 {
            return Ok(Some(std::mem::take(&mut self.buf)));
        }
        Ok(None)
    }

    fn start(&mut self, sequence: u32, total: usize, count: usize) {
        self.sequence = Some(sequence);
        self.buf.clear();
        self.buf.resize(total, 0);
        self.received.clear();
        self.received.resize(count, false);
        self.remaining = count;
    }
}

/// Iterate the datagram slices of `packet` with their headers.
///
/// An empty packet still yields one header-only chunk.
pub fn split_packet(
    packet: &[u8],
    sequence: u32,
    mtu: usize,
) -> Result<impl Iterator<Item = (ChunkHeader, &[u8])> + '_, FlycamError> {
    let count = chunk_count(packet.len(), mtu)?;
    let per_chunk = mtu - ChunkHeader::SIZE;
    let total_len = packet.len() as u32;
    Ok(packet
        .chunks(per_chunk)
        .chain(packet.is_empty().then_some(packet))
        .enumerate()
        .map(move |(idx, data)| {
            let header = ChunkHeader {
                sequence,
                total_len,
                chunk_index: idx as u16,
                chunk_count: count,
            };
            (header, data)
        }))
}

/// Write `header` followed by `data` into `scratch`, replacing its contents.
pub(crate) fn write_datagram<'a>(scratch: &'a mut Vec<u8>, header: &ChunkHeader, data: &[u8]) -> &'a [u8] {
    scratch.clear();
    scratch.extend_from_slice(&header.encode());
    scratch.extend_from_slice(data);
    scratch
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn datagrams(packet: &[u8], sequence: u32, mtu: usize) -> Vec<Vec<u8>> {
        let mut scratch = Vec::new();
        split_packet(packet, sequence, mtu)
            .unwrap()
            .map(|(header, data)| write_datagram(&mut scratch, &header, data).to_vec())
            .collect()
    }

    #[test]
    fn chunk_header_roundtrip() {
        let ch = ChunkHeader {
            sequence: 7,
            total_len: 243_200,
            chunk_index: 3,
            chunk_count: 175,
        };
        assert_eq!(ChunkHeader::decode(&ch.encode()).unwrap(), ch);
    }

    #[test]
    fn chunk_header_too_short() {
        assert!(ChunkHeader::decode(&[0u8; 4]).is_err());
    }

    #[test]
    fn splits_on_mtu() {
        let packet: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();
        let grams = datagrams(&packet, 1, 1400);
        assert_eq!(grams.len(), 4);
        assert!(grams[..3].iter().all(|g| g.len() == 1400));
        assert_eq!(grams[3].len(), ChunkHeader::SIZE + 5000 - 3 * 1388);
    }

    #[test]
    fn reassembles_out_of_order() {
        let packet: Vec<u8> = (0..5000u32).map(|i| (i * 7) as u8).collect();
        let mut grams = datagrams(&packet, 9, 1400);
        grams.reverse();

        let mut asm = PacketAssembler::new();
        let mut result = None;
        for g in &grams {
            if let Some(p) = asm.push(g).unwrap() {
                result = Some(p);
            }
        }
        assert_eq!(result.unwrap(), packet);
    }

    #[test]
    fn newer_sequence_abandons_partial_packet() {
        let old = vec![1u8; 3000];
        let new = vec![2u8; 3000];
        let old_grams = datagrams(&old, 1, 1400);
        let new_grams = datagrams(&new, 2, 1400);

        let mut asm = PacketAssembler::new();
        assert!(asm.push(&old_grams[0]).unwrap().is_none());
        let mut done = None;
        for g in &new_grams {
            done = asm.push(g).unwrap().or(done);
        }
        // Late chunks of the stale packet are ignored.
        assert!(asm.push(&old_grams[1]).unwrap().is_none());
        assert_eq!(done.unwrap(), new);
        assert_eq!(asm.abandoned(), 1);
    }

    #[test]
    fn follows_a_restarted_sender() {
        let mut asm = PacketAssembler::new();
        let before = datagrams(&[9u8; 10], 5000, 1400);
        assert!(asm.push(&before[0]).unwrap().is_some());

        let mut delivered = 0;
        for seq in 0..100u32 {
            let grams = datagrams(&seq.to_le_bytes(), seq, 1400);
            if let Some(p) = asm.push(&grams[0]).unwrap() {
                assert_eq!(p, seq.to_le_bytes());
                delivered += 1;
            }
        }
        assert_eq!(delivered, 100);
        assert_eq!(asm.restarts(), 1);
    }

    #[test]
    fn reordered_packets_inside_window_are_stale() {
        let mut asm = PacketAssembler::new();
        assert!(asm.push(&datagrams(&[1u8; 4], 5000, 1400)[0]).unwrap().is_some());
        let late = 5000 - RESTART_WINDOW;
        assert!(asm.push(&datagrams(&[2u8; 4], late, 1400)[0]).unwrap().is_none());
        assert!(asm.push(&datagrams(&[3u8; 4], 4999, 1400)[0]).unwrap().is_none());
        assert_eq!(asm.restarts(), 0);

        // Wrapping forward across u32::MAX is still newer.
        let mut asm = PacketAssembler::new();
        assert!(asm.push(&datagrams(&[1u8; 4], u32::MAX, 1400)[0]).unwrap().is_some());
        assert!(asm.push(&datagrams(&[2u8; 4], 0, 1400)[0]).unwrap().is_some());
        assert_eq!(asm.restarts(), 0);
    }

    #[test]
    fn duplicates_are_ignored() {
        let packet = vec![5u8; 2000];
        let grams = datagrams(&packet, 3, 1400);
        let mut asm = PacketAssembler::new();
        assert!(asm.push(&grams[0]).unwrap().is_none());
        assert!(asm.push(&grams[0]).unwrap().is_none());
        assert_eq!(asm.push(&grams[1]).unwrap().unwrap(), packet);
    }

    #[test]
    fn empty_packet_is_one_datagram() {
        let grams = datagrams(&[], 4, 1400);
        assert_eq!(grams.len(), 1);
        let mut asm = PacketAssembler::new();
        assert_eq!(asm.push(&grams[0]).unwrap().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn tiny_mtu_rejected() {
        assert!(chunk_count(10, ChunkHeader::SIZE).is_err());
        assert_eq!(chunk_count(0, 1400).unwrap(), 1);
    }
}
