//! Per-frame encode → frame → submit.
//!
//! Two stream formats are supported:
//!
//! - **Legacy**: quantize + pack straight into the framer's payload
//!   region, optionally compress, append the metadata table, push one
//!   packet on the video channel.
//! - **Split**: JPEG-encode the frame, push a video packet, and push a
//!   metadata packet on its own channel whenever its send interval has
//!   elapsed.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use tracing::{debug, trace, warn};

use crate::codec::{BitWidths, Compressor, quantize_and_pack_into};
use crate::error::FlycamError;
use crate::pipeline::service::PipelineConfig;
use crate::transport::PushSocket;
use crate::types::{Frame, TimestampUnit};
use crate::wire::{LegacyFramer, MetadataFramer, MetadataTable, VideoFramer};

// ── StreamFormat ─────────────────────────────────────────────────

/// Packet layout on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamFormat {
    /// One packet per frame: header, bitstream payload, metadata table.
    #[default]
    Legacy,
    /// JPEG video packets plus separate metadata packets.
    Split,
}

impl FromStr for StreamFormat {
    type Err = FlycamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" | "packed" => Ok(StreamFormat::Legacy),
            "split" | "jpeg" => Ok(StreamFormat::Split),
            other => Err(FlycamError::InvalidConfig(format!(
                "unknown stream format {other:?} (expected legacy or split)"
            ))),
        }
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamFormat::Legacy => "legacy",
            StreamFormat::Split => "split",
        })
    }
}

// ── ProcessorStats ───────────────────────────────────────────────

/// Running counters for the processing thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Frames turned into packets and submitted.
    pub frames: u64,
    /// Bytes submitted across all channels.
    pub bytes: u64,
    /// Legacy packets whose payload went out compressed.
    pub compressed: u64,
    /// Legacy packets that fell back to the raw bitstream.
    pub fallbacks: u64,
    /// Metadata packets submitted (split format).
    pub metadata_packets: u64,
}

/// Result of processing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Bytes submitted for this frame, metadata packet included.
    pub bytes: usize,
    /// Whether the legacy payload is compressed.
    pub compressed: bool,
    /// Whether a split-format metadata packet was sent.
    pub metadata_sent: bool,
}

// ── FrameProcessor ───────────────────────────────────────────────

enum Mode {
    Legacy {
        framer: LegacyFramer,
        compressor: Option<Box<dyn Compressor>>,
        raw: Vec<u8>,
        packed: Vec<u8>,
    },
    Split {
        video: VideoFramer,
        metadata: MetadataFramer,
        jpeg: Vec<u8>,
        quality: u8,
        send_interval: Duration,
        last_metadata: Option<Instant>,
    },
}

/// Turns frames into packets and hands them to the push sockets.
///
/// All buffers are sized at construction; a failure on one frame leaves
/// the constant header fields intact for the next.
pub struct FrameProcessor {
    width: u32,
    height: u32,
    widths: BitWidths,
    timestamp: TimestampUnit,
    mode: Mode,
    video_out: Arc<dyn PushSocket>,
    metadata_out: Arc<dyn PushSocket>,
    stats: ProcessorStats,
}

impl FrameProcessor {
    /// Build a processor. In the legacy format `metadata_out` is unused
    /// and may be the same socket as `video_out`.
    pub fn new(
        config: &PipelineConfig,
        metadata: &MetadataTable,
        video_out: Arc<dyn PushSocket>,
        metadata_out: Arc<dyn PushSocket>,
    ) -> Result<Self, FlycamError> {
        config.validate()?;
        let (width, height) = (config.width, config.height);
        let widths = config.widths.clone();

        let mode = match config.format {
            StreamFormat::Legacy => {
                let framer = LegacyFramer::new(width, height, &widths);
                let capacity = framer.payload_capacity();
                let compressor = config.compression.build(config.compression_level);
                let (raw, packed) = if compressor.is_some() {
                    (vec![0u8; capacity], Vec::with_capacity(capacity))
                } else {
                    (Vec::new(), Vec::new())
                };
                Mode::Legacy {
                    framer,
                    compressor,
                    raw,
                    packed,
                }
            }
            StreamFormat::Split => {
                let frame_len = width as usize * height as usize * widths.channels();
                // JPEG of noise can outgrow the raw frame; leave headroom.
                let capacity = frame_len + frame_len / 2 + 4096;
                Mode::Split {
                    video: VideoFramer::new(width, height, capacity),
                    metadata: MetadataFramer::new(metadata),
                    jpeg: Vec::with_capacity(capacity),
                    quality: config.jpeg_quality,
                    send_interval: config.metadata_send_interval,
                    last_metadata: None,
                }
            }
        };

        Ok(Self {
            width,
            height,
            widths,
            timestamp: config.timestamp,
            mode,
            video_out,
            metadata_out,
            stats: ProcessorStats::default(),
        })
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    pub fn format(&self) -> StreamFormat {
        match self.mode {
            Mode::Legacy { .. } => StreamFormat::Legacy,
            Mode::Split { .. } => StreamFormat::Split,
        }
    }

    /// Encode, frame and submit one frame.
    pub fn process(
        &mut self,
        frame: &Frame,
        metadata: &MetadataTable,
        now: Instant,
    ) -> Result<FrameOutcome, FlycamError> {
        if frame.width != self.width || frame.height != self.height {
            return Err(FlycamError::ShapeMismatch(format!(
                "frame is {}x{}, stream is {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        let timestamp = self.timestamp.wire_timestamp(frame.captured_at);

        let outcome = match &mut self.mode {
            Mode::Legacy {
                framer,
                compressor,
                raw,
                packed,
            } => {
                framer.begin(timestamp);
                let compressed = match compressor.as_mut() {
                    None => {
                        let widths = &self.widths;
                        framer.fill_payload(false, |region| {
                            quantize_and_pack_into(frame, widths, region)
                        })?;
                        false
                    }
                    Some(compressor) => {
                        let n = quantize_and_pack_into(frame, &self.widths, raw)?;
                        let fits = framer.payload_capacity();
                        match compressor.compress_into(&raw[..n], packed) {
                            Ok(()) if packed.len() <= fits => {
                                framer.write_payload(packed.as_slice(), true)?;
                                true
                            }
                            Ok(()) => {
                                debug!(
                                    codec = compressor.name(),
                                    compressed = packed.len(),
                                    raw = n,
                                    "compressed payload does not fit, sending raw"
                                );
                                framer.write_payload(&raw[..n], false)?;
                                false
                            }
                            Err(e) => {
                                warn!(codec = compressor.name(), "compression failed, sending raw: {e}");
                                framer.write_payload(&raw[..n], false)?;
                                false
                            }
                        }
                    }
                };
                framer.write_metadata(metadata)?;
                let packet = framer.finish()?;
                self.video_out.submit(packet);
                trace!(timestamp, bytes = packet.len(), compressed, "legacy packet");

                if compressed {
                    self.stats.compressed += 1;
                } else if compressor.is_some() {
                    self.stats.fallbacks += 1;
                }
                FrameOutcome {
                    bytes: packet.len(),
                    compressed,
                    metadata_sent: false,
                }
            }
            Mode::Split {
                video,
                metadata: metadata_framer,
                jpeg,
                quality,
                send_interval,
                last_metadata,
            } => {
                encode_jpeg(frame, *quality, jpeg)?;
                let packet = video.frame(timestamp, jpeg.as_slice())?;
                self.video_out.submit(packet);
                let mut bytes = packet.len();
                trace!(timestamp, bytes, "video packet");

                let due = last_metadata
                    .is_none_or(|last| now.saturating_duration_since(last) >= *send_interval);
                if due {
                    let packet = metadata_framer.frame(timestamp, metadata)?;
                    self.metadata_out.submit(packet);
                    bytes += packet.len();
                    *last_metadata = Some(now);
                    self.stats.metadata_packets += 1;
                }
                FrameOutcome {
                    bytes,
                    compressed: false,
                    metadata_sent: due,
                }
            }
        };

        self.stats.frames += 1;
        self.stats.bytes += outcome.bytes as u64;
        Ok(outcome)
    }
}

/// JPEG-encode `frame` into `out`, replacing its contents.
///
/// Only 1 (greyscale) and 3 (RGB) channel frames can be encoded.
pub fn encode_jpeg(frame: &Frame, quality: u8, out: &mut Vec<u8>) -> Result<(), FlycamError> {
    let color = match frame.channels {
        1 => ExtendedColorType::L8,
        3 => ExtendedColorType::Rgb8,
        n => {
            return Err(FlycamError::ShapeMismatch(format!(
                "JPEG needs 1 or 3 channels, frame has {n}"
            )));
        }
    };
    out.clear();
    let mut encoder = JpegEncoder::new_with_quality(&mut *out, quality.clamp(1, 100));
    encoder.encode(&frame.data, frame.width, frame.height, color)?;
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CompressionKind, quantize, unpack};
    use crate::transport::MemorySocket;
    use crate::wire::{LegacyPacket, read_entries};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn config(format: StreamFormat, compression: CompressionKind) -> PipelineConfig {
        PipelineConfig {
            width: 16,
            height: 8,
            widths: BitWidths::new(vec![5, 8, 6]).unwrap(),
            format,
            compression,
            metadata_send_interval: Duration::from_millis(100),
            ..PipelineConfig::default()
        }
    }

    fn gradient(w: u32, h: u32) -> Frame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x * 16) as u8, (y * 32) as u8, 200]);
            }
        }
        Frame::new(w, h, 3, data).unwrap()
    }

    fn flat(w: u32, h: u32) -> Frame {
        Frame::new(w, h, 3, [100, 150, 200].repeat((w * h) as usize)).unwrap()
    }

    fn noise(w: u32, h: u32, seed: u64) -> Frame {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = (0..w * h * 3).map(|_| rng.r#gen::<u8>()).collect();
        Frame::new(w, h, 3, data).unwrap()
    }

    fn table() -> MetadataTable {
        let mut t = MetadataTable::from_names(&["gain", "iso"]).unwrap();
        t.set_all(&[2.0, 400.0]).unwrap();
        t
    }

    fn sockets() -> (Arc<MemorySocket>, Arc<MemorySocket>) {
        (Arc::new(MemorySocket::new()), Arc::new(MemorySocket::new()))
    }

    #[test]
    fn legacy_raw_packet_decodes() {
        let cfg = config(StreamFormat::Legacy, CompressionKind::None);
        let (video, meta) = sockets();
        let table = table();
        let mut proc = FrameProcessor::new(&cfg, &table, video.clone(), meta.clone()).unwrap();
        assert_eq!(proc.format(), StreamFormat::Legacy);

        let frame = noise(16, 8, 1);
        let outcome = proc.process(&frame, &table, Instant::now()).unwrap();
        assert!(!outcome.compressed);

        let bytes = video.take_latest().unwrap();
        assert_eq!(bytes.len(), outcome.bytes);
        let pkt = LegacyPacket::parse(&bytes).unwrap();
        assert_eq!((pkt.width, pkt.height), (16, 8));
        assert!(!pkt.compressed);
        let widths = BitWidths::new(pkt.bits.clone()).unwrap();
        let q = unpack(pkt.payload, &widths, 8, 16, 3).unwrap();
        assert_eq!(q, quantize(&frame, &cfg.widths).unwrap());
        assert_eq!(read_entries(pkt.metadata).unwrap()[1], ("iso".to_string(), 400.0));
        assert!(meta.take_latest().is_none());
    }

    #[test]
    fn legacy_compressed_packet_decodes() {
        for kind in [CompressionKind::Lz4, CompressionKind::Zstd] {
            let cfg = config(StreamFormat::Legacy, kind);
            let (video, meta) = sockets();
            let table = table();
            let mut proc = FrameProcessor::new(&cfg, &table, video.clone(), meta).unwrap();

            let frame = flat(16, 8);
            let outcome = proc.process(&frame, &table, Instant::now()).unwrap();
            assert!(outcome.compressed, "{kind} should shrink a flat frame");

            let bytes = video.take_latest().unwrap();
            let pkt = LegacyPacket::parse(&bytes).unwrap();
            assert!(pkt.compressed);
            let raw_len = cfg.widths.packed_len(16, 8);
            let raw = kind.build(0).unwrap().decompress(pkt.payload, raw_len).unwrap();
            let q = unpack(&raw, &cfg.widths, 8, 16, 3).unwrap();
            assert_eq!(q, quantize(&frame, &cfg.widths).unwrap());
            assert_eq!(proc.stats().compressed, 1);
        }
    }

    #[test]
    fn incompressible_payload_falls_back_to_raw() {
        let mut cfg = config(StreamFormat::Legacy, CompressionKind::Lz4);
        cfg.widths = BitWidths::uniform(8, 3).unwrap();
        let (video, meta) = sockets();
        let table = table();
        let mut proc = FrameProcessor::new(&cfg, &table, video.clone(), meta).unwrap();

        let frame = noise(16, 8, 7);
        let outcome = proc.process(&frame, &table, Instant::now()).unwrap();
        assert!(!outcome.compressed);

        let bytes = video.take_latest().unwrap();
        let pkt = LegacyPacket::parse(&bytes).unwrap();
        assert!(!pkt.compressed);
        assert_eq!(pkt.payload, &frame.data[..]);
        assert_eq!(proc.stats().fallbacks, 1);
    }

    struct BrokenCompressor;

    impl Compressor for BrokenCompressor {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn compress_into(&mut self, _src: &[u8], dst: &mut Vec<u8>) -> Result<(), FlycamError> {
            dst.clear();
            Err(FlycamError::Compression("out of memory".into()))
        }

        fn decompress(&self, _src: &[u8], _original_len: usize) -> Result<Vec<u8>, FlycamError> {
            Err(FlycamError::Compression("unreachable".into()))
        }
    }

    #[test]
    fn compressor_error_sends_raw_payload() {
        let cfg = config(StreamFormat::Legacy, CompressionKind::Lz4);
        let (video, meta) = sockets();
        let table = table();
        let mut proc = FrameProcessor::new(&cfg, &table, video.clone(), meta).unwrap();
        if let Mode::Legacy { compressor, .. } = &mut proc.mode {
            *compressor = Some(Box::new(BrokenCompressor));
        }

        let frame = flat(16, 8);
        let outcome = proc.process(&frame, &table, Instant::now()).unwrap();
        assert!(!outcome.compressed);

        let bytes = video.take_latest().unwrap();
        let pkt = LegacyPacket::parse(&bytes).unwrap();
        assert!(!pkt.compressed);
        let q = unpack(pkt.payload, &cfg.widths, 8, 16, 3).unwrap();
        assert_eq!(q, quantize(&frame, &cfg.widths).unwrap());
        assert_eq!(proc.stats().fallbacks, 1);
        assert_eq!(proc.stats().compressed, 0);
    }

    #[test]
    fn bad_frame_does_not_corrupt_header() {
        let cfg = config(StreamFormat::Legacy, CompressionKind::None);
        let (video, meta) = sockets();
        let table = table();
        let mut proc = FrameProcessor::new(&cfg, &table, video.clone(), meta).unwrap();

        assert!(proc.process(&gradient(8, 8), &table, Instant::now()).is_err());
        let grey = Frame::new(16, 8, 1, vec![0; 128]).unwrap();
        assert!(proc.process(&grey, &table, Instant::now()).is_err());
        assert!(video.take_latest().is_none());

        proc.process(&gradient(16, 8), &table, Instant::now()).unwrap();
        let bytes = video.take_latest().unwrap();
        let pkt = LegacyPacket::parse(&bytes).unwrap();
        assert_eq!((pkt.width, pkt.height), (16, 8));
        assert_eq!(pkt.bits, vec![5, 8, 6]);
        assert_eq!(proc.stats().frames, 1);
    }

    #[test]
    fn split_sends_jpeg_and_timed_metadata() {
        let cfg = config(StreamFormat::Split, CompressionKind::None);
        let (video, meta) = sockets();
        let table = table();
        let mut proc = FrameProcessor::new(&cfg, &table, video.clone(), meta.clone()).unwrap();
        assert_eq!(proc.format(), StreamFormat::Split);
        let t0 = Instant::now();

        let first = proc.process(&gradient(16, 8), &table, t0).unwrap();
        assert!(first.metadata_sent);
        let bytes = video.take_latest().unwrap();
        assert_eq!(&bytes[4..8], &16u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &8u32.to_le_bytes());
        let len = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
        assert_eq!(bytes.len(), 16 + len);
        // JPEG SOI marker.
        assert_eq!(&bytes[16..18], &[0xFF, 0xD8]);

        let meta_pkt = meta.take_latest().unwrap();
        assert_eq!(&meta_pkt[4..8], &2u32.to_le_bytes());

        let second = proc.process(&gradient(16, 8), &table, t0 + Duration::from_millis(50)).unwrap();
        assert!(!second.metadata_sent);
        assert!(meta.take_latest().is_none());

        let third = proc.process(&gradient(16, 8), &table, t0 + Duration::from_millis(100)).unwrap();
        assert!(third.metadata_sent);
        assert_eq!(proc.stats().metadata_packets, 2);
    }

    #[test]
    fn jpeg_rejects_two_channels() {
        let frame = Frame::new(2, 2, 2, vec![0; 8]).unwrap();
        assert!(encode_jpeg(&frame, 80, &mut Vec::new()).is_err());
    }

    #[test]
    fn stream_format_from_str() {
        assert_eq!("split".parse::<StreamFormat>().unwrap(), StreamFormat::Split);
        assert_eq!("Legacy".parse::<StreamFormat>().unwrap(), StreamFormat::Legacy);
        assert!("h264".parse::<StreamFormat>().is_err());
    }
}
