//! # flycam-core
//!
//! Adaptive bit-depth frame codec and low-latency streaming pipeline.
//!
//! This crate contains:
//! - **Codec**: truncating quantization, MSB-first variable-width bit
//!   packing, the fused single-pass path and optional block compression
//! - **Wire**: the fixed-header packet framer, the split video/metadata
//!   framers and the 256-slot metadata table
//! - **Pipeline**: capture thread, single-slot frame handoff, metadata
//!   cache, per-frame processor and throughput accounting
//! - **Transport**: latest-wins push sockets over chunked UDP datagrams
//! - **Error**: `FlycamError`, a typed `thiserror`-based error enum

pub mod codec;
pub mod error;
pub mod pipeline;
pub mod transport;
pub mod types;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{
    BitWidths, CompressionKind, Compressor, Lz4Compressor, ZstdCompressor, expand, pack,
    pack_into, quantize, quantize_and_pack, quantize_and_pack_into, unpack,
};
pub use error::FlycamError;
pub use pipeline::{
    CapturePipeline, CaptureSource, FrameProcessor, FrameSlot, MetadataCache, MetadataSource,
    PipelineConfig, PipelineHandle, PipelineReport, RawFileSource, StreamFormat,
    SyntheticMetadata, SyntheticSource,
};
pub use transport::{LatestSender, MemorySocket, PacketReceiver, PushSocket};
pub use types::{Frame, QuantizedFrame, TimestampUnit};
pub use wire::{
    LegacyFramer, LegacyPacket, MetadataField, MetadataFramer, MetadataTable, VideoFramer,
};
