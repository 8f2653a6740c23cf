//! Capture → encode → push pipeline.
//!
//! | Module       | Purpose                                                 |
//! |--------------|---------------------------------------------------------|
//! | `slot`       | Single-slot, overwrite-on-full frame handoff             |
//! | `source`     | `CaptureSource` / `MetadataSource` and shipped sources   |
//! | `cache`      | Interval-gated metadata cache                           |
//! | `processor`  | Per-frame encode, framing and submit                    |
//! | `throughput` | Bytes/s and frames/s accounting for log lines           |
//! | `service`    | Capture and processing threads, start / stop / join     |

pub mod cache;
pub mod processor;
pub mod service;
pub mod slot;
pub mod source;
pub mod throughput;

pub use cache::MetadataCache;
pub use processor::{FrameOutcome, FrameProcessor, ProcessorStats, StreamFormat, encode_jpeg};
pub use service::{
    CapturePipeline, CaptureStats, PipelineConfig, PipelineHandle, PipelineReport,
};
pub use slot::FrameSlot;
pub use source::{
    CaptureSource, DEFAULT_METADATA_FIELDS, MetadataSource, NoMetadata, RawFileSource,
    SyntheticMetadata, SyntheticSource,
};
pub use throughput::{ThroughputMeter, ThroughputReport};
