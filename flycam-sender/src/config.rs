//! Configuration for the sender binary.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use flycam_core::codec::{BitWidths, CompressionKind};
use flycam_core::error::FlycamError;
use flycam_core::pipeline::{DEFAULT_METADATA_FIELDS, PipelineConfig, StreamFormat};
use flycam_core::types::TimestampUnit;
use flycam_core::wire::MetadataField;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlycamConfig {
    /// Frame geometry, bit depth and pacing.
    pub stream: StreamConfig,
    /// Payload compression for the packed format.
    pub compression: CompressionConfig,
    /// Camera metadata fields and timers.
    pub metadata: MetadataConfig,
    /// Where frames come from.
    pub source: SourceConfig,
    /// Push destinations.
    pub network: NetworkConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Process lifecycle.
    pub runtime: RuntimeConfig,
}

/// Stream shape and format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    /// Bits kept per channel, 1..=8 each; the length is the channel count.
    pub channel_bits: Vec<u8>,
    pub target_fps: u32,
    /// Packet timestamp unit: "seconds" or "millis".
    pub timestamp: String,
    /// "legacy" (packed bitstream + metadata table) or "split" (JPEG).
    pub format: String,
    /// JPEG quality for the split format.
    pub jpeg_quality: u8,
}

/// Payload compression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// "lz4", "zstd" or "none". The receiver must agree.
    pub codec: String,
    /// zstd level, or LZ4 acceleration (<= 1 for the default mode).
    pub level: i32,
}

/// Metadata table settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Field names, at most 8 ASCII characters each.
    pub fields: Vec<String>,
    /// Minimum time between camera metadata queries.
    pub refresh_interval_ms: u64,
    /// Minimum time between metadata packets in the split format.
    pub send_interval_ms: u64,
}

/// Frame source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// "synthetic" or "file".
    pub kind: String,
    /// Raw frame file for `kind = "file"`.
    pub path: String,
    /// Rate the source is read at; 0 follows `stream.target_fps`.
    pub fps: u32,
    /// Frames per synthetic loop.
    pub loop_frames: u64,
}

/// Push destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Receiver of video (or legacy) packets.
    pub video_addr: String,
    /// Receiver of split-format metadata packets.
    pub metadata_addr: String,
    /// Local address the sending sockets bind to.
    pub bind_addr: String,
    /// Largest datagram sent, chunk header included.
    pub mtu: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// How often throughput is logged.
    pub throughput_interval_ms: u64,
}

/// Process lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Bounded wait for worker threads on shutdown.
    pub shutdown_timeout_ms: u64,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            channel_bits: BitWidths::default().as_slice().to_vec(),
            target_fps: 30,
            timestamp: "seconds".into(),
            format: "legacy".into(),
            jpeg_quality: 80,
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: "lz4".into(),
            level: 0,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            fields: DEFAULT_METADATA_FIELDS.iter().map(|s| s.to_string()).collect(),
            refresh_interval_ms: 5_000,
            send_interval_ms: 1_000,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: "synthetic".into(),
            path: String::new(),
            fps: 0,
            loop_frames: 256,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            video_addr: "127.0.0.1:5555".into(),
            metadata_addr: "127.0.0.1:5556".into(),
            bind_addr: "0.0.0.0:0".into(),
            mtu: 1400,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            throughput_interval_ms: 1_000,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 2_000,
        }
    }
}

// ── SourceKind ───────────────────────────────────────────────────

/// Which frame source to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Moving test pattern.
    Synthetic,
    /// Raw frames read from `source.path`, looped.
    File,
}

impl FromStr for SourceKind {
    type Err = FlycamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "synthetic" | "debug" => Ok(SourceKind::Synthetic),
            "file" | "raw" => Ok(SourceKind::File),
            other => Err(FlycamError::InvalidConfig(format!(
                "unknown source kind {other:?} (expected synthetic or file)"
            ))),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl FlycamConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults; a file that exists but does not
    /// parse is an error.
    pub fn load(path: &Path) -> Result<Self, FlycamError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| {
                FlycamError::InvalidConfig(format!("{}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config at {}; using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        std::fs::write(path, Self::default_toml()?)
    }

    /// The default configuration as pretty TOML.
    pub fn default_toml() -> std::io::Result<String> {
        toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)
    }

    /// Check every section. Called once at startup; nothing is clamped.
    pub fn validate(&self) -> Result<(), FlycamError> {
        self.to_pipeline_config()?;
        self.video_addr()?;
        self.bind_addr()?;
        if self.stream_format()? == StreamFormat::Split {
            self.metadata_addr()?;
        }
        if self.network.mtu <= flycam_core::transport::ChunkHeader::SIZE {
            return Err(FlycamError::InvalidConfig(format!(
                "network.mtu {} leaves no room for data",
                self.network.mtu
            )));
        }
        if self.source_kind()? == SourceKind::File && self.source.path.is_empty() {
            return Err(FlycamError::InvalidConfig(
                "source.kind = \"file\" needs source.path".into(),
            ));
        }
        Ok(())
    }

    /// Translate into the pipeline's configuration.
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig, FlycamError> {
        let widths = BitWidths::new(self.stream.channel_bits.clone())?;
        let metadata_fields = self
            .metadata
            .fields
            .iter()
            .map(|name| MetadataField::new(name))
            .collect::<Result<Vec<_>, _>>()?;

        let config = PipelineConfig {
            width: self.stream.width,
            height: self.stream.height,
            widths,
            target_fps: self.stream.target_fps,
            timestamp: TimestampUnit::from_str(&self.stream.timestamp)?,
            format: self.stream_format()?,
            compression: CompressionKind::from_str(&self.compression.codec)?,
            compression_level: self.compression.level,
            jpeg_quality: self.stream.jpeg_quality,
            metadata_fields,
            metadata_refresh: Duration::from_millis(self.metadata.refresh_interval_ms),
            metadata_send_interval: Duration::from_millis(self.metadata.send_interval_ms),
            throughput_interval: Duration::from_millis(self.logging.throughput_interval_ms),
            shutdown_timeout: Duration::from_millis(self.runtime.shutdown_timeout_ms),
            max_frames: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn stream_format(&self) -> Result<StreamFormat, FlycamError> {
        StreamFormat::from_str(&self.stream.format)
    }

    pub fn source_kind(&self) -> Result<SourceKind, FlycamError> {
        SourceKind::from_str(&self.source.kind)
    }

    pub fn source_path(&self) -> PathBuf {
        PathBuf::from(&self.source.path)
    }

    /// Rate the source is read at.
    pub fn source_fps(&self) -> u32 {
        if self.source.fps == 0 {
            self.stream.target_fps
        } else {
            self.source.fps
        }
    }

    pub fn video_addr(&self) -> Result<SocketAddr, FlycamError> {
        parse_addr("network.video_addr", &self.network.video_addr)
    }

    pub fn metadata_addr(&self) -> Result<SocketAddr, FlycamError> {
        parse_addr("network.metadata_addr", &self.network.metadata_addr)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, FlycamError> {
        parse_addr("network.bind_addr", &self.network.bind_addr)
    }
}

fn parse_addr(key: &str, value: &str) -> Result<SocketAddr, FlycamError> {
    value
        .parse()
        .map_err(|e| FlycamError::InvalidConfig(format!("{key} = {value:?}: {e}")))
}

// ── Tests ────────────────────────────────────────────────────────
