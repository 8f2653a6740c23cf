//! Capture → process → push service.
//!
//! Runs two named OS threads that share nothing but a [`FrameSlot`]:
//!
//! 1. **capture** reads frames from a [`CaptureSource`] and replaces
//!    whatever the slot holds.
//! 2. **process** pops the newest frame, refreshes the [`MetadataCache`]
//!    when due, hands the frame to the [`FrameProcessor`] and paces itself
//!    to the target frame rate.
//!
//! Both threads observe a shared `running` flag between iterations.
//! [`PipelineHandle::shutdown`] joins them with a bounded wait.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::codec::{BitWidths, CompressionKind};
use crate::error::FlycamError;
use crate::pipeline::cache::MetadataCache;
use crate::pipeline::processor::{FrameProcessor, ProcessorStats, StreamFormat};
use crate::pipeline::slot::FrameSlot;
use crate::pipeline::source::{CaptureSource, DEFAULT_METADATA_FIELDS, MetadataSource};
use crate::pipeline::throughput::ThroughputMeter;
use crate::transport::PushSocket;
use crate::types::TimestampUnit;
use crate::wire::{METADATA_SLOTS, MetadataField};

/// How long the processing thread waits on an empty slot before it
/// re-checks the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Pause after a failed read from a source that sets no frame rate.
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Consecutive capture failures between repeated warnings.
const ERROR_LOG_EVERY: u64 = 100;

// ── PipelineConfig ───────────────────────────────────────────────

/// Everything the pipeline needs, fixed at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Per-channel bit widths; also fixes the channel count.
    pub widths: BitWidths,
    /// Processing loop rate (1..=240).
    pub target_fps: u32,
    /// Unit of the 32-bit packet timestamp.
    pub timestamp: TimestampUnit,
    pub format: StreamFormat,
    /// Payload compressor for the legacy format.
    pub compression: CompressionKind,
    /// zstd level, or LZ4 acceleration.
    pub compression_level: i32,
    /// JPEG quality for the split format (1..=100).
    pub jpeg_quality: u8,
    pub metadata_fields: Vec<MetadataField>,
    /// Minimum time between metadata queries.
    pub metadata_refresh: Duration,
    /// Minimum time between split-format metadata packets.
    pub metadata_send_interval: Duration,
    /// How often throughput is logged.
    pub throughput_interval: Duration,
    /// Bounded wait when joining the worker threads.
    pub shutdown_timeout: Duration,
    /// Stop after this many processed frames.
    pub max_frames: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            widths: BitWidths::default(),
            target_fps: 30,
            timestamp: TimestampUnit::Seconds,
            format: StreamFormat::Legacy,
            compression: CompressionKind::Lz4,
            compression_level: 0,
            jpeg_quality: 80,
            metadata_fields: DEFAULT_METADATA_FIELDS
                .iter()
                .filter_map(|name| MetadataField::new(name).ok())
                .collect(),
            metadata_refresh: Duration::from_secs(5),
            metadata_send_interval: Duration::from_secs(1),
            throughput_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(2),
            max_frames: None,
        }
    }
}

impl PipelineConfig {
    /// Reject configurations that cannot produce a valid stream.
    pub fn validate(&self) -> Result<(), FlycamError> {
        if self.width == 0 || self.height == 0 {
            return Err(FlycamError::InvalidConfig(format!(
                "frame dimensions must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !(1..=240).contains(&self.target_fps) {
            return Err(FlycamError::InvalidConfig(format!(
                "target_fps must be in 1..=240, got {}",
                self.target_fps
            )));
        }
        let packed = self
            .widths
            .packed_len(self.width as usize, self.height as usize);
        if u32::try_from(packed).is_err() {
            return Err(FlycamError::InvalidConfig(format!(
                "a {}x{} frame packs to {packed} bytes, beyond the 32-bit length field",
                self.width, self.height
            )));
        }
        if self.metadata_fields.len() > METADATA_SLOTS {
            return Err(FlycamError::InvalidConfig(format!(
                "{} metadata fields configured, the table holds {METADATA_SLOTS}",
                self.metadata_fields.len()
            )));
        }
        if self.format == StreamFormat::Split {
            if !(1..=100).contains(&self.jpeg_quality) {
                return Err(FlycamError::InvalidConfig(format!(
                    "jpeg_quality must be in 1..=100, got {}",
                    self.jpeg_quality
                )));
            }
            if !matches!(self.widths.channels(), 1 | 3) {
                return Err(FlycamError::InvalidConfig(format!(
                    "split format encodes JPEG and needs 1 or 3 channels, got {}",
                    self.widths.channels()
                )));
            }
        }
        Ok(())
    }

    /// Channel count implied by the bit widths.
    pub fn channels(&self) -> u8 {
        self.widths.channels() as u8
    }

    /// Target time per processed frame.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }
}

// ── PipelineReport ───────────────────────────────────────────────

/// Capture-thread counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Frames read from the source.
    pub frames: u64,
    /// Times a finite source was rewound.
    pub restarts: u64,
    /// Reads that failed and were skipped.
    pub errors: u64,
}

/// Final counters after shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub capture: CaptureStats,
    pub processor: ProcessorStats,
    /// Frames replaced in the slot before processing.
    pub dropped: u64,
    /// Metadata refresh attempts.
    pub metadata_refreshes: u64,
    /// Frames that failed to encode or frame.
    pub process_errors: u64,
    /// Whether both threads finished within the shutdown timeout.
    pub clean: bool,
}

// ── CapturePipeline ──────────────────────────────────────────────

/// Builder that validates the configuration and spawns the threads.
pub struct CapturePipeline {
    config: PipelineConfig,
}

impl CapturePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, FlycamError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Spawn the capture and processing threads.
    ///
    /// Everything that can fail on bad configuration (metadata table,
    /// framers, compressor) is built before any thread starts.
    pub fn start<C, M>(
        self,
        source: C,
        metadata: M,
        video_out: Arc<dyn PushSocket>,
        metadata_out: Arc<dyn PushSocket>,
    ) -> Result<PipelineHandle, FlycamError>
    where
        C: CaptureSource + 'static,
        M: MetadataSource + 'static,
    {
        let config = self.config;
        let cache = MetadataCache::new(config.metadata_fields.clone(), config.metadata_refresh)?;
        let processor = FrameProcessor::new(&config, cache.table(), video_out, metadata_out)?;

        let slot = Arc::new(FrameSlot::new());
        let running = Arc::new(AtomicBool::new(true));

        info!(
            source = %source.describe(),
            width = config.width,
            height = config.height,
            bits = ?config.widths.as_slice(),
            format = %config.format,
            compression = %config.compression,
            fps = config.target_fps,
            "pipeline starting"
        );

        let capture = {
            let slot = Arc::clone(&slot);
            let running = Arc::clone(&running);
            let expected = (config.width, config.height, config.channels());
            thread::Builder::new()
                .name("flycam-capture".to_string())
                .spawn(move || capture_loop(source, expected, &slot, &running))
                .map_err(|e| FlycamError::Other(format!("failed to spawn capture thread: {e}")))?
        };

        let process = {
            let worker_slot = Arc::clone(&slot);
            let worker_running = Arc::clone(&running);
            let worker = ProcessWorker {
                processor,
                cache,
                metadata,
                meter: ThroughputMeter::new(config.throughput_interval),
                frame_interval: config.frame_interval(),
                max_frames: config.max_frames,
                errors: 0,
            };
            let spawned = thread::Builder::new()
                .name("flycam-process".to_string())
                .spawn(move || worker.run(&worker_slot, &worker_running));
            match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    running.store(false, Ordering::SeqCst);
                    slot.close();
                    return Err(FlycamError::Other(format!(
                        "failed to spawn processing thread: {e}"
                    )));
                }
            }
        };

        Ok(PipelineHandle {
            running,
            slot,
            capture: Some(capture),
            process: Some(process),
            shutdown_timeout: config.shutdown_timeout,
        })
    }
}

// ── PipelineHandle ───────────────────────────────────────────────

/// Control handle for a running pipeline.
pub struct PipelineHandle {
    running: Arc<AtomicBool>,
    slot: Arc<FrameSlot>,
    capture: Option<JoinHandle<CaptureStats>>,
    process: Option<JoinHandle<ProcessOutcome>>,
    shutdown_timeout: Duration,
}

impl PipelineHandle {
    /// A cloneable flag; storing `false` asks both threads to stop.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Signal both threads to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.slot.close();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// True once the processing thread has exited, e.g. after
    /// `max_frames`.
    pub fn is_finished(&self) -> bool {
        self.process.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Frames replaced in the slot so far.
    pub fn dropped(&self) -> u64 {
        self.slot.dropped()
    }

    /// Stop and join both threads, waiting at most the configured
    /// shutdown timeout. Threads still running after that are detached.
    pub fn shutdown(mut self) -> PipelineReport {
        self.stop();
        let deadline = Instant::now() + self.shutdown_timeout;

        let capture = join_until(self.capture.take(), deadline, "capture");
        let process = join_until(self.process.take(), deadline, "process");
        let clean = capture.is_some() && process.is_some();

        let process = process.unwrap_or_default();
        let report = PipelineReport {
            capture: capture.unwrap_or_default(),
            processor: process.stats,
            dropped: self.slot.dropped(),
            metadata_refreshes: process.refreshes,
            process_errors: process.errors,
            clean,
        };
        info!(
            frames = report.processor.frames,
            dropped = report.dropped,
            bytes = report.processor.bytes,
            clean,
            "pipeline stopped"
        );
        report
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_until<T>(handle: Option<JoinHandle<T>>, deadline: Instant, name: &str) -> Option<T> {
    let handle = handle?;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(thread = name, "thread did not stop in time, detaching");
            return None;
        }
        thread::sleep(Duration::from_millis(5));
    }
    match handle.join() {
        Ok(value) => Some(value),
        Err(_) => {
            error!(thread = name, "thread panicked");
            None
        }
    }
}

// ── Capture thread ───────────────────────────────────────────────

fn capture_loop<C: CaptureSource>(
    mut source: C,
    expected: (u32, u32, u8),
    slot: &FrameSlot,
    running: &AtomicBool,
) -> CaptureStats {
    let mut stats = CaptureStats::default();
    let interval = source.frame_interval();
    let mut failing = 0u64;

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        let failure = match source.read_frame() {
            Ok(frame) if (frame.width, frame.height, frame.channels) != expected => Some(format!(
                "frame is {}x{}x{}, expected {}x{}x{}",
                frame.width, frame.height, frame.channels, expected.0, expected.1, expected.2
            )),
            Ok(frame) => {
                stats.frames += 1;
                slot.push_or_replace(frame);
                None
            }
            Err(FlycamError::EndOfStream) => {
                stats.restarts += 1;
                debug!(source = %source.describe(), "end of stream, restarting");
                if let Err(e) = source.restart() {
                    error!("source restart failed, stopping capture: {e}");
                    break;
                }
                continue;
            }
            Err(e) => Some(e.to_string()),
        };

        match failure {
            Some(reason) => {
                stats.errors += 1;
                failing += 1;
                if failing == 1 || failing % ERROR_LOG_EVERY == 0 {
                    warn!(failing, "capture failed, skipping frame: {reason}");
                }
            }
            None if failing > 0 => {
                debug!(failing, "capture recovered");
                failing = 0;
            }
            None => {}
        }

        match interval {
            Some(interval) => pace(started, interval),
            None if failing > 0 => thread::sleep(ERROR_BACKOFF),
            None => {}
        }
    }

    // Wake the processing thread if capture ends on its own.
    slot.close();
    debug!(frames = stats.frames, restarts = stats.restarts, "capture thread exiting");
    stats
}

// ── Processing thread ────────────────────────────────────────────

#[derive(Default)]
struct ProcessOutcome {
    stats: ProcessorStats,
    refreshes: u64,
    errors: u64,
}

struct ProcessWorker<M> {
    processor: FrameProcessor,
    cache: MetadataCache,
    metadata: M,
    meter: ThroughputMeter,
    frame_interval: Duration,
    max_frames: Option<u64>,
    errors: u64,
}

impl<M: MetadataSource> ProcessWorker<M> {
    fn run(mut self, slot: &FrameSlot, running: &AtomicBool) -> ProcessOutcome {
        while running.load(Ordering::SeqCst) {
            let started = Instant::now();
            let Some(frame) = slot.pop_timeout(POLL_INTERVAL) else {
                if slot.is_closed() {
                    break;
                }
                continue;
            };

            let now = Instant::now();
            let table = self.cache.refresh_if_due(now, &mut self.metadata);
            match self.processor.process(&frame, table, now) {
                Ok(outcome) => {
                    if let Some(report) = self.meter.record_at(now, outcome.bytes) {
                        info!(
                            "{:.1} KB/s  {:.1} fps  ({} dropped)",
                            report.kib_per_sec(),
                            report.frames_per_sec,
                            slot.dropped()
                        );
                    }
                }
                Err(e) => {
                    self.errors += 1;
                    warn!("frame skipped: {e}");
                }
            }

            if self
                .max_frames
                .is_some_and(|max| self.processor.stats().frames >= max)
            {
                info!(frames = self.processor.stats().frames, "frame limit reached");
                running.store(false, Ordering::SeqCst);
                break;
            }
            pace(started, self.frame_interval);
        }

        slot.close();
        ProcessOutcome {
            stats: self.processor.stats(),
            refreshes: self.cache.refreshes(),
            errors: self.errors,
        }
    }
}

/// Sleep for the remainder of the frame interval.
fn pace(started: Instant, interval: Duration) {
    let elapsed = started.elapsed();
    if elapsed < interval {
        thread::sleep(interval - elapsed);
    }
}

// ── Tests ────────────────────────────────────────────────────────
