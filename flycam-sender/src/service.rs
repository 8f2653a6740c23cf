//! Sender service core logic.
//!
//! Builds the frame source and the UDP push sockets from the loaded
//! configuration, runs the capture pipeline, and stops it on request or
//! once a frame limit is reached.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use flycam_core::pipeline::{
    CapturePipeline, CaptureSource, MetadataSource, NoMetadata, PipelineConfig, PipelineReport,
    RawFileSource, StreamFormat, SyntheticMetadata, SyntheticSource,
};
use flycam_core::transport::{LatestSender, PushSocket};

use crate::config::{FlycamConfig, SourceKind};

/// How often `run` checks the stop flag and the worker threads.
const STOP_POLL: Duration = Duration::from_millis(50);

// ── SenderService ────────────────────────────────────────────────

/// The top-level sender service.
pub struct SenderService {
    config: FlycamConfig,
    max_frames: Option<u64>,
    running: Arc<AtomicBool>,
}

impl SenderService {
    pub fn new(config: FlycamConfig) -> Self {
        Self {
            config,
            max_frames: None,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Stop after this many processed frames.
    pub fn with_max_frames(mut self, frames: Option<u64>) -> Self {
        self.max_frames = frames;
        self
    }

    /// Storing `false` into the returned flag stops `run`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run until stopped or until the frame limit is reached.
    ///
    /// 1. Validates the configuration; nothing starts on a bad value.
    /// 2. Binds one latest-wins UDP sender per destination.
    /// 3. Starts the capture and processing threads.
    /// 4. Joins them with a bounded wait once asked to stop.
    pub async fn run(&self) -> Result<PipelineReport, Box<dyn std::error::Error + Send + Sync>> {
        self.config.validate()?;
        let mut pipeline_config = self.config.to_pipeline_config()?;
        pipeline_config.max_frames = self.max_frames;

        let bind = self.config.bind_addr()?;
        let mtu = self.config.network.mtu;
        let video = Arc::new(LatestSender::bind(bind, self.config.video_addr()?, mtu).await?);
        let metadata = match pipeline_config.format {
            // A fixed `bind_addr` port belongs to the video socket.
            StreamFormat::Split => Arc::new(
                LatestSender::bind(SocketAddr::new(bind.ip(), 0), self.config.metadata_addr()?, mtu)
                    .await?,
            ),
            StreamFormat::Legacy => Arc::clone(&video),
        };
        info!("pushing video to {}", video.remote_addr());
        if pipeline_config.format == StreamFormat::Split {
            info!("pushing metadata to {}", metadata.remote_addr());
        }

        let (source, metadata_source) = self.build_source(&pipeline_config)?;
        let video_out: Arc<dyn PushSocket> = video.clone();
        let metadata_out: Arc<dyn PushSocket> = metadata.clone();
        let handle = CapturePipeline::new(pipeline_config)?.start(
            source,
            metadata_source,
            video_out,
            metadata_out,
        )?;

        while self.running.load(Ordering::SeqCst) && !handle.is_finished() {
            tokio::time::sleep(STOP_POLL).await;
        }

        let report = tokio::task::spawn_blocking(move || handle.shutdown()).await?;

        let stats = video.stats();
        info!(
            sent = stats.sent,
            replaced = stats.replaced,
            failed = stats.failed,
            bytes = stats.bytes_sent,
            "video transport stopped"
        );
        video.close();
        metadata.close();

        Ok(report)
    }

    fn build_source(
        &self,
        pipeline: &PipelineConfig,
    ) -> Result<(Box<dyn CaptureSource>, Box<dyn MetadataSource>), Box<dyn std::error::Error + Send + Sync>>
    {
        let (width, height, channels) = (pipeline.width, pipeline.height, pipeline.channels());
        let fps = self.config.source_fps();
        match self.config.source_kind()? {
            SourceKind::Synthetic => {
                let source = SyntheticSource::new(width, height, channels)?
                    .with_loop_len(self.config.source.loop_frames.max(1))
                    .with_fps(fps);
                Ok((Box::new(source), Box::new(SyntheticMetadata::new())))
            }
            SourceKind::File => {
                let source = RawFileSource::open(self.config.source_path(), width, height, channels)?
                    .with_fps(fps);
                Ok((Box::new(source), Box::new(NoMetadata)))
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use flycam_core::transport::PacketReceiver;
    use flycam_core::wire::LegacyPacket;

    async fn receiver() -> PacketReceiver {
        PacketReceiver::bind("127.0.0.1:0".parse().unwrap()).await.unwrap()
    }

    fn small_config(video: &PacketReceiver) -> FlycamConfig {
        let mut cfg = FlycamConfig::default();
        cfg.stream.width = 32;
        cfg.stream.height = 24;
        cfg.stream.target_fps = 60;
        cfg.network.bind_addr = "127.0.0.1:0".into();
        cfg.network.video_addr = video.local_addr().unwrap().to_string();
        cfg
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn synthetic_run_stops_at_frame_limit() {
        let mut rx = receiver().await;
        let service = SenderService::new(small_config(&rx)).with_max_frames(Some(5));
        let run = tokio::spawn(async move { service.run().await.map_err(|e| e.to_string()) });

        let bytes = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout")
            .unwrap();
        let pkt = LegacyPacket::parse(&bytes).unwrap();
        assert_eq!((pkt.width, pkt.height), (32, 24));

        let report = run.await.unwrap().unwrap();
        assert!(report.clean);
        assert_eq!(report.processor.frames, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn file_source_loops() {
        let rx = receiver().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.raw");
        // Two 32x24 RGB frames.
        std::fs::write(&path, vec![0x80u8; 32 * 24 * 3 * 2]).unwrap();

        let mut cfg = small_config(&rx);
        cfg.source.kind = "file".into();
        cfg.source.path = path.display().to_string();
        cfg.compression.codec = "none".into();

        let report = SenderService::new(cfg)
            .with_max_frames(Some(6))
            .run()
            .await
            .unwrap();
        assert_eq!(report.processor.frames, 6);
        assert!(report.capture.restarts >= 1);
        // No camera behind a file source: the table is zero-filled once.
        assert_eq!(report.metadata_refreshes, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_handle_ends_run() {
        let rx = receiver().await;
        let service = SenderService::new(small_config(&rx));
        let stop = service.stop_handle();
        let run = tokio::spawn(async move { service.run().await.map_err(|e| e.to_string()) });

        tokio::time::sleep(Duration::from_millis(150)).await;
        stop.store(false, Ordering::SeqCst);
        let report = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run did not stop")
            .unwrap()
            .unwrap();
        assert!(report.clean);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn split_format_with_fixed_bind_port() {
        let mut video_rx = receiver().await;
        let mut meta_rx = receiver().await;
        let port = std::net::UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let mut cfg = small_config(&video_rx);
        cfg.stream.format = "split".into();
        cfg.network.bind_addr = format!("127.0.0.1:{port}");
        cfg.network.metadata_addr = meta_rx.local_addr().unwrap().to_string();

        let service = SenderService::new(cfg).with_max_frames(Some(5));
        let run = tokio::spawn(async move { service.run().await.map_err(|e| e.to_string()) });

        for rx in [&mut video_rx, &mut meta_rx] {
            tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timeout")
                .unwrap();
        }
        let report = run.await.unwrap().unwrap();
        assert_eq!(report.processor.frames, 5);
        assert!(report.processor.metadata_packets >= 1);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_start() {
        let mut cfg = FlycamConfig::default();
        cfg.stream.channel_bits = vec![5, 9, 6];
        assert!(SenderService::new(cfg).run().await.is_err());
    }
}
