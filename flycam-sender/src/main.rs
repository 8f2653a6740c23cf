//! flycam sender — entry point.
//!
//! ```text
//! flycam-sender                    Run with flycam.toml (or defaults)
//! flycam-sender --config <path>    Load a custom config TOML
//! flycam-sender --gen-config       Write default config to stdout
//! flycam-sender --source file --path frames.raw
//! flycam-sender --frames 300       Stop after 300 frames
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use flycam_sender::config::FlycamConfig;
use flycam_sender::service::SenderService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "flycam-sender", about = "Adaptive bit-depth frame sender")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "flycam.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Override `source.kind` ("synthetic" or "file").
    #[arg(long)]
    source: Option<String>,

    /// Override `source.path`.
    #[arg(long)]
    path: Option<PathBuf>,

    /// Override `network.video_addr`.
    #[arg(long)]
    video_addr: Option<String>,

    /// Stop after this many frames.
    #[arg(long)]
    frames: Option<u64>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    if cli.gen_config {
        println!("{}", FlycamConfig::default_toml()?);
        return Ok(());
    }

    let mut config = FlycamConfig::load(&cli.config)?;
    if let Some(kind) = cli.source {
        config.source.kind = kind;
    }
    if let Some(path) = cli.path {
        config.source.path = path.display().to_string();
    }
    if let Some(addr) = cli.video_addr {
        config.network.video_addr = addr;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.validate()?;

    info!("flycam-sender v{}", env!("CARGO_PKG_VERSION"));
    info!("source: {}", config.source.kind);
    info!(
        "stream: {}x{} bits {:?} @ {} fps, {} format, {} compression",
        config.stream.width,
        config.stream.height,
        config.stream.channel_bits,
        config.stream.target_fps,
        config.stream.format,
        config.compression.codec
    );

    let service = SenderService::new(config).with_max_frames(cli.frames);
    let stop = service.stop_handle();

    let stop_clone = stop.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop_clone.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    let report = service.run().await?;
    info!(
        "sent {} frames ({} dropped, {} errors)",
        report.processor.frames, report.dropped, report.process_errors
    );

    Ok(())
}
