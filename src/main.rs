//! ghostream-viewer - headless viewer for Ghostream-style streaming servers

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use ghostream_viewer::rtc::{InboundTrack, MediaSink};
use ghostream_viewer::{
    SignalingEndpoint, StreamRequest, ViewerConfig, ViewerSession, WebRtcTransportFactory,
};

/// Log a line every this many received video packets
const PACKET_LOG_INTERVAL: u64 = 500;

#[derive(Parser)]
#[command(name = "ghostream-viewer")]
#[command(about = "Headless WebRTC viewer for Ghostream-style streaming servers")]
#[command(version)]
struct Cli {
    /// Server origin or signaling URL (e.g., https://stream.example.org)
    #[arg(short, long)]
    server: String,

    /// Name of the stream to watch
    #[arg(long, default_value = "demo")]
    stream: String,

    /// Requested quality tier
    #[arg(short, long, default_value = "source")]
    quality: String,

    /// STUN/TURN server URL (repeatable, overrides the config file)
    #[arg(long)]
    stun: Vec<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Drains inbound video RTP and reports throughput
struct PacketLogSink;

impl MediaSink for PacketLogSink {
    fn attach(&self, track: InboundTrack) {
        info!(
            "Attached {} track {} of stream {}",
            track.kind, track.track_id, track.stream_id
        );

        let Some(remote) = track.remote else {
            return;
        };

        tokio::spawn(async move {
            let mut packets: u64 = 0;
            let mut bytes: u64 = 0;
            loop {
                match remote.read_rtp().await {
                    Ok((packet, _)) => {
                        packets += 1;
                        bytes += packet.payload.len() as u64;
                        if packets % PACKET_LOG_INTERVAL == 0 {
                            info!("Received {} video packets ({} bytes)", packets, bytes);
                        }
                    }
                    Err(e) => {
                        info!("Video track ended after {} packets: {}", packets, e);
                        break;
                    }
                }
            }
        });
    }
}

fn build_config(cli: &Cli) -> Result<ViewerConfig> {
    let mut config = match &cli.config {
        Some(path) => ViewerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ViewerConfig::default(),
    };

    config.signaling = SignalingEndpoint::parse(&cli.server)?;
    if !cli.stun.is_empty() {
        config.stun_servers = cli.stun.clone();
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let config = build_config(&cli)?;
    info!("Signaling endpoint: {}", config.signaling);

    let session = ViewerSession::new(
        config,
        Arc::new(WebRtcTransportFactory),
        Arc::new(PacketLogSink),
        |indicator| info!("Connection indicator: {}", indicator),
    );
    let handle = session.start(StreamRequest::new(cli.stream, cli.quality));

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
    }

    info!("Shutting down...");
    handle.shutdown().await;
    Ok(())
}
