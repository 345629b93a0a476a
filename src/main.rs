//! Vision server: detects an ArUco marker and a ball in camera frames and
//! streams the result to a single TCP consumer every cycle.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;

use marker_telemetry::camera::OpenCvCamera;
use marker_telemetry::config::Config;
use marker_telemetry::logging;
use marker_telemetry::server::{ServerSettings, TcpTransport, TelemetryServer};
use marker_telemetry::vision::{ArucoMarkerDetector, BlobWindow, OpenCvBlobDetector, VisionPipeline};

const CONFIG_PATH: &str = "vision_server.toml";

#[derive(Debug, Parser)]
#[command(name = "vision_server", version = env!("GIT_VERSION"), about = "Marker/ball telemetry server")]
struct Args {
    /// TOML config file (defaults apply when missing)
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// Camera index
    #[arg(long)]
    camera: Option<i32>,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(long)]
    port: Option<u16>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(index) = self.camera {
            config.camera.index = index;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_path = logging::init("vision_server")?;

    let mut config = Config::load_or_default(&args.config)?;
    args.apply(&mut config);

    info!("Vision Server ({})", env!("GIT_VERSION"));
    info!("Log: {}", log_path.display());
    info!(
        "[config] addr={}, cadence={}ms, camera={}, dictionary={}, blob=({}, {})",
        config.server.addr(),
        config.server.cadence_ms,
        config.camera.index,
        config.marker.dictionary,
        config.blob.min_size,
        config.blob.max_size
    );

    let camera = OpenCvCamera::from_config(&config.camera)?;
    let markers = ArucoMarkerDetector::new(&config.marker.dictionary)?;
    let blobs = OpenCvBlobDetector::new(&config.blob.detector)?;
    let pipeline = VisionPipeline::new(camera, markers, blobs, BlobWindow::from_config(&config.blob));

    let transport = TcpTransport::bind(config.server.addr())
        .await
        .with_context(|| format!("failed to bind {}", config.server.addr()))?;
    info!("[tcp] listening on {}", transport.local_addr()?);

    let mut server = TelemetryServer::new(pipeline, transport, ServerSettings::from_config(&config.server));

    tokio::select! {
        _ = server.run() => {}
        r = tokio::signal::ctrl_c() => {
            if let Err(e) = r {
                error!("[signal] {}", e);
            }
            info!("Shutting down...");
        }
    }
    server.shutdown().await;
    Ok(())
}
