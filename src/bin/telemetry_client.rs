//! Telemetry client: connects to the vision server and prints each record.
//! Reconnects after a short pause whenever the link drops.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::info;

use marker_telemetry::logging;
use marker_telemetry::protocol::{self, TelemetryRecord};

#[derive(Debug, Parser)]
#[command(name = "telemetry_client", about = "Print telemetry from a vision server")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Stop after this many records (runs forever when omitted)
    #[arg(long)]
    count: Option<u64>,

    /// Seconds to wait before reconnecting
    #[arg(long, default_value_t = 2)]
    retry_secs: u64,
}

fn describe(record: &TelemetryRecord) -> String {
    let pose = record.marker_pose;
    let blob = record.blob_selection;
    let marker = if pose.is_found() {
        format!("{:7.2}° @ ({:.1}, {:.1})", pose.angle_degrees, pose.position.x, pose.position.y)
    } else {
        "none".to_string()
    };
    let ball = if blob.is_found() {
        format!("{:.1}px @ ({:.1}, {:.1})", blob.size_px, blob.position.x, blob.position.y)
    } else {
        "none".to_string()
    };
    format!(
        "[{}x{}] marker {} | ball {}",
        record.video_size.0, record.video_size.1, marker, ball
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init("telemetry_client")?;

    let addr = format!("{}:{}", args.host, args.port);
    let mut received: u64 = 0;

    // Main loop: connect, read, reconnect on error
    loop {
        info!("[tcp] connecting to {}...", addr);
        match tokio::net::TcpStream::connect(&addr).await {
            Ok(tcp) => {
                tcp.set_nodelay(true)?;
                info!("[tcp] connected");
                let mut stream = protocol::message_stream(tcp);
                loop {
                    match protocol::recv_record(&mut stream).await {
                        Ok(record) => {
                            received += 1;
                            println!("{}", describe(&record));
                            if args.count.is_some_and(|n| received >= n) {
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            info!("[tcp] session ended: {}", e);
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                info!("[tcp] connection failed: {}", e);
            }
        }
        info!("[tcp] reconnecting in {}s...", args.retry_secs);
        tokio::time::sleep(Duration::from_secs(args.retry_secs)).await;
    }
}
