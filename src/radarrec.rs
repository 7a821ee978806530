// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use chrono::Local;
use clap::Parser;
use log::{debug, info, warn};
use radarlog::{
    registry::SourceRegistry,
    source::{SerialSource, SourceWorker, DEFAULT_BAUD},
};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::PathBuf,
    time::{Duration, Instant},
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Record raw radar data for later replay", long_about = None)]
struct Args {
    /// Serial port of the radar data stream
    #[arg(default_value = "/dev/ttyACM1")]
    port: String,

    /// Serial baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Directory receiving the recording
    #[arg(short, long, default_value = "data")]
    out: PathBuf,

    /// Stop after this many seconds
    #[arg(short = 't', long)]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    fs::create_dir_all(&args.out)?;
    let path = args.out.join(format!(
        "radar_{}.bin",
        Local::now().format("%Y-%m-%d_%H-%M-%S")
    ));
    let mut file = BufWriter::new(File::create(&path)?);
    info!("recording {} to {}", args.port, path.display());

    let registry = SourceRegistry::default();
    let handle = registry.register(0);
    let source = SerialSource::new(&args.port, args.baud);
    let mut worker = SourceWorker::new(handle.clone(), Box::new(source));
    worker.start()?;

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut tick = tokio::time::interval(Duration::from_millis(50));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut bytes = 0;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                debug!("interrupted");
                break;
            }
            _ = tick.tick() => {
                for chunk in handle.queue().drain_all() {
                    file.write_all(&chunk.data)?;
                    bytes += chunk.data.len();
                }

                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    break;
                }
            }
        }
    }

    worker.stop();
    for chunk in handle.queue().drain_all() {
        file.write_all(&chunk.data)?;
        bytes += chunk.data.len();
    }
    file.flush()?;

    let dropped = handle.queue().dropped_count();
    if dropped > 0 {
        warn!("{} chunks dropped, the recording has gaps", dropped);
    }
    info!("recorded {} bytes to {}", bytes, path.display());

    Ok(())
}
