// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use kanal::{AsyncReceiver, AsyncSender};
use radarlog::{
    error::Error,
    pipeline::{Detection, IngestionPipeline, PipelineConfig},
    sink::{format_detection, DetectionWriter},
    source::{ReplaySource, SourceWorker},
};
use std::{
    fs::File,
    io::BufWriter,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{error, info, info_span, instrument, warn};
use tracing_subscriber::{layer::SubscriberExt as _, Layer as _, Registry};
use tracy_client::{frame_mark, plot};

#[cfg(feature = "serial")]
use radarlog::source::SerialSource;

#[cfg(feature = "profiling")]
#[global_allocator]
static GLOBAL: tracy_client::ProfiledAllocator<std::alloc::System> =
    tracy_client::ProfiledAllocator::new(std::alloc::System, 100);

const DRAIN_INTERVAL: Duration = Duration::from_millis(10);

type Writer = (AsyncSender<Vec<Detection>>, JoinHandle<Result<u64, Error>>);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    args.tracy.then(tracy_client::Client::start);

    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(args.rust_log);

    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(args.rust_log)),
        Err(_) => None,
    };

    let tracy = match args.tracy {
        true => Some(tracing_tracy::TracyLayer::default().with_filter(args.rust_log)),
        false => None,
    };

    let subscriber = Registry::default()
        .with(stdout_log)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    if args.live.is_empty() && args.replay.is_empty() {
        return Err("at least one --live port or --replay file is required".into());
    }

    let mut pipeline = IngestionPipeline::new(PipelineConfig::from(&args));
    let mut workers = create_workers(&args, &pipeline)?;

    for id in &args.deactivate_radar {
        if let Err(err) = pipeline.set_active(*id, false) {
            warn!("cannot deactivate: {}", err);
        }
    }

    for id in &args.activate_radar {
        if let Err(err) = pipeline.set_active(*id, true) {
            warn!("cannot activate: {}", err);
        }
    }

    let writer = match &args.output {
        Some(path) => {
            let writer = DetectionWriter::create(path, args.format.into())?;
            info!("writing {} detections to {}", args.format, path.display());
            Some(spawn_writer(writer)?)
        }
        None => None,
    };
    let tx = writer.as_ref().map(|(tx, _)| tx.clone());

    pipeline.start()?;
    for worker in &mut workers {
        worker.start()?;
    }

    let mut perf = Perf::new();
    let stats_interval = Duration::from_secs(args.stats_interval);
    let mut drain = tokio::time::interval(DRAIN_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(err) = res {
                    error!("unable to listen for ctrl-c: {}", err);
                }
                info!("interrupted, shutting down");
                break;
            }
            _ = drain.tick() => {
                publish(pipeline.drain_output(), &args, tx.as_ref()).await;

                if !stats_interval.is_zero() && perf.last.elapsed() >= stats_interval {
                    perf.report(&pipeline);
                }

                if args.live.is_empty() && workers.iter().all(SourceWorker::is_finished) {
                    info!("all replays finished");
                    break;
                }
            }
        }
    }

    for worker in &mut workers {
        worker.stop();
    }
    pipeline.stop();

    // Chunks queued between the last iteration and the sources stopping.
    while pipeline.run_once() {}
    publish(pipeline.drain_output(), &args, tx.as_ref()).await;
    perf.report(&pipeline);

    drop(tx);
    if let Some((tx, thread)) = writer {
        drop(tx);
        match thread.join() {
            Ok(Ok(written)) => info!("wrote {} detections", written),
            Ok(Err(err)) => error!("detection writer failed: {}", err),
            Err(_) => error!("detection writer panicked"),
        }
    }

    Ok(())
}

/// Live ports take ids from 0, replays follow.  Replay files are opened
/// here so a missing file fails before anything starts.
fn create_workers(args: &Args, pipeline: &IngestionPipeline) -> Result<Vec<SourceWorker>, Error> {
    let mut workers = Vec::with_capacity(args.live.len() + args.replay.len());
    let mut id = 0;

    #[cfg(feature = "serial")]
    for port in &args.live {
        let source = SerialSource::new(port, args.baud);
        workers.push(SourceWorker::new(pipeline.register(id), Box::new(source)));
        id += 1;
    }

    #[cfg(not(feature = "serial"))]
    if !args.live.is_empty() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "live sources require the serial feature",
        )));
    }

    for path in &args.replay {
        let source = ReplaySource::open(path, args.speed, args.loop_replay)?;
        workers.push(SourceWorker::new(pipeline.register(id), Box::new(source)));
        id += 1;
    }

    info!(
        "{} live and {} replay sources registered",
        args.live.len(),
        args.replay.len()
    );

    Ok(workers)
}

fn spawn_writer(writer: DetectionWriter<BufWriter<File>>) -> Result<Writer, Error> {
    let (tx, rx) = kanal::bounded_async(64);

    let thread = thread::Builder::new()
        .name("writer".to_string())
        .spawn(move || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(writer_task(writer, rx))
        })?;

    Ok((tx, thread))
}

async fn writer_task(
    mut writer: DetectionWriter<BufWriter<File>>,
    rx: AsyncReceiver<Vec<Detection>>,
) -> Result<u64, Error> {
    while let Ok(batch) = rx.recv().await {
        let span = info_span!("write_batch", len = batch.len());
        let _guard = span.enter();
        writer.write_batch(&batch)?;
        writer.flush()?;
    }

    writer.flush()?;
    Ok(writer.written())
}

#[instrument(skip_all, fields(len = batch.len()))]
async fn publish(batch: Vec<Detection>, args: &Args, tx: Option<&AsyncSender<Vec<Detection>>>) {
    if batch.is_empty() {
        return;
    }

    args.tracy.then(|| plot!("detections", batch.len() as f64));

    if !args.no_console {
        for detection in &batch {
            println!("{}", format_detection(detection));
        }
    }

    if let Some(tx) = tx {
        if let Err(err) = tx.send(batch).await {
            error!("detection writer closed: {:?}", err);
        }
    }

    args.tracy.then(frame_mark);
}

struct Perf {
    last: Instant,
    detections: u64,
}

impl Perf {
    fn new() -> Perf {
        Perf {
            last: Instant::now(),
            detections: 0,
        }
    }

    fn report(&mut self, pipeline: &IngestionPipeline) {
        let stats = pipeline.stats();
        let elapsed = self.last.elapsed().as_secs_f64();
        let rate = match elapsed > 0.0 {
            true => (stats.detections - self.detections) as f64 / elapsed,
            false => 0.0,
        };

        let dropped = pipeline
            .registry()
            .source_ids()
            .into_iter()
            .map(|id| format!("R{}={}", id, pipeline.dropped_count(id).unwrap_or(0)))
            .collect::<Vec<_>>()
            .join(" ");

        info!(
            "[PERF] {:.1} detections/s, {} detections from {} chunks ({} bytes), dropped chunks: {}, dropped detections: {}",
            rate,
            stats.detections,
            stats.chunks,
            stats.bytes,
            dropped,
            pipeline.dropped_count_output()
        );

        self.last = Instant::now();
        self.detections = stats.detections;
    }
}
