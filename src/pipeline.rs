// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    error::Error,
    queue::{BoundedEvictingQueue, DEFAULT_OUTPUT_CAPACITY, DEFAULT_SOURCE_CAPACITY},
    registry::{RawChunk, SourceHandle, SourceRegistry},
    tlv::{DetectedObject, FrameDecoder, ResyncPolicy},
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{error, info};

/// One decoded object together with the capture time of the chunk it came
/// from.  This is the unit pushed to the output queue.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Detection {
    pub capture_time: f64,
    pub object: DetectedObject,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Capacity of each per-source raw chunk queue.
    pub source_capacity: usize,
    /// Capacity of the detection output queue.
    pub output_capacity: usize,
    /// Sleep between iterations that found no chunks.
    pub idle_sleep: Duration,
    pub resync: ResyncPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            source_capacity: DEFAULT_SOURCE_CAPACITY,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            idle_sleep: Duration::from_micros(500),
            resync: ResyncPolicy::default(),
        }
    }
}

/// Monotonic pipeline counters.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PipelineStats {
    pub chunks: u64,
    pub bytes: u64,
    pub detections: u64,
}

#[derive(Debug, Default)]
struct Counters {
    chunks: AtomicU64,
    bytes: AtomicU64,
    detections: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            chunks: self.chunks.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug)]
struct Worker {
    registry: Arc<SourceRegistry>,
    output: Arc<BoundedEvictingQueue<Detection>>,
    decoder: FrameDecoder,
    counters: Arc<Counters>,
}

impl Worker {
    fn run_once(&self) -> bool {
        let mut found = false;

        for (_, queue) in self.registry.active_queues() {
            for chunk in queue.drain_all() {
                found = true;
                self.decode_chunk(chunk);
            }
        }

        found
    }

    fn decode_chunk(&self, chunk: RawChunk) {
        let objects = self.decoder.decode(&chunk.data, chunk.source_id);

        self.counters.chunks.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes
            .fetch_add(chunk.data.len() as u64, Ordering::Relaxed);
        self.counters
            .detections
            .fetch_add(objects.len() as u64, Ordering::Relaxed);

        for object in objects {
            self.output.push(Detection {
                capture_time: chunk.capture_time,
                object,
            });
        }
    }

    fn run(self, running: Arc<AtomicBool>, idle_sleep: Duration) {
        info!(resync = ?self.decoder.resync(), "pipeline started");

        while running.load(Ordering::Acquire) {
            if !self.run_once() {
                thread::sleep(idle_sleep);
            }
        }

        let stats = self.counters.snapshot();
        info!(
            chunks = stats.chunks,
            bytes = stats.bytes,
            detections = stats.detections,
            "pipeline stopped"
        );
    }
}

/// Background task moving raw chunks from every active source through the
/// frame decoder into the output queue.
///
/// The pipeline polls: sources are filled by producers with their own
/// cadence and never signal the pipeline.  When an iteration finds no
/// chunks the thread sleeps for `idle_sleep`, otherwise it loops again
/// immediately.  Shutdown is cooperative and observed between iterations.
#[derive(Debug)]
pub struct IngestionPipeline {
    worker: Worker,
    idle_sleep: Duration,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Default for IngestionPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl IngestionPipeline {
    /// Creates a stopped pipeline with an empty source registry.
    pub fn new(config: PipelineConfig) -> IngestionPipeline {
        let registry = Arc::new(SourceRegistry::new(config.source_capacity));
        Self::with_registry(registry, config)
    }

    /// Creates a stopped pipeline draining an existing registry.
    /// `config.source_capacity` is ignored, the registry owns it.
    pub fn with_registry(registry: Arc<SourceRegistry>, config: PipelineConfig) -> IngestionPipeline {
        IngestionPipeline {
            worker: Worker {
                registry,
                output: Arc::new(BoundedEvictingQueue::new(config.output_capacity)),
                decoder: FrameDecoder::new(config.resync),
                counters: Arc::new(Counters::default()),
            },
            idle_sleep: config.idle_sleep,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn registry(&self) -> Arc<SourceRegistry> {
        self.worker.registry.clone()
    }

    /// Registers a source, see [`SourceRegistry::register`].
    pub fn register(&self, source_id: u32) -> SourceHandle {
        self.worker.registry.register(source_id)
    }

    /// See [`SourceRegistry::set_active`].
    pub fn set_active(&self, source_id: u32, active: bool) -> Result<(), Error> {
        self.worker.registry.set_active(source_id, active)
    }

    pub fn output(&self) -> Arc<BoundedEvictingQueue<Detection>> {
        self.worker.output.clone()
    }

    /// Removes and returns every buffered detection.
    pub fn drain_output(&self) -> Vec<Detection> {
        self.worker.output.drain_all()
    }

    /// Chunks evicted from the queue of `source_id`.
    pub fn dropped_count(&self, source_id: u32) -> Option<u64> {
        self.worker.registry.dropped_count(source_id)
    }

    /// Detections evicted from the output queue.
    pub fn dropped_count_output(&self) -> u64 {
        self.worker.output.dropped_count()
    }

    pub fn stats(&self) -> PipelineStats {
        self.worker.counters.snapshot()
    }

    /// Runs a single iteration on the calling thread.  Returns whether any
    /// chunk was found.
    pub fn run_once(&self) -> bool {
        self.worker.run_once()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Spawns the pipeline thread.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.thread.is_some() {
            return Err(Error::AlreadyRunning);
        }

        self.running.store(true, Ordering::Release);

        let worker = self.worker.clone();
        let running = self.running.clone();
        let idle_sleep = self.idle_sleep;

        match thread::Builder::new()
            .name("pipeline".to_string())
            .spawn(move || worker.run(running, idle_sleep))
        {
            Ok(handle) => {
                self.thread = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::Release);
                Err(err.into())
            }
        }
    }

    /// Signals the thread and waits for it to finish its current iteration.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);

        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("pipeline thread panicked");
            }
        }
    }
}

impl Drop for IngestionPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::{FrameBuilder, PointRecord};
    use std::time::Instant;

    fn frame(frame_number: u32, meters: &[i16]) -> Vec<u8> {
        meters
            .iter()
            .fold(FrameBuilder::new(frame_number), |builder, m| {
                builder.point(PointRecord {
                    x: m * 256,
                    ..Default::default()
                })
            })
            .xyz_q_format(8)
            .build()
    }

    fn config(output_capacity: usize) -> PipelineConfig {
        PipelineConfig {
            source_capacity: 16,
            output_capacity,
            idle_sleep: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_run_once() {
        let pipeline = IngestionPipeline::new(config(64));
        let handle = pipeline.register(2);

        assert!(!pipeline.run_once());

        let chunk = RawChunk {
            source_id: 2,
            capture_time: 12.5,
            data: frame(1, &[3, 4]),
        };
        handle.push_chunk(chunk);
        assert!(pipeline.run_once());
        assert!(!pipeline.run_once());

        let out = pipeline.drain_output();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].capture_time, 12.5);
        assert_eq!(out[0].object.source_id, 2);
        assert_eq!(out[0].object.range_cm, 300.0);
        assert_eq!(out[1].object.range_cm, 400.0);

        let stats = pipeline.stats();
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.detections, 2);
        assert_eq!(stats.bytes, frame(1, &[3, 4]).len() as u64);
    }

    #[test]
    fn test_chunk_without_frames() {
        let pipeline = IngestionPipeline::new(config(64));
        let handle = pipeline.register(0);
        handle.push(vec![0xFF; 100]);

        // Work was found even though nothing decoded.
        assert!(pipeline.run_once());
        assert!(pipeline.drain_output().is_empty());
        assert_eq!(pipeline.stats().chunks, 1);
    }

    #[test]
    fn test_inactive_not_drained() {
        let pipeline = IngestionPipeline::new(config(64));
        let handle = pipeline.register(0);
        pipeline.set_active(0, false).unwrap();

        handle.push(frame(1, &[2]));
        assert!(!pipeline.run_once());
        assert_eq!(handle.queue().size(), 1);

        pipeline.set_active(0, true).unwrap();
        assert!(pipeline.run_once());
        assert_eq!(pipeline.drain_output().len(), 1);
    }

    #[test]
    fn test_source_order() {
        let pipeline = IngestionPipeline::new(config(64));
        let second = pipeline.register(1);
        let first = pipeline.register(0);

        for n in 0..3 {
            first.push(frame(n, &[1]));
            second.push(frame(10 + n, &[1]));
        }
        pipeline.run_once();

        let out: Vec<_> = pipeline
            .drain_output()
            .iter()
            .map(|d| (d.object.source_id, d.object.frame_number))
            .collect();
        assert_eq!(
            out,
            vec![(0, 0), (0, 1), (0, 2), (1, 10), (1, 11), (1, 12)]
        );
    }

    #[test]
    fn test_output_overflow() {
        let pipeline = IngestionPipeline::new(config(2));
        let handle = pipeline.register(0);
        handle.push(frame(1, &[1, 2, 3]));
        pipeline.run_once();

        assert_eq!(pipeline.dropped_count_output(), 1);
        let out = pipeline.drain_output();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].object.range_cm, 200.0);
    }

    #[test]
    fn test_source_overflow() {
        let pipeline = IngestionPipeline::new(config(64));
        let handle = pipeline.register(5);
        for _ in 0..20 {
            handle.push(vec![0]);
        }
        assert_eq!(pipeline.dropped_count(5), Some(4));
        assert_eq!(pipeline.dropped_count(6), None);
    }

    #[test]
    fn test_thread_lifecycle() {
        let mut pipeline = IngestionPipeline::new(config(64));
        let handle = pipeline.register(0);

        pipeline.start().unwrap();
        assert!(pipeline.is_running());
        assert!(matches!(pipeline.start(), Err(Error::AlreadyRunning)));

        handle.push(frame(8, &[7]));

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        while out.is_empty() && Instant::now() < deadline {
            out.extend(pipeline.drain_output());
            thread::sleep(Duration::from_millis(1));
        }

        pipeline.stop();
        assert!(!pipeline.is_running());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].object.frame_number, 8);

        // Stopped pipelines leave new chunks alone and can be restarted.
        handle.push(frame(9, &[7]));
        thread::sleep(Duration::from_millis(10));
        assert_eq!(handle.queue().size(), 1);

        pipeline.start().unwrap();
        pipeline.stop();
        pipeline.stop();
    }
}
