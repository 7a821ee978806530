// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    common::capture_time,
    error::Error,
    queue::{BoundedEvictingQueue, DEFAULT_SOURCE_CAPACITY},
};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};
use tracing::{info, warn};

/// Bytes read from a source in one go.  Chunk boundaries carry no meaning,
/// the decoder resynchronises on the frame marker.
#[derive(Clone, Debug, PartialEq)]
pub struct RawChunk {
    pub source_id: u32,
    /// Wall-clock capture time in seconds since the UNIX epoch.
    pub capture_time: f64,
    pub data: Vec<u8>,
}

impl RawChunk {
    /// Wraps `data` with the current wall-clock time.
    pub fn new(source_id: u32, data: Vec<u8>) -> RawChunk {
        RawChunk {
            source_id,
            capture_time: capture_time(),
            data,
        }
    }
}

/// Producer side of a registered source.
#[derive(Clone, Debug)]
pub struct SourceHandle {
    source_id: u32,
    queue: Arc<BoundedEvictingQueue<RawChunk>>,
    active: Arc<AtomicBool>,
}

impl SourceHandle {
    pub fn source_id(&self) -> u32 {
        self.source_id
    }

    /// Queues `data` stamped with the current time.
    pub fn push(&self, data: Vec<u8>) {
        self.queue.push(RawChunk::new(self.source_id, data));
    }

    pub fn push_chunk(&self, chunk: RawChunk) {
        self.queue.push(chunk);
    }

    /// Sources are expected to stop producing while inactive.  The pipeline
    /// does not drain inactive sources either way.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn queue(&self) -> &Arc<BoundedEvictingQueue<RawChunk>> {
        &self.queue
    }
}

#[derive(Debug)]
struct Entry {
    queue: Arc<BoundedEvictingQueue<RawChunk>>,
    active: Arc<AtomicBool>,
}

/// Radar sources known to the pipeline, each with its own queue and
/// liveness flag.
#[derive(Debug)]
pub struct SourceRegistry {
    capacity: usize,
    entries: RwLock<BTreeMap<u32, Entry>>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_CAPACITY)
    }
}

impl SourceRegistry {
    /// Creates an empty registry whose queues hold `capacity` chunks.
    pub fn new(capacity: usize) -> SourceRegistry {
        SourceRegistry {
            capacity,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<u32, Entry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<u32, Entry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers `source_id` with a fresh, active queue.  Registering an id
    /// twice replaces the previous queue; handles to the old queue keep
    /// working but are no longer drained.
    pub fn register(&self, source_id: u32) -> SourceHandle {
        let queue = Arc::new(BoundedEvictingQueue::new(self.capacity));
        let active = Arc::new(AtomicBool::new(true));

        let previous = self.write().insert(
            source_id,
            Entry {
                queue: queue.clone(),
                active: active.clone(),
            },
        );
        if previous.is_some() {
            warn!("radar {} registered twice, replacing its queue", source_id);
        }

        SourceHandle {
            source_id,
            queue,
            active,
        }
    }

    /// Enables or disables draining of `source_id`.  Buffered chunks are
    /// kept, subject to normal eviction.
    pub fn set_active(&self, source_id: u32, active: bool) -> Result<(), Error> {
        match self.read().get(&source_id) {
            Some(entry) => {
                entry.active.store(active, Ordering::Release);
                info!(
                    "radar {} {}",
                    source_id,
                    if active { "activated" } else { "deactivated" }
                );
                Ok(())
            }
            None => Err(Error::UnknownSource(source_id)),
        }
    }

    pub fn is_active(&self, source_id: u32) -> Option<bool> {
        self.read()
            .get(&source_id)
            .map(|entry| entry.active.load(Ordering::Acquire))
    }

    pub fn dropped_count(&self, source_id: u32) -> Option<u64> {
        self.read()
            .get(&source_id)
            .map(|entry| entry.queue.dropped_count())
    }

    /// Snapshot of the queues the pipeline should drain, in source id
    /// order.
    pub fn active_queues(&self) -> Vec<(u32, Arc<BoundedEvictingQueue<RawChunk>>)> {
        self.read()
            .iter()
            .filter(|(_, entry)| entry.active.load(Ordering::Acquire))
            .map(|(id, entry)| (*id, entry.queue.clone()))
            .collect()
    }

    pub fn source_ids(&self) -> Vec<u32> {
        self.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
