// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
};

/// Default capacity of a per-source raw chunk queue.
pub const DEFAULT_SOURCE_CAPACITY: usize = 30000;

/// Default capacity of the decoded detection queue.
pub const DEFAULT_OUTPUT_CAPACITY: usize = 5000;

/// Thread-safe FIFO with a fixed capacity which evicts the oldest element
/// instead of blocking or rejecting a push.
///
/// Eviction is the overload policy: every evicted element increments a
/// monotonic drop counter which operators are expected to monitor.
#[derive(Debug)]
pub struct BoundedEvictingQueue<T> {
    buffer: Mutex<VecDeque<T>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl<T> BoundedEvictingQueue<T> {
    /// Creates an empty queue.  A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> BoundedEvictingQueue<T> {
        let capacity = capacity.max(1);
        BoundedEvictingQueue {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// The lock is only held for O(1) deque operations, so a poisoned lock
    /// still guards a consistent deque and is recovered.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends `item`, evicting the head first when the queue is full.
    pub fn push(&self, item: T) {
        let mut buffer = self.lock();
        if buffer.len() >= self.capacity {
            buffer.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        buffer.push_back(item);
    }

    /// Removes and returns every buffered element in insertion order.
    pub fn drain_all(&self) -> Vec<T> {
        let drained = std::mem::take(&mut *self.lock());
        Vec::from(drained)
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of elements evicted since creation.  Never reset.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
