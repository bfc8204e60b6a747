use std::collections::VecDeque;
use std::sync::Mutex;

use common::model::Reading;
use tracing::warn;

/// Bounded FIFO between sensor read tasks and the flush task. Enqueue and
/// drain are mutually exclusive; overflow evicts the oldest unsent readings.
pub struct ReadingBuffer {
    queue: Mutex<VecDeque<Reading>>,
    capacity: usize,
}

impl ReadingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Append readings in order, evicting the oldest entries past capacity.
    /// Returns the number dropped.
    pub fn push(&self, readings: Vec<Reading>) -> usize {
        let mut queue = self.lock();
        let mut dropped = 0;
        for reading in readings {
            if queue.len() == self.capacity {
                queue.pop_front();
                dropped += 1;
            }
            queue.push_back(reading);
        }
        drop(queue);
        if dropped > 0 {
            warn!("Outgoing buffer full, dropped {} oldest readings", dropped);
        }
        dropped
    }

    /// Take every buffered reading, oldest first.
    pub fn drain(&self) -> Vec<Reading> {
        self.lock().drain(..).collect()
    }

    /// Return an undelivered batch to the front of the queue, preserving
    /// order. Overflow drops the oldest entries first.
    pub fn requeue(&self, batch: Vec<Reading>) -> usize {
        let mut queue = self.lock();
        for reading in batch.into_iter().rev() {
            queue.push_front(reading);
        }
        let mut dropped = 0;
        while queue.len() > self.capacity {
            queue.pop_front();
            dropped += 1;
        }
        drop(queue);
        if dropped > 0 {
            warn!("Outgoing buffer full, dropped {} oldest readings", dropped);
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Reading>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
