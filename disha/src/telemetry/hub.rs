//! Single-stream fan-in point with one bounded subscription queue.
//!
//! A stream has two independent switches: *open* (the engine produces
//! samples) and *subscribed* (a queue exists to receive them). Samples are
//! discarded unless both are set. When the queue is full the oldest sample
//! is evicted so the producer never blocks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError, bounded};
use parking_lot::Mutex;
use serde::Serialize;

/// Per-stream delivery counters.
#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    discarded: AtomicU64,
}

/// Snapshot of a stream's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StreamStats {
    /// Samples enqueued for the subscriber.
    pub published: u64,
    /// Samples handed to the subscriber.
    pub delivered: u64,
    /// Samples evicted on queue overflow.
    pub dropped: u64,
    /// Samples thrown away because the stream was closed or unsubscribed.
    pub discarded: u64,
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Sample queued.
    Queued,
    /// Sample queued after evicting the oldest one.
    QueuedDroppingOldest,
    /// Stream closed or nobody subscribed.
    Discarded,
}

struct Slot<T> {
    tx: Sender<T>,
    /// Kept to evict the oldest sample on overflow.
    rx: Receiver<T>,
}

/// One telemetry stream.
pub struct StreamHub<T> {
    name: &'static str,
    capacity: usize,
    open: AtomicBool,
    slot: Mutex<Option<Slot<T>>>,
    counters: Arc<Counters>,
}

impl<T: Send + 'static> StreamHub<T> {
    /// Create a closed, unsubscribed stream.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            open: AtomicBool::new(false),
            slot: Mutex::new(None),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Set the open flag; returns true if it changed.
    pub fn set_open(&self, open: bool) -> bool {
        let changed = self.open.swap(open, Ordering::AcqRel) != open;
        if changed {
            log::info!("{} stream {}", self.name, if open { "opened" } else { "closed" });
        }
        changed
    }

    pub fn is_subscribed(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Attach the subscription queue, or return a handle on the existing one.
    pub fn subscribe(&self) -> Subscription<T> {
        let mut slot = self.slot.lock();
        let rx = match slot.as_ref() {
            Some(existing) => existing.rx.clone(),
            None => {
                let (tx, rx) = bounded(self.capacity);
                *slot = Some(Slot { tx, rx: rx.clone() });
                log::info!("{} stream subscribed (capacity {})", self.name, self.capacity);
                rx
            }
        };
        Subscription {
            rx,
            counters: Arc::clone(&self.counters),
        }
    }

    /// Detach the subscription queue; returns true if one existed.
    ///
    /// Outstanding handles drain what is left and then report disconnection.
    pub fn unsubscribe(&self) -> bool {
        let removed = self.slot.lock().take().is_some();
        if removed {
            log::info!("{} stream unsubscribed", self.name);
        }
        removed
    }

    /// Offer a sample. Never blocks.
    pub fn publish(&self, sample: T) -> PublishOutcome {
        if !self.is_open() {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return PublishOutcome::Discarded;
        }

        let slot = self.slot.lock();
        let Some(slot) = slot.as_ref() else {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return PublishOutcome::Discarded;
        };

        let mut outcome = PublishOutcome::Queued;
        let mut pending = sample;
        loop {
            match slot.tx.try_send(pending) {
                Ok(()) => break,
                Err(TrySendError::Full(back)) => {
                    if slot.rx.try_recv().is_ok() {
                        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                        log::debug!("{} queue full, dropped oldest sample", self.name);
                    }
                    outcome = PublishOutcome::QueuedDroppingOldest;
                    pending = back;
                }
                // Unreachable while the slot holds its own receiver.
                Err(TrySendError::Disconnected(_)) => {
                    self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                    return PublishOutcome::Discarded;
                }
            }
        }
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Receiving end of a stream subscription.
///
/// Clones share the same queue; each sample is delivered once.
pub struct Subscription<T> {
    rx: Receiver<T>,
    counters: Arc<Counters>,
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<T> Subscription<T> {
    /// Next sample without waiting.
    pub fn try_recv(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(sample) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                Some(sample)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next sample.
    ///
    /// Returns `Err(RecvTimeoutError::Disconnected)` once the stream was
    /// unsubscribed and the queue is empty.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let sample = self.rx.recv_timeout(timeout)?;
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(sample)
    }

    /// Take every queued sample, oldest first.
    pub fn drain(&self) -> Vec<T> {
        let samples: Vec<T> = self.rx.try_iter().collect();
        self.counters
            .delivered
            .fetch_add(samples.len() as u64, Ordering::Relaxed);
        samples
    }

    /// Samples currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
