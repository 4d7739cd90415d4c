//! Callback delivery thread for push-style subscribers.
//!
//! The callback runs on its own named thread so a slow subscriber never
//! stalls the engine's producer or the caller. The thread exits once the
//! subscription is detached and its queue is drained.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use super::Subscription;
use crate::error::Result;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to a running delivery thread.
pub struct DeliveryThread {
    name: String,
    handle: JoinHandle<()>,
}

impl DeliveryThread {
    /// Spawn a thread that feeds every sample of `subscription` to `callback`.
    pub fn spawn<T, F>(stream: &str, subscription: Subscription<T>, mut callback: F) -> Result<Self>
    where
        T: Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        let name = format!("{}-delivery", stream);
        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            log::debug!("{} started", thread_name);
            loop {
                match subscription.recv_timeout(POLL_INTERVAL) {
                    Ok(sample) => {
                        if catch_unwind(AssertUnwindSafe(|| callback(sample))).is_err() {
                            log::error!("{} callback panicked, sample skipped", thread_name);
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            log::debug!("{} stopped", thread_name);
        })?;
        Ok(Self { name, handle })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the thread to finish. The subscription must already be
    /// detached or this blocks until it is.
    ///
    /// Called from the callback itself, the thread is left to exit on its
    /// own once the callback returns.
    pub fn join(self) {
        if self.is_current() {
            log::debug!("{} detached from its own callback", self.name);
            return;
        }
        if self.handle.join().is_err() {
            log::error!("{} terminated abnormally", self.name);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// True when called on the delivery thread.
    pub fn is_current(&self) -> bool {
        self.handle.thread().id() == thread::current().id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::StreamHub;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_callback_receives_samples_and_exits() {
        let hub = StreamHub::new("test", 16);
        hub.set_open(true);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = Arc::clone(&seen);
        let delivery = DeliveryThread::spawn("test", hub.subscribe(), move |v: usize| {
            seen_cb.fetch_add(v, Ordering::SeqCst);
        })
        .unwrap();

        for i in 1..=4 {
            hub.publish(i);
        }
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while seen.load(Ordering::SeqCst) < 10 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(seen.load(Ordering::SeqCst), 10);

        hub.unsubscribe();
        delivery.join();
    }

    #[test]
    fn test_panicking_callback_keeps_thread_alive() {
        let hub = StreamHub::new("test", 16);
        hub.set_open(true);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = Arc::clone(&seen);
        let delivery = DeliveryThread::spawn("test", hub.subscribe(), move |v: usize| {
            if v == 1 {
                panic!("bad sample");
            }
            seen_cb.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        hub.publish(1);
        hub.publish(2);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while seen.load(Ordering::SeqCst) < 1 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        hub.unsubscribe();
        delivery.join();
    }

    #[test]
    fn test_join_from_own_callback() {
        let hub = Arc::new(StreamHub::new("test", 16));
        hub.set_open(true);
        let slot: Arc<parking_lot::Mutex<Option<DeliveryThread>>> = Arc::default();
        let (tx, rx) = crossbeam_channel::unbounded();

        let hub_cb = Arc::clone(&hub);
        let slot_cb = Arc::clone(&slot);
        let delivery = DeliveryThread::spawn("test", hub.subscribe(), move |_: usize| {
            hub_cb.unsubscribe();
            let own = slot_cb.lock().take();
            if let Some(own) = own {
                let _ = tx.send(own.is_current());
                own.join();
            }
        })
        .unwrap();
        assert!(!delivery.is_current());
        *slot.lock() = Some(delivery);

        hub.publish(1);
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        // The callback returned, so the thread wound down by itself.
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap_err(),
            crossbeam_channel::RecvTimeoutError::Disconnected
        );
    }
}
