//! Process-wide stop signal
//!
//! The flag is polled by the zone pool threads once per tick; the watch
//! channel wakes the I/O loop and every connection task out of their
//! blocking waits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug)]
struct Inner {
    stopping: AtomicBool,
    notify: watch::Sender<bool>,
}

/// Cloneable handle to the stop flag
#[derive(Debug, Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (notify, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                stopping: AtomicBool::new(false),
                notify,
            }),
        }
    }

    /// Requests a stop from any thread
    ///
    /// Returns false if a stop was already in progress.
    pub fn trigger(&self) -> bool {
        if self.inner.stopping.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inner.notify.send_replace(true);
        true
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> StopListener {
        StopListener {
            rx: self.inner.notify.subscribe(),
        }
    }
}

/// Async side of [`Shutdown`], one per waiting task
#[derive(Debug)]
pub struct StopListener {
    rx: watch::Receiver<bool>,
}

impl StopListener {
    /// Completes once a stop has been requested
    ///
    /// Returns immediately if the stop happened before the call. Safe to
    /// use as a `select!` branch.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
