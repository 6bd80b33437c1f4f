//! Table watchers
//!
//! A watcher is a per-subscriber filtered stream of table events with a
//! bounded buffer. When a subscriber falls behind, the oldest buffered event
//! is dropped: the table must stay live even if a consumer is stuck, and
//! periodic adverts re-converge any state lost to drops.

use crate::error::{RouterError, RouterResult};
use crate::event::Event;
use selkie_core::constants::DOMAIN_WILDCARD;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::trace;

/// Filter for a table watcher
#[derive(Debug, Clone, Default)]
pub struct WatchQuery {
    /// Only deliver events for this service; `None` or `"*"` for all
    pub service: Option<String>,
}

impl WatchQuery {
    /// Create a wildcard watch
    pub fn new() -> Self {
        Self::default()
    }

    /// Only deliver events for the given service
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Check whether an event for the given service passes the filter
    pub fn matches(&self, service: &str) -> bool {
        match &self.service {
            None => true,
            Some(want) => want == DOMAIN_WILDCARD || want == service,
        }
    }
}

/// Buffer state shared between a [`Watcher`] and the table
pub(crate) struct WatcherShared {
    buffer: Mutex<VecDeque<Event>>,
    capacity: usize,
    notify: Notify,
    stopped: AtomicBool,
}

impl WatcherShared {
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity >= 1);
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Enqueue an event, dropping the oldest entry on overflow
    pub(crate) fn push(&self, event: Event) {
        {
            let mut buffer = self.buffer.lock().expect("watcher buffer poisoned");
            if buffer.len() == self.capacity {
                let dropped = buffer.pop_front();
                if let Some(dropped) = dropped {
                    trace!(
                        service = %dropped.route.service,
                        "watcher buffer full, dropped oldest event"
                    );
                }
            }
            buffer.push_back(event);
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Event> {
        self.buffer
            .lock()
            .expect("watcher buffer poisoned")
            .pop_front()
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.notify.notify_waiters();
        }
    }
}

/// Filtered stream of table events
///
/// Obtained from [`Table::watch`](crate::Table::watch). Dropping the watcher
/// stops it.
pub struct Watcher {
    id: String,
    shared: Arc<WatcherShared>,
}

impl Watcher {
    pub(crate) fn new(id: String, shared: Arc<WatcherShared>) -> Self {
        Self { id, shared }
    }

    /// Identifier of this watcher
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Return the next event
    ///
    /// Buffered events are still delivered after [`stop`](Self::stop); the
    /// stream ends with [`RouterError::WatcherStopped`] once drained.
    pub async fn next(&self) -> RouterResult<Event> {
        loop {
            // Register interest before checking state so a push or stop
            // between the check and the await cannot be lost.
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(event) = self.shared.pop() {
                return Ok(event);
            }
            if self.shared.is_stopped() {
                return Err(RouterError::WatcherStopped);
            }

            notified.await;
        }
    }

    /// Stop the watcher; idempotent
    pub fn stop(&self) {
        self.shared.stop();
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.shared.stop();
    }
}
