//! I/O abstraction layer
//!
//! TigerStyle: All time access goes through an abstraction trait.
//!
//! Route liveness, advert timestamps, and every loop in the engine depend on
//! the clock. Business logic never calls `std::time::SystemTime::now()`
//! directly; it takes a [`TimeProvider`] so the same code runs against the
//! wall clock in production and against [`MockClock`] in tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Time provider abstraction
///
/// # Implementations
///
/// - [`WallClockTime`]: production, uses the system clock
/// - [`MockClock`]: tests, manually advanced
#[async_trait]
pub trait TimeProvider: Send + Sync + std::fmt::Debug {
    /// Get current time in milliseconds since epoch
    fn now_ms(&self) -> u64;

    /// Sleep for the specified duration
    ///
    /// In production: actual tokio::time::sleep.
    /// In tests: advances mock time, returns immediately.
    async fn sleep_ms(&self, ms: u64);
}

/// Production time provider using the wall clock
#[derive(Debug, Clone, Default)]
pub struct WallClockTime;

impl WallClockTime {
    /// Create a new wall clock time provider
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TimeProvider for WallClockTime {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
    }
}

/// Mock clock for testing
///
/// Time only moves when the test advances it, which makes TTL expiry
/// assertions exact instead of sleep-and-hope.
#[derive(Debug)]
pub struct MockClock {
    time_ms: AtomicU64,
}

impl MockClock {
    /// Create a new mock clock at the given time
    pub fn new(initial_ms: u64) -> Self {
        Self {
            time_ms: AtomicU64::new(initial_ms),
        }
    }

    /// Advance time by the given milliseconds
    pub fn advance(&self, ms: u64) {
        self.time_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Set time to a specific value
    pub fn set(&self, ms: u64) {
        self.time_ms.store(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl TimeProvider for MockClock {
    fn now_ms(&self) -> u64 {
        self.time_ms.load(Ordering::SeqCst)
    }

    async fn sleep_ms(&self, ms: u64) {
        // In mock, just advance time
        self.advance(ms);
    }
}
