//! Time utilities for ProofNest.
//!
//! All timestamps are Unix epoch microseconds (u64). Chains read time
//! through the [`Clock`] trait so tests can drive it explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Return the current wall-clock time as microseconds since Unix epoch.
///
/// A clock set before 1970 reads as 0, which any non-empty chain rejects.
pub fn now_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Convert microseconds to an RFC 3339 string with a `Z` suffix.
pub fn micros_to_rfc3339(micros: u64) -> String {
    let secs = (micros / 1_000_000) as i64;
    let nsecs = ((micros % 1_000_000) * 1000) as u32;
    let dt = chrono::DateTime::from_timestamp(secs, nsecs).unwrap_or(chrono::DateTime::UNIX_EPOCH);
    dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Source of timestamps for new records.
pub trait Clock: Send + Sync {
    /// Current time in microseconds since Unix epoch.
    fn now_micros(&self) -> u64;
}

/// Wall clock that never repeats or goes backwards within a process.
///
/// Two readings inside the same microsecond are separated by bumping the
/// later one by 1µs. A wall clock that steps backwards yields `last + 1`
/// until real time catches up.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        let wall = now_micros();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Clock under explicit control. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading `start` microseconds.
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Set the reading to an arbitrary value (including backwards).
    pub fn set(&self, micros: u64) {
        self.now.store(micros, Ordering::SeqCst);
    }

    /// Move the reading forward by `micros`.
    pub fn advance(&self, micros: u64) {
        self.now.fetch_add(micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
