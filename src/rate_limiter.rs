//! Quota-aware rate limiter for Gmail API
//!
//! Gmail meters each user at 250 quota units per second. The thread and label
//! endpoints used by the cleanup pipeline cost:
//! - `threads.list`, `threads.get`, `threads.modify`, `threads.trash`: 10 units
//! - `threads.delete`: 20 units
//! - `labels.list`: 1 unit, `labels.create`: 5 units
//!
//! The limiter is a token bucket shared by every client built in the process,
//! so the read-scope and write-scope clients draw from the same budget.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Gmail API quota costs for the calls this crate issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCost {
    ThreadsList,
    ThreadsGet,
    ThreadsModify,
    ThreadsTrash,
    ThreadsDelete,
    LabelsList,
    LabelsCreate,
}

impl QuotaCost {
    /// Get the quota unit cost for this operation type
    pub fn units(&self) -> u32 {
        match self {
            QuotaCost::ThreadsList
            | QuotaCost::ThreadsGet
            | QuotaCost::ThreadsModify
            | QuotaCost::ThreadsTrash => 10,
            QuotaCost::ThreadsDelete => 20,
            QuotaCost::LabelsList => 1,
            QuotaCost::LabelsCreate => 5,
        }
    }
}

/// Token bucket over Gmail quota units
#[derive(Debug, Clone)]
pub struct QuotaRateLimiter {
    inner: Arc<Mutex<BucketState>>,
}

#[derive(Debug)]
struct BucketState {
    available_units: f64,
    max_units: f64,
    refill_rate: f64,
    last_refill: Instant,
    total_consumed: u64,
    total_operations: u64,
}

impl BucketState {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.available_units = (self.available_units + elapsed * self.refill_rate).min(self.max_units);
        self.last_refill = now;
    }

    fn take(&mut self, units: f64) -> bool {
        if self.available_units < units {
            return false;
        }
        self.available_units -= units;
        self.total_consumed += units as u64;
        self.total_operations += 1;
        true
    }
}

impl QuotaRateLimiter {
    /// Limiter with Gmail's per-user default: 250 units/s, 500 unit burst
    pub fn new() -> Self {
        Self::with_config(250.0, 500.0)
    }

    /// Create a rate limiter with custom refill rate and burst capacity
    pub fn with_config(refill_rate: f64, max_units: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BucketState {
                available_units: max_units,
                max_units,
                refill_rate,
                last_refill: Instant::now(),
                total_consumed: 0,
                total_operations: 0,
            })),
        }
    }

    /// Consume quota for one call, sleeping until the bucket can cover it
    pub async fn acquire(&self, cost: QuotaCost) {
        let units_needed = cost.units() as f64;

        loop {
            let wait_time = {
                let mut state = self.inner.lock().await;
                state.refill();

                trace!(
                    "Quota state: {:.1}/{:.1} units available, requesting {:.0}",
                    state.available_units,
                    state.max_units,
                    units_needed
                );

                if state.take(units_needed) {
                    return;
                }

                let deficit = units_needed - state.available_units;
                Duration::from_secs_f64(deficit / state.refill_rate)
            };

            debug!(
                "Quota exhausted, waiting {:.2}s for {:?}",
                wait_time.as_secs_f64(),
                cost
            );
            tokio::time::sleep(wait_time).await;
        }
    }

    /// Consume quota only if it is available right now
    pub async fn try_acquire(&self, cost: QuotaCost) -> bool {
        let mut state = self.inner.lock().await;
        state.refill();
        state.take(cost.units() as f64)
    }

    /// Get current statistics about quota usage
    pub async fn stats(&self) -> QuotaStats {
        let mut state = self.inner.lock().await;
        state.refill();
        QuotaStats {
            available_units: state.available_units as u32,
            max_units: state.max_units as u32,
            total_consumed: state.total_consumed,
            total_operations: state.total_operations,
        }
    }
}

impl Default for QuotaRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about quota usage
#[derive(Debug, Clone)]
pub struct QuotaStats {
    pub available_units: u32,
    pub max_units: u32,
    pub total_consumed: u64,
    pub total_operations: u64,
}
