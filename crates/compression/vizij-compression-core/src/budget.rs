//! Memory budget ledger for in-flight builds.
//!
//! Reservations are a single atomic check-and-add; the returned `Reservation`
//! subtracts its bytes exactly once when dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Ledger {
    reserved: AtomicU64,
    peak: AtomicU64,
}

/// Shared ledger; clones observe the same counters.
#[derive(Clone, Debug)]
pub struct MemoryBudget {
    limit: u64,
    ledger: Arc<Ledger>,
}

impl MemoryBudget {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            ledger: Arc::new(Ledger::default()),
        }
    }

    #[inline]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    #[inline]
    pub fn reserved(&self) -> u64 {
        self.ledger.reserved.load(Ordering::Acquire)
    }

    #[inline]
    pub fn available(&self) -> u64 {
        self.limit.saturating_sub(self.reserved())
    }

    /// Highest reserved total observed.
    pub fn peak(&self) -> u64 {
        self.ledger.peak.load(Ordering::Acquire)
    }

    /// Reserve `bytes` if the total stays within the limit.
    ///
    /// A request fits when `reserved + bytes <= limit`, so the ledger can be filled
    /// exactly. The scheduler's fallback condition is the complement: a build goes
    /// synchronous only when `reserved + bytes > limit`. This keeps the invariant
    /// `reserved <= limit` without leaving the last byte of the budget unusable.
    pub fn try_reserve(&self, bytes: u64) -> Option<Reservation> {
        let limit = self.limit;
        let prev = self
            .ledger
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                cur.checked_add(bytes).filter(|next| *next <= limit)
            })
            .ok()?;
        self.ledger.peak.fetch_max(prev + bytes, Ordering::AcqRel);
        Some(Reservation {
            ledger: self.ledger.clone(),
            bytes,
        })
    }
}

/// Bytes held against a `MemoryBudget`; released on drop.
#[derive(Debug)]
pub struct Reservation {
    ledger: Arc<Ledger>,
    bytes: u64,
}

impl Reservation {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Release now. Same as dropping.
    pub fn release(self) {}
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.ledger.reserved.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}
