pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::accounting::UsageInterval;
use crate::core::vm::InstanceRecord;
use crate::errors::{AccountingResult, SnapshotResult};

pub use file::{FileStore, ImportSummary, StoreDocument};
pub use memory::InMemoryStore;

/// Source of "now" for open intervals.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Millisecond resolution.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        self.millis.store(instant.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// What the ledger held for one owner at one instant. `observed_at` is taken
/// while the intervals are read, so open/closed and "now" always agree.
#[derive(Debug, Clone)]
pub struct LedgerObservation {
    pub observed_at: DateTime<Utc>,
    pub intervals: Vec<UsageInterval>,
}

#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Every interval recorded for `owner` (exact match), open or closed.
    /// An owner with no history yields an empty observation.
    async fn observe(&self, owner: &str) -> AccountingResult<LedgerObservation>;
}

#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn list_instances(&self) -> SnapshotResult<Vec<InstanceRecord>>;

    async fn get_instance(&self, id: &str) -> SnapshotResult<Option<InstanceRecord>>;
}
