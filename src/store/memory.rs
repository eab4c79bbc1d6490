use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{Clock, InstanceStore, LedgerObservation, StoreDocument, SystemClock, UsageLedger};
use crate::accounting::UsageInterval;
use crate::core::vm::InstanceRecord;
use crate::errors::{AccountingResult, SnapshotResult};

#[derive(Debug, Default)]
struct StoreState {
    intervals: HashMap<String, Vec<UsageInterval>>,
    instances: HashMap<String, InstanceRecord>,
}

/// Process-local ledger and instance store. The write methods stand in for
/// the fleet manager that owns instance lifecycles.
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            clock,
        }
    }

    /// Builds a store from an exported document. Repeated interval ids keep
    /// their first copy; repeated instance ids keep the last record.
    pub fn from_document(document: StoreDocument, clock: Arc<dyn Clock>) -> AccountingResult<Self> {
        let mut state = StoreState::default();
        let mut seen = HashSet::new();
        for interval in document.intervals {
            interval.validate()?;
            if !seen.insert(interval.id) {
                debug!(interval_id = %interval.id, "Skipping repeated usage interval");
                continue;
            }
            state
                .intervals
                .entry(interval.owner_identity.clone())
                .or_default()
                .push(interval);
        }
        for instance in document.instances {
            state.instances.insert(instance.id.clone(), instance);
        }
        Ok(Self {
            state: RwLock::new(state),
            clock,
        })
    }

    pub async fn record_interval(&self, interval: UsageInterval) -> AccountingResult<Uuid> {
        interval.validate()?;
        let id = interval.id;
        let mut state = self.state.write().await;
        state
            .intervals
            .entry(interval.owner_identity.clone())
            .or_default()
            .push(interval);
        Ok(id)
    }

    /// Opens a reservation for `owner` starting now.
    pub async fn open_interval(&self, owner: &str, vm_id: Option<&str>) -> Uuid {
        let mut interval = UsageInterval::open(owner, self.clock.now());
        if let Some(vm_id) = vm_id {
            interval = interval.with_vm(vm_id);
        }
        let id = interval.id;
        debug!(interval_id = %id, owner, "Opened usage interval");
        self.state
            .write()
            .await
            .intervals
            .entry(owner.to_string())
            .or_default()
            .push(interval);
        id
    }

    /// Closes the open interval `id` at the current time. Returns the closed
    /// interval, or `None` when it is unknown or already closed.
    pub async fn close_interval(&self, id: Uuid) -> Option<UsageInterval> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let interval = state
            .intervals
            .values_mut()
            .flat_map(|intervals| intervals.iter_mut())
            .find(|interval| interval.id == id && interval.is_open())?;
        // A clock that lags the start stamp must not produce a malformed interval
        interval.end_time = Some(now.max(interval.start_time));
        debug!(interval_id = %id, owner = %interval.owner_identity, "Closed usage interval");
        Some(interval.clone())
    }

    pub async fn upsert_instance(&self, record: InstanceRecord) {
        self.state
            .write()
            .await
            .instances
            .insert(record.id.clone(), record);
    }

    pub async fn remove_instance(&self, id: &str) -> Option<InstanceRecord> {
        self.state.write().await.instances.remove(id)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl UsageLedger for InMemoryStore {
    async fn observe(&self, owner: &str) -> AccountingResult<LedgerObservation> {
        let state = self.state.read().await;
        let observed_at = self.clock.now();
        let intervals = state.intervals.get(owner).cloned().unwrap_or_default();
        Ok(LedgerObservation {
            observed_at,
            intervals,
        })
    }
}

#[async_trait]
impl InstanceStore for InMemoryStore {
    async fn list_instances(&self) -> SnapshotResult<Vec<InstanceRecord>> {
        Ok(self.state.read().await.instances.values().cloned().collect())
    }

    async fn get_instance(&self, id: &str) -> SnapshotResult<Option<InstanceRecord>> {
        Ok(self.state.read().await.instances.get(id).cloned())
    }
}
