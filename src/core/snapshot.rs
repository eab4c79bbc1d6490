use std::sync::Arc;
use tracing::debug;

use super::vm::{InstanceRecord, VMSnapshot, VMStatus};
use crate::errors::{SnapshotError, SnapshotResult};
use crate::store::InstanceStore;
use crate::with_context;

/// Exact-match filter; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotFilter {
    pub node: Option<String>,
    pub group_id: Option<String>,
    pub owner: Option<String>,
    pub state: Option<VMStatus>,
}

impl SnapshotFilter {
    pub fn matches(&self, record: &InstanceRecord) -> bool {
        self.node.as_ref().map_or(true, |node| *node == record.node)
            && self
                .group_id
                .as_ref()
                .map_or(true, |group| record.group_id.as_ref() == Some(group))
            && self
                .owner
                .as_ref()
                .map_or(true, |owner| *owner == record.caller_identity)
            && self.state.map_or(true, |state| state == record.state)
    }
}

/// Builds [`VMSnapshot`]s from whatever the instance store holds right now.
#[derive(Clone)]
pub struct SnapshotProjector {
    store: Arc<dyn InstanceStore>,
}

impl SnapshotProjector {
    pub fn new(store: Arc<dyn InstanceStore>) -> Self {
        Self { store }
    }

    pub async fn list_snapshots(&self, filter: &SnapshotFilter) -> SnapshotResult<Vec<VMSnapshot>> {
        let mut records = with_context!(self.store.list_instances().await, "list_snapshots")?;
        records.retain(|record| filter.matches(record));
        records.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        debug!(count = records.len(), filter = ?filter, "Projected VM snapshots");
        Ok(records.iter().map(VMSnapshot::from).collect())
    }

    pub async fn get_snapshot(&self, id: &str) -> SnapshotResult<VMSnapshot> {
        let record = with_context!(self.store.get_instance(id).await, "get_snapshot")?;
        record
            .as_ref()
            .map(VMSnapshot::from)
            .ok_or_else(|| SnapshotError::NotFound { vm_id: id.to_string() })
    }
}
