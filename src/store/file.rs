use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Clock, InstanceStore, LedgerObservation, SystemClock, UsageLedger};
use crate::accounting::UsageInterval;
use crate::core::vm::InstanceRecord;
use crate::errors::{AccountingError, AccountingResult, SnapshotError, SnapshotResult};

/// On-disk layout shared by the ledger and the instance store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub intervals: Vec<UsageInterval>,
    #[serde(default)]
    pub instances: Vec<InstanceRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub intervals_added: usize,
    pub intervals_skipped: usize,
    pub instances_added: usize,
    pub instances_skipped: usize,
}

/// JSON file exported by the fleet manager. Every query re-reads the file,
/// so one query always works from one consistent copy of it.
pub struct FileStore {
    path: PathBuf,
    read_timeout: Duration,
    clock: Arc<dyn Clock>,
    write_guard: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, read_timeout: Duration) -> Self {
        Self::with_clock(path, read_timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(path: impl Into<PathBuf>, read_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            read_timeout,
            clock,
            write_guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self, path: &Path) -> Result<StoreDocument, String> {
        let raw = tokio::time::timeout(self.read_timeout, tokio::fs::read_to_string(path))
            .await
            .map_err(|_| format!("reading {} timed out after {:?}", path.display(), self.read_timeout))?
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;

        serde_json::from_str(&raw).map_err(|e| format!("cannot decode {}: {}", path.display(), e))
    }

    pub async fn load(&self) -> AccountingResult<StoreDocument> {
        self.read_document(&self.path)
            .await
            .map_err(AccountingError::ledger_unavailable)
    }

    /// Replaces the store file through a temp file and rename.
    pub async fn write_document(&self, document: &StoreDocument) -> std::io::Result<()> {
        let _guard = self.write_guard.lock().await;
        self.replace_file(document).await
    }

    async fn replace_file(&self, document: &StoreDocument) -> std::io::Result<()> {
        let body = serde_json::to_string_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }

    /// Merges the store document at `source` (e.g. from another install) into
    /// this one. Records already present by id are kept as they are.
    pub async fn import_from(&self, source: &Path) -> AccountingResult<ImportSummary> {
        let incoming = self
            .read_document(source)
            .await
            .map_err(AccountingError::ledger_unavailable)?;
        for interval in &incoming.intervals {
            interval.validate()?;
        }

        let _guard = self.write_guard.lock().await;
        let mut current = self.load().await?;
        let mut summary = ImportSummary::default();

        // Ids repeated inside the source count as already known after the first copy
        let mut known_intervals: HashSet<_> = current.intervals.iter().map(|i| i.id).collect();
        for interval in incoming.intervals {
            if known_intervals.insert(interval.id) {
                current.intervals.push(interval);
                summary.intervals_added += 1;
            } else {
                summary.intervals_skipped += 1;
            }
        }

        let mut known_instances: HashSet<_> = current.instances.iter().map(|i| i.id.clone()).collect();
        for instance in incoming.instances {
            if known_instances.insert(instance.id.clone()) {
                current.instances.push(instance);
                summary.instances_added += 1;
            } else {
                summary.instances_skipped += 1;
            }
        }

        self.replace_file(&current)
            .await
            .map_err(|e| AccountingError::ledger_unavailable(format!("cannot write {}: {}", self.path.display(), e)))?;

        info!(
            source = %source.display(),
            target = %self.path.display(),
            intervals_added = summary.intervals_added,
            intervals_skipped = summary.intervals_skipped,
            instances_added = summary.instances_added,
            instances_skipped = summary.instances_skipped,
            "Imported usage store"
        );
        Ok(summary)
    }
}

#[async_trait]
impl UsageLedger for FileStore {
    async fn observe(&self, owner: &str) -> AccountingResult<LedgerObservation> {
        let document = self.load().await.map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Usage ledger read failed");
            e
        })?;
        let observed_at = self.clock.now();
        let intervals: Vec<_> = document
            .intervals
            .into_iter()
            .filter(|interval| interval.owner_identity == owner)
            .collect();
        debug!(owner, count = intervals.len(), "Read usage intervals from file");
        Ok(LedgerObservation {
            observed_at,
            intervals,
        })
    }
}

#[async_trait]
impl InstanceStore for FileStore {
    async fn list_instances(&self) -> SnapshotResult<Vec<InstanceRecord>> {
        self.read_document(&self.path)
            .await
            .map(|document| document.instances)
            .map_err(SnapshotError::store_unavailable)
    }

    async fn get_instance(&self, id: &str) -> SnapshotResult<Option<InstanceRecord>> {
        Ok(self
            .list_instances()
            .await?
            .into_iter()
            .find(|instance| instance.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn store_at(dir: &tempfile::TempDir, name: &str) -> FileStore {
        FileStore::new(dir.path().join(name), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir, "absent.json");
        assert!(matches!(
            store.observe("/CN=carol").await,
            Err(AccountingError::LedgerUnavailable { .. })
        ));
        assert!(matches!(
            store.list_instances().await,
            Err(SnapshotError::StoreUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_garbage_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(&dir, "store.json");
        tokio::fs::write(store.path(), "{ not json").await.unwrap();
        assert!(matches!(
            store.observe("/CN=carol").await,
            Err(AccountingError::LedgerUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_import_merges_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let shared = UsageInterval::closed("/CN=carol", start, start + ChronoDuration::minutes(5)).unwrap();
        let fresh = UsageInterval::open("/CN=dave", start);

        let target = store_at(&dir, "current.json");
        target
            .write_document(&StoreDocument {
                intervals: vec![shared.clone()],
                instances: vec![],
            })
            .await
            .unwrap();

        let source = store_at(&dir, "old.json");
        source
            .write_document(&StoreDocument {
                intervals: vec![shared, fresh.clone()],
                instances: vec![],
            })
            .await
            .unwrap();

        let summary = target.import_from(source.path()).await.unwrap();
        assert_eq!(summary.intervals_added, 1);
        assert_eq!(summary.intervals_skipped, 1);

        let merged = target.load().await.unwrap();
        assert_eq!(merged.intervals.len(), 2);
        assert!(merged.intervals.iter().any(|i| i.id == fresh.id));
    }

    #[tokio::test]
    async fn test_import_skips_ids_repeated_in_source() {
        use crate::accounting::{AccountingEngine, ChargeGranularity};
        use crate::core::vm::{VMResources, VMStatus};

        let dir = tempfile::tempdir().unwrap();
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let interval = UsageInterval::closed("/CN=carol", start, start + ChronoDuration::minutes(30)).unwrap();
        let instance = InstanceRecord {
            id: "vm-3".into(),
            node: "node-1".into(),
            group_id: None,
            caller_identity: "/CN=carol".into(),
            state: VMStatus::Stopped,
            start_time: start,
            end_time: interval.end_time,
            resources: VMResources {
                memory_mb: 512,
                cpu_count: 1,
            },
        };

        let target = store_at(&dir, "current.json");
        target.write_document(&StoreDocument::default()).await.unwrap();
        let source = store_at(&dir, "old.json");
        source
            .write_document(&StoreDocument {
                intervals: vec![interval.clone(), interval],
                instances: vec![instance.clone(), instance],
            })
            .await
            .unwrap();

        let summary = target.import_from(source.path()).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                intervals_added: 1,
                intervals_skipped: 1,
                instances_added: 1,
                instances_skipped: 1,
            }
        );

        let merged = target.load().await.unwrap();
        assert_eq!(merged.intervals.len(), 1);
        assert_eq!(merged.instances.len(), 1);

        let engine = AccountingEngine::new(Arc::new(target), ChargeGranularity::new(60).unwrap());
        assert_eq!(engine.total_elapsed_minutes("/CN=carol").await.unwrap(), 60);
    }

    #[tokio::test]
    async fn test_import_refuses_malformed_source() {
        let dir = tempfile::tempdir().unwrap();
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let mut broken = UsageInterval::open("/CN=carol", start);
        broken.end_time = Some(start - ChronoDuration::minutes(1));

        let target = store_at(&dir, "current.json");
        target.write_document(&StoreDocument::default()).await.unwrap();
        let source = store_at(&dir, "old.json");
        source
            .write_document(&StoreDocument {
                intervals: vec![broken],
                instances: vec![],
            })
            .await
            .unwrap();

        assert!(matches!(
            target.import_from(source.path()).await,
            Err(AccountingError::MalformedInterval { .. })
        ));
        assert!(target.load().await.unwrap().intervals.is_empty());
    }
}
