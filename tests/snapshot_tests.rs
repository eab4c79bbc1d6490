use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use vm_fleet_accounting::core::{InstanceRecord, SnapshotFilter, SnapshotProjector, VMResources, VMSnapshot, VMStatus};
use vm_fleet_accounting::errors::SnapshotError;
use vm_fleet_accounting::store::{FileStore, InMemoryStore, StoreDocument};

fn instance(id: &str, node: &str, owner: &str, state: VMStatus, hour: u32) -> InstanceRecord {
    InstanceRecord {
        id: id.to_string(),
        node: node.to_string(),
        group_id: None,
        caller_identity: owner.to_string(),
        state,
        start_time: Utc.with_ymd_and_hms(2024, 9, 1, hour, 0, 0).unwrap(),
        end_time: None,
        resources: VMResources {
            memory_mb: 2048,
            cpu_count: 1,
        },
    }
}

async fn seeded_projector() -> (SnapshotProjector, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::default());
    store.upsert_instance(instance("vm-c", "node-1", "/CN=alice", VMStatus::Running, 3)).await;
    store.upsert_instance(instance("vm-a", "node-2", "/CN=bob", VMStatus::Paused, 1)).await;
    let mut grouped = instance("vm-b", "node-1", "/CN=alice", VMStatus::Stopped, 2);
    grouped.group_id = Some("batch-7".into());
    grouped.end_time = Some(grouped.start_time + Duration::minutes(40));
    store.upsert_instance(grouped).await;
    (SnapshotProjector::new(store.clone()), store)
}

#[test]
fn test_snapshot_field_round_trip() {
    let snapshot = VMSnapshot::new(
        "17".into(),
        "vmm-host-04".into(),
        Some("group-3".into()),
        "/O=Grid/CN=Alice".into(),
        "Running".into(),
        "2010-04-01 10:00:00".into(),
        Some("2010-04-01 12:30:00".into()),
        "3584".into(),
        "4".into(),
    );
    assert_eq!(snapshot.id(), "17");
    assert_eq!(snapshot.node(), "vmm-host-04");
    assert_eq!(snapshot.group_id(), Some("group-3"));
    assert_eq!(snapshot.caller_identity(), "/O=Grid/CN=Alice");
    assert_eq!(snapshot.state(), "Running");
    assert_eq!(snapshot.start_time(), "2010-04-01 10:00:00");
    assert_eq!(snapshot.end_time(), Some("2010-04-01 12:30:00"));
    assert_eq!(snapshot.memory(), "3584");
    assert_eq!(snapshot.cpu_count(), "4");

    let decoded: VMSnapshot = serde_json::from_str(&serde_json::to_string(&snapshot).unwrap()).unwrap();
    assert_eq!(decoded, snapshot);
}

#[tokio::test]
async fn test_list_is_ordered_by_start_time() {
    let (projector, _) = seeded_projector().await;
    let ids: Vec<_> = projector
        .list_snapshots(&SnapshotFilter::default())
        .await
        .unwrap()
        .iter()
        .map(|s| s.id().to_string())
        .collect();
    assert_eq!(ids, ["vm-a", "vm-b", "vm-c"]);
}

#[tokio::test]
async fn test_filters_combine() {
    let (projector, _) = seeded_projector().await;

    let by_node = SnapshotFilter {
        node: Some("node-1".into()),
        ..Default::default()
    };
    assert_eq!(projector.list_snapshots(&by_node).await.unwrap().len(), 2);

    let running_on_node = SnapshotFilter {
        state: Some(VMStatus::Running),
        ..by_node.clone()
    };
    let hits = projector.list_snapshots(&running_on_node).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id(), "vm-c");

    let by_group = SnapshotFilter {
        group_id: Some("batch-7".into()),
        ..Default::default()
    };
    let hits = projector.list_snapshots(&by_group).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].end_time(), Some("2024-09-01T02:40:00Z"));

    let by_owner = SnapshotFilter {
        owner: Some("/CN=ALICE".into()),
        ..Default::default()
    };
    assert!(projector.list_snapshots(&by_owner).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_snapshot_reflects_current_record() {
    let (projector, store) = seeded_projector().await;
    assert_eq!(projector.get_snapshot("vm-a").await.unwrap().state(), "paused");

    store.upsert_instance(instance("vm-a", "node-2", "/CN=bob", VMStatus::Running, 1)).await;
    assert_eq!(projector.get_snapshot("vm-a").await.unwrap().state(), "running");

    store.remove_instance("vm-a").await;
    match projector.get_snapshot("vm-a").await {
        Err(SnapshotError::NotFound { vm_id }) => assert_eq!(vm_id, "vm-a"),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_file_store_projection() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("store.json"), std::time::Duration::from_secs(1));
    store
        .write_document(&StoreDocument {
            intervals: vec![],
            instances: vec![instance("vm-9", "node-4", "/CN=frank", VMStatus::Creating, 5)],
        })
        .await
        .unwrap();

    let projector = SnapshotProjector::new(Arc::new(store));
    let snapshot = projector.get_snapshot("vm-9").await.unwrap();
    assert_eq!(snapshot.state(), "creating");
    assert_eq!(snapshot.start_time(), "2024-09-01T05:00:00Z");
    assert!(matches!(
        projector.get_snapshot("vm-10").await,
        Err(SnapshotError::NotFound { .. })
    ));
}
