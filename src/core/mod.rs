pub mod snapshot;
pub mod vm;

pub use snapshot::{SnapshotFilter, SnapshotProjector};
pub use vm::{InstanceRecord, VMResources, VMSnapshot, VMStatus};
