pub mod accounting;
pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod errors;
pub mod store;

use std::sync::Arc;

// Re-exports
pub use accounting::{AccountingEngine, ChargeGranularity, ElapsedAndReservedMinutes, UsageInterval};
pub use api::{create_router, AppState};
pub use crate::core::{SnapshotFilter, SnapshotProjector, VMSnapshot};
pub use errors::{AccountingError, FleetError, FleetResult, SnapshotError};
pub use store::{FileStore, InMemoryStore, InstanceStore, UsageLedger};

/// Wires the engine and projector to the store file named in `settings`.
pub fn file_backed_state(settings: &crate::config::Settings) -> FleetResult<AppState> {
    let granularity = settings.charge_granularity()?;
    let store = Arc::new(FileStore::new(&settings.store.path, settings.read_timeout()));
    Ok(AppState {
        engine: AccountingEngine::new(store.clone(), granularity),
        projector: SnapshotProjector::new(store),
    })
}
