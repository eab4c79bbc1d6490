use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Accounting Error: {0}")]
    Accounting(#[from] AccountingError),

    #[error("Snapshot Error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug)]
pub enum AccountingError {
    #[error("Usage ledger unavailable: {reason}")]
    LedgerUnavailable {
        reason: String,
    },

    #[error("Malformed interval {interval_id}: ends at {end_time} before it starts at {start_time}")]
    MalformedInterval {
        interval_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },

    #[error("Owner identity must not be empty")]
    InvalidOwner,

    #[error("Usage total overflowed for owner {owner}")]
    Overflow {
        owner: String,
    },
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("VM not found: {vm_id}")]
    NotFound {
        vm_id: String,
    },

    #[error("Instance store unavailable: {reason}")]
    StoreUnavailable {
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Charge granularity must be at least one minute, got {value}")]
    InvalidGranularity {
        value: u32,
    },

    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Failed to write settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl AccountingError {
    pub fn ledger_unavailable(reason: impl ToString) -> Self {
        AccountingError::LedgerUnavailable {
            reason: reason.to_string(),
        }
    }
}

impl SnapshotError {
    pub fn store_unavailable(reason: impl ToString) -> Self {
        SnapshotError::StoreUnavailable {
            reason: reason.to_string(),
        }
    }
}

// Error context for tracking which query failed and for whom
#[derive(Debug)]
pub struct ErrorContext {
    pub timestamp: DateTime<Utc>,
    pub source_location: &'static str,
    pub operation: String,
    pub owner: Option<String>,
}

pub type FleetResult<T> = Result<T, FleetError>;
pub type AccountingResult<T> = Result<T, AccountingError>;
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Logs a failed result with an [`ErrorContext`] and hands the error back unchanged.
#[macro_export]
macro_rules! with_context {
    ($result:expr, $operation:expr) => {
        $crate::with_context!($result, $operation, None::<String>)
    };
    ($result:expr, $operation:expr, $owner:expr) => {
        $result.map_err(|e| {
            let context = $crate::errors::ErrorContext {
                timestamp: chrono::Utc::now(),
                source_location: std::file!(),
                operation: $operation.to_string(),
                owner: $owner.map(|o| o.to_string()),
            };
            tracing::error!(
                error = e.to_string(),
                context = ?context,
                "Operation failed"
            );
            e
        })
    };
}
