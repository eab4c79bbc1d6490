use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AccountingError, AccountingResult};

/// One billable window of a VM for one owner identity.
/// An interval without `end_time` is still reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageInterval {
    pub id: Uuid,
    pub owner_identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_id: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl UsageInterval {
    pub fn open(owner_identity: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_identity: owner_identity.into(),
            vm_id: None,
            start_time,
            end_time: None,
        }
    }

    pub fn closed(
        owner_identity: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> AccountingResult<Self> {
        let interval = Self {
            end_time: Some(end_time),
            ..Self::open(owner_identity, start_time)
        };
        interval.validate()?;
        Ok(interval)
    }

    pub fn with_vm(mut self, vm_id: impl Into<String>) -> Self {
        self.vm_id = Some(vm_id.into());
        self
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn validate(&self) -> AccountingResult<()> {
        match self.end_time {
            Some(end_time) if end_time < self.start_time => Err(AccountingError::MalformedInterval {
                interval_id: self.id,
                start_time: self.start_time,
                end_time,
            }),
            _ => Ok(()),
        }
    }

    /// Whole minutes used up to `observed_at`, any sub-minute remainder
    /// counting as a full minute. Closed intervals ignore `observed_at`.
    pub fn billable_minutes(&self, observed_at: DateTime<Utc>) -> AccountingResult<u64> {
        self.validate()?;
        let until = self.end_time.unwrap_or(observed_at);
        // An open interval stamped after the observation instant has not accrued anything yet
        let Ok(elapsed) = (until - self.start_time).to_std() else {
            return Ok(0);
        };
        let minutes = elapsed.as_secs() / 60;
        if elapsed.as_secs() % 60 > 0 || elapsed.subsec_nanos() > 0 {
            Ok(minutes + 1)
        } else {
            Ok(minutes)
        }
    }
}

/// Elapsed and reserved minutes taken from the same ledger observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElapsedAndReservedMinutes {
    pub elapsed_minutes: u64,
    pub reserved_minutes: u64,
}

impl ElapsedAndReservedMinutes {
    pub fn new(elapsed_minutes: u64, reserved_minutes: u64) -> Self {
        Self {
            elapsed_minutes,
            reserved_minutes,
        }
    }

    pub fn total(&self) -> Option<u64> {
        self.elapsed_minutes.checked_add(self.reserved_minutes)
    }
}
