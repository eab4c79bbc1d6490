use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

use crate::errors::ConfigError;

/// Minimum billable block in minutes. Any portion of a block that is used
/// costs the whole block: with 60, one minute costs 60 and 61 cost 120.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ChargeGranularity(NonZeroU32);

impl ChargeGranularity {
    pub const EXACT_MINUTE: ChargeGranularity = ChargeGranularity(NonZeroU32::MIN);

    pub fn new(minutes: u32) -> Result<Self, ConfigError> {
        NonZeroU32::new(minutes)
            .map(Self)
            .ok_or(ConfigError::InvalidGranularity { value: minutes })
    }

    pub fn minutes(&self) -> u32 {
        self.0.get()
    }

    /// Rounds `duration_minutes` up to the next whole block.
    /// Returns `None` if the rounded value does not fit in a `u64`.
    pub fn charge(&self, duration_minutes: u64) -> Option<u64> {
        let block = u64::from(self.0.get());
        duration_minutes.div_ceil(block).checked_mul(block)
    }
}

impl Default for ChargeGranularity {
    fn default() -> Self {
        Self::EXACT_MINUTE
    }
}

impl TryFrom<u32> for ChargeGranularity {
    type Error = ConfigError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        Self::new(minutes)
    }
}

impl From<ChargeGranularity> for u32 {
    fn from(granularity: ChargeGranularity) -> Self {
        granularity.minutes()
    }
}

impl fmt::Display for ChargeGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} min", self.0)
    }
}
