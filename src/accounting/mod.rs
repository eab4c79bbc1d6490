pub mod engine;
pub mod granularity;
pub mod interval;

pub use engine::AccountingEngine;
pub use granularity::ChargeGranularity;
pub use interval::{ElapsedAndReservedMinutes, UsageInterval};
