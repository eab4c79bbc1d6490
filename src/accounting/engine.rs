use std::sync::Arc;
use tracing::debug;

use super::granularity::ChargeGranularity;
use super::interval::ElapsedAndReservedMinutes;
use crate::errors::{AccountingError, AccountingResult};
use crate::store::{LedgerObservation, UsageLedger};
use crate::with_context;

/// Turns ledger intervals into chargeable minutes for one owner identity.
///
/// Holds no mutable state; clone it freely and share it between tasks.
/// Each query reads the ledger exactly once, so the elapsed and reserved
/// parts of a combined answer always come from the same observation and an
/// interval closing mid-query is never counted twice.
///
/// Rounding to the charge granularity happens per interval. Appending a new
/// closed interval therefore never changes what earlier intervals cost.
#[derive(Clone)]
pub struct AccountingEngine {
    ledger: Arc<dyn UsageLedger>,
    granularity: ChargeGranularity,
}

impl AccountingEngine {
    pub fn new(ledger: Arc<dyn UsageLedger>, granularity: ChargeGranularity) -> Self {
        Self { ledger, granularity }
    }

    pub fn charge_granularity(&self) -> ChargeGranularity {
        self.granularity
    }

    /// Rounded minutes of every closed interval.
    pub async fn total_elapsed_minutes(&self, owner: &str) -> AccountingResult<u64> {
        let tally = with_context!(self.query(owner).await, "total_elapsed_minutes", Some(owner))?;
        Ok(tally.elapsed_minutes)
    }

    /// Rounded minutes every open interval has accrued as of now.
    pub async fn current_reserved_minutes(&self, owner: &str) -> AccountingResult<u64> {
        let tally = with_context!(self.query(owner).await, "current_reserved_minutes", Some(owner))?;
        Ok(tally.reserved_minutes)
    }

    pub async fn total_elapsed_and_reserved_minutes(&self, owner: &str) -> AccountingResult<u64> {
        let total = self.query(owner).await.and_then(|tally| {
            tally
                .total()
                .ok_or_else(|| AccountingError::Overflow { owner: owner.to_string() })
        });
        with_context!(total, "total_elapsed_and_reserved_minutes", Some(owner))
    }

    pub async fn total_elapsed_and_reserved_minutes_tuple(
        &self,
        owner: &str,
    ) -> AccountingResult<ElapsedAndReservedMinutes> {
        with_context!(
            self.query(owner).await,
            "total_elapsed_and_reserved_minutes_tuple",
            Some(owner)
        )
    }

    async fn query(&self, owner: &str) -> AccountingResult<ElapsedAndReservedMinutes> {
        if owner.trim().is_empty() {
            return Err(AccountingError::InvalidOwner);
        }
        let observation = self.ledger.observe(owner).await?;
        let tally = self.tally(owner, &observation)?;
        debug!(
            owner,
            observed_at = %observation.observed_at,
            intervals = observation.intervals.len(),
            elapsed_minutes = tally.elapsed_minutes,
            reserved_minutes = tally.reserved_minutes,
            "Computed usage"
        );
        Ok(tally)
    }

    fn tally(&self, owner: &str, observation: &LedgerObservation) -> AccountingResult<ElapsedAndReservedMinutes> {
        let overflow = || AccountingError::Overflow { owner: owner.to_string() };
        let mut tally = ElapsedAndReservedMinutes::default();

        for interval in &observation.intervals {
            let minutes = interval.billable_minutes(observation.observed_at)?;
            let charged = self.granularity.charge(minutes).ok_or_else(overflow)?;
            let bucket = if interval.is_open() {
                &mut tally.reserved_minutes
            } else {
                &mut tally.elapsed_minutes
            };
            *bucket = bucket.checked_add(charged).ok_or_else(overflow)?;
        }

        Ok(tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::UsageInterval;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Ledger stub that counts reads and serves a fixed observation
    struct CountingLedger {
        reads: AtomicUsize,
        observation: LedgerObservation,
    }

    #[async_trait]
    impl UsageLedger for CountingLedger {
        async fn observe(&self, _owner: &str) -> AccountingResult<LedgerObservation> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.observation.clone())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 10, 0, 0).unwrap()
    }

    fn engine_with(intervals: Vec<UsageInterval>, observed_at: DateTime<Utc>) -> (AccountingEngine, Arc<CountingLedger>) {
        let ledger = Arc::new(CountingLedger {
            reads: AtomicUsize::new(0),
            observation: LedgerObservation { observed_at, intervals },
        });
        let engine = AccountingEngine::new(ledger.clone(), ChargeGranularity::new(60).unwrap());
        (engine, ledger)
    }

    #[tokio::test]
    async fn test_combined_query_reads_ledger_once() {
        let closed = UsageInterval::closed("/CN=erin", t0(), t0() + Duration::minutes(61)).unwrap();
        let open = UsageInterval::open("/CN=erin", t0());
        let (engine, ledger) = engine_with(vec![closed, open], t0() + Duration::minutes(5));

        let tuple = engine.total_elapsed_and_reserved_minutes_tuple("/CN=erin").await.unwrap();
        assert_eq!(tuple, ElapsedAndReservedMinutes::new(120, 60));
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 1);

        assert_eq!(engine.total_elapsed_and_reserved_minutes("/CN=erin").await.unwrap(), 180);
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_blank_owner_never_reaches_ledger() {
        let (engine, ledger) = engine_with(vec![], t0());
        assert!(matches!(
            engine.total_elapsed_minutes("  ").await,
            Err(AccountingError::InvalidOwner)
        ));
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_interval_fails_every_query() {
        let mut broken = UsageInterval::open("/CN=erin", t0());
        broken.end_time = Some(t0() - Duration::minutes(3));
        let (engine, _) = engine_with(vec![broken], t0());

        assert!(matches!(
            engine.total_elapsed_minutes("/CN=erin").await,
            Err(AccountingError::MalformedInterval { .. })
        ));
        assert!(matches!(
            engine.current_reserved_minutes("/CN=erin").await,
            Err(AccountingError::MalformedInterval { .. })
        ));
        assert!(matches!(
            engine.total_elapsed_and_reserved_minutes_tuple("/CN=erin").await,
            Err(AccountingError::MalformedInterval { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_interval_ahead_of_observation_costs_nothing() {
        let open = UsageInterval::open("/CN=erin", t0() + Duration::minutes(2));
        let (engine, _) = engine_with(vec![open], t0());
        assert_eq!(engine.current_reserved_minutes("/CN=erin").await.unwrap(), 0);
    }
}
