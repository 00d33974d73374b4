//! Transaction service.
//!
//! The single process-wide owner of the live window and its statistics. It is
//! constructed once at startup and injected into the HTTP layer and the sweeper.
//!
//! # Locking discipline
//!
//! Readers go straight to the engine's swapped snapshot and never take a lock.
//! Mutations go through a commit gate (`RwLock<()>`):
//!
//! | operation                  | gate      |
//! |----------------------------|-----------|
//! | insert + record            | shared    |
//! | clear + reset              | exclusive |
//! | sweep snapshot + recompute | exclusive |
//! | sweep eviction             | none      |
//!
//! Writers therefore run concurrently with each other, while a delete or a
//! recompute observes a store and an engine that agree with each other. A write
//! that lands between eviction and the snapshot is included in that snapshot;
//! one that lands after the recompute is folded on top of it.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};
use tracing::debug;

use crate::{
    admission::{AdmissionPolicy, Rejection},
    aggregation::AggregationEngine,
    clock::{Clock, SystemClock},
    config::ServiceConfig,
    models::{Statistics, Transaction},
    window_store::WindowStore,
};

/// Sweep state machine: `Idle -> Sweeping -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SweepState {
    Idle = 0,
    Sweeping = 1,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub cutoff: DateTime<Utc>,
    pub evicted: usize,
    pub retained: usize,
}

pub struct TransactionService {
    store: WindowStore,
    engine: AggregationEngine,
    policy: AdmissionPolicy,
    clock: Arc<dyn Clock>,
    commit_gate: RwLock<()>,
    sweep_state: AtomicU8,
}

impl TransactionService {
    pub fn new(policy: AdmissionPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: WindowStore::new(),
            engine: AggregationEngine::new(),
            policy,
            clock,
            commit_gate: RwLock::new(()),
            sweep_state: AtomicU8::new(SweepState::Idle as u8),
        }
    }

    /// Service reading the system clock.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(AdmissionPolicy::new(config.window), Arc::new(SystemClock))
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    /// Number of transactions currently held in the window.
    pub fn live_transactions(&self) -> usize {
        self.store.len()
    }

    /// Admit a transaction into the window.
    ///
    /// On success the transaction is both stored and folded into the
    /// statistics; on rejection neither happens.
    pub fn add_transaction(&self, transaction: Transaction) -> Result<(), Rejection> {
        let now = self.clock.now();
        if let Err(rejection) = self.policy.check(transaction.timestamp, now) {
            debug!(
                reason = %rejection,
                timestamp = %transaction.timestamp,
                now = %now,
                "Transaction rejected"
            );
            return Err(rejection);
        }

        let _gate = self.commit_gate.read();
        self.engine.record(&transaction.amount);
        self.store.insert(transaction);

        Ok(())
    }

    /// Latest committed statistics snapshot.
    #[inline]
    pub fn statistics(&self) -> Arc<Statistics> {
        self.engine.current_snapshot()
    }

    /// Drop every transaction and reset the statistics.
    pub fn delete_transactions(&self) {
        let _gate = self.commit_gate.write();
        self.store.clear();
        self.engine.reset();
        debug!("All transactions deleted");
    }

    #[inline]
    pub fn sweep_state(&self) -> SweepState {
        match self.sweep_state.load(Ordering::Acquire) {
            1 => SweepState::Sweeping,
            _ => SweepState::Idle,
        }
    }

    /// Evict expired transactions and rebuild statistics from the survivors.
    ///
    /// Returns `None` when another sweep is already in progress.
    pub fn sweep(&self) -> Option<SweepReport> {
        let _sweeping = SweepGuard::acquire(&self.sweep_state)?;

        let cutoff = self.policy.cutoff(self.clock.now());
        let evicted = self.store.evict_before(cutoff);

        let retained = {
            let _gate = self.commit_gate.write();
            let amounts = self.store.snapshot_amounts();
            let retained = amounts.len();
            self.engine.recompute(amounts);
            retained
        };

        if evicted > 0 {
            debug!(evicted, retained, cutoff = %cutoff, "Sweep evicted expired transactions");
        }

        Some(SweepReport {
            cutoff,
            evicted,
            retained,
        })
    }
}

/// Holds the `Sweeping` state; dropping it, on any exit path, returns to `Idle`.
struct SweepGuard<'a> {
    state: &'a AtomicU8,
}

impl<'a> SweepGuard<'a> {
    fn acquire(state: &'a AtomicU8) -> Option<Self> {
        state
            .compare_exchange(
                SweepState::Idle as u8,
                SweepState::Sweeping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| Self { state })
    }
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.state.store(SweepState::Idle as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use bigdecimal::BigDecimal;
    use chrono::Duration;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn service() -> (TransactionService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let service = TransactionService::new(
            AdmissionPolicy::new(Duration::seconds(30)),
            clock.clone(),
        );
        (service, clock)
    }

    #[test]
    fn test_expired_transaction_leaves_statistics_unchanged() {
        let (service, clock) = service();
        let now = clock.now();

        let result = service.add_transaction(Transaction::new(dec("10"), now - Duration::seconds(40)));
        assert_eq!(result, Err(Rejection::ExpiredTimestamp));
        assert_eq!(*service.statistics(), Statistics::empty());
        assert_eq!(service.live_transactions(), 0);
    }

    #[test]
    fn test_future_transaction_leaves_statistics_unchanged() {
        let (service, clock) = service();
        let now = clock.now();

        let result = service.add_transaction(Transaction::new(dec("10"), now + Duration::seconds(5)));
        assert_eq!(result, Err(Rejection::FutureTimestamp));
        assert_eq!(*service.statistics(), Statistics::empty());
    }

    #[test]
    fn test_delete_resets_everything() {
        let (service, clock) = service();
        service
            .add_transaction(Transaction::new(dec("100.00"), clock.now()))
            .unwrap();

        service.delete_transactions();
        assert_eq!(*service.statistics(), Statistics::empty());
        assert_eq!(service.live_transactions(), 0);

        service.delete_transactions();
        assert_eq!(*service.statistics(), Statistics::empty());
    }

    #[test]
    fn test_large_and_small_amounts_sum_exactly() {
        let (service, clock) = service();
        let now = clock.now();
        service
            .add_transaction(Transaction::new(dec("10000000000000000000000000000"), now))
            .unwrap();
        service
            .add_transaction(Transaction::new(dec("0.01"), now))
            .unwrap();

        let expected = dec("10000000000000000000000000000.01");
        assert_eq!(service.statistics().sum, expected);

        service.sweep().unwrap();
        assert_eq!(service.statistics().sum, expected);
    }

    #[test]
    fn test_sweep_with_oversized_window_keeps_everything() {
        let clock = Arc::new(ManualClock::default());
        let service = TransactionService::new(
            AdmissionPolicy::new(Duration::days(365 * 1_000_000)),
            clock.clone(),
        );
        service
            .add_transaction(Transaction::new(dec("1"), clock.now() - Duration::days(3_650)))
            .unwrap();

        let report = service.sweep().unwrap();
        assert_eq!(report.cutoff, DateTime::<Utc>::MIN_UTC);
        assert_eq!(report.evicted, 0);
        assert_eq!(service.statistics().count, 1);
        assert_eq!(service.sweep_state(), SweepState::Idle);
    }

    #[test]
    fn test_sweep_guard_releases_on_panic() {
        let state = AtomicU8::new(SweepState::Idle as u8);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _sweeping = SweepGuard::acquire(&state).unwrap();
            assert!(SweepGuard::acquire(&state).is_none());
            panic!("sweep aborted");
        }));

        assert!(result.is_err());
        assert_eq!(state.load(Ordering::Acquire), SweepState::Idle as u8);
        assert!(SweepGuard::acquire(&state).is_some());
    }

    #[test]
    fn test_sweep_evicts_and_recomputes_extremes() {
        let (service, clock) = service();
        let t0 = clock.now();
        service
            .add_transaction(Transaction::new(dec("500"), t0))
            .unwrap();

        clock.advance(Duration::seconds(10));
        service
            .add_transaction(Transaction::new(dec("5"), clock.now()))
            .unwrap();
        service
            .add_transaction(Transaction::new(dec("50"), clock.now()))
            .unwrap();

        // Still inside the window for the first transaction.
        clock.set(t0 + Duration::seconds(30));
        let report = service.sweep().unwrap();
        assert_eq!(report.evicted, 0);
        assert_eq!(service.statistics().max, dec("500"));

        clock.set(t0 + Duration::seconds(30) + Duration::milliseconds(1));
        let report = service.sweep().unwrap();
        assert_eq!(report.evicted, 1);
        assert_eq!(report.retained, 2);

        let stats = service.statistics();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.max, dec("50"));
        assert_eq!(stats.min, dec("5"));
        assert_eq!(stats.sum, dec("55"));
        assert_eq!(service.sweep_state(), SweepState::Idle);
    }

    #[test]
    fn test_identical_timestamps_both_count_after_sweep() {
        let (service, clock) = service();
        let now = clock.now();
        service.add_transaction(Transaction::new(dec("1"), now)).unwrap();
        service.add_transaction(Transaction::new(dec("2"), now)).unwrap();

        service.sweep().unwrap();
        let stats = service.statistics();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.sum, dec("3"));
    }
}
