//! Aggregation engine.
//!
//! Owns the current [`Statistics`] snapshot behind an [`ArcSwap`]. Readers load
//! the latest committed snapshot without locking; writers publish a complete new
//! snapshot in a single swap, so no reader can see a half-updated tuple.
//!
//! Two update paths exist:
//! - `record` folds one amount incrementally (compare-and-swap loop)
//! - `recompute` rebuilds everything from a full scan of the survivors
//!
//! Eviction always goes through `recompute`: `sum` and `count` could be
//! decremented, but removing the current max or min does not reveal its
//! successor without a scan.

use arc_swap::ArcSwap;
use bigdecimal::BigDecimal;
use std::sync::Arc;

use crate::models::Statistics;

pub struct AggregationEngine {
    current: ArcSwap<Statistics>,
}

impl Default for AggregationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationEngine")
            .field("current", &**self.current.load())
            .finish()
    }
}

impl AggregationEngine {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Statistics::empty()),
        }
    }

    /// Latest committed snapshot. Never blocks.
    #[inline]
    pub fn current_snapshot(&self) -> Arc<Statistics> {
        self.current.load_full()
    }

    /// Fold a single amount into the running snapshot.
    ///
    /// Retries until the successor is published on top of the snapshot it was
    /// derived from, so concurrent `record` calls never lose an update.
    pub fn record(&self, amount: &BigDecimal) {
        let mut observed = self.current.load_full();
        loop {
            let next = Arc::new(observed.folded(amount));
            let previous = self.current.compare_and_swap(&observed, next);
            if Arc::ptr_eq(&*previous, &observed) {
                return;
            }
            observed = arc_swap::Guard::into_inner(previous);
        }
    }

    /// Replace the snapshot with one rebuilt from `amounts`.
    pub fn recompute<I>(&self, amounts: I)
    where
        I: IntoIterator<Item = BigDecimal>,
    {
        let rebuilt = Statistics::from_amounts(amounts);
        self.current.store(Arc::new(rebuilt));
    }

    /// Replace the snapshot with the empty sentinel.
    pub fn reset(&self) {
        self.current.store(Arc::new(Statistics::empty()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{mean_half_up, DISPLAY_SCALE};
    use proptest::prelude::*;
    use std::str::FromStr;
    use std::thread;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_single_record() {
        let engine = AggregationEngine::new();
        engine.record(&dec("100.00"));

        let stats = engine.current_snapshot();
        assert_eq!(stats.sum, dec("100"));
        assert_eq!(stats.avg, dec("100"));
        assert_eq!(stats.max, dec("100"));
        assert_eq!(stats.min, dec("100"));
        assert_eq!(stats.count, 1);
    }

    #[test]
    fn test_two_records() {
        let engine = AggregationEngine::new();
        engine.record(&dec("100.00"));
        engine.record(&dec("200.00"));

        let stats = engine.current_snapshot();
        assert_eq!(stats.sum, dec("300"));
        assert_eq!(stats.avg, dec("150"));
        assert_eq!(stats.max, dec("200"));
        assert_eq!(stats.min, dec("100"));
        assert_eq!(stats.count, 2);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let engine = AggregationEngine::new();
        engine.record(&dec("42"));
        engine.reset();
        let first = engine.current_snapshot();
        engine.reset();
        let second = engine.current_snapshot();

        assert_eq!(*first, Statistics::empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_recompute_replaces_incremental_state() {
        let engine = AggregationEngine::new();
        for amount in ["5", "50", "500"] {
            engine.record(&dec(amount));
        }

        // The max (500) has been evicted; only a rescan can reveal 50.
        engine.recompute([dec("5"), dec("50")]);
        let stats = engine.current_snapshot();
        assert_eq!(stats.max, dec("50"));
        assert_eq!(stats.min, dec("5"));
        assert_eq!(stats.count, 2);
        assert_eq!(stats.avg, dec("27.50"));
    }

    #[test]
    fn test_mixed_magnitudes_stay_exact() {
        let engine = AggregationEngine::new();
        engine.record(&dec("10000000000000000000000000000"));
        engine.record(&dec("0.01"));

        let stats = engine.current_snapshot();
        assert_eq!(stats.sum, dec("10000000000000000000000000000.01"));
        assert_eq!(stats.min, dec("0.01"));

        engine.recompute([dec("0.01"), dec("10000000000000000000000000000")]);
        assert_eq!(engine.current_snapshot(), stats);
    }

    #[test]
    fn test_concurrent_records_lose_nothing() {
        let engine = Arc::new(AggregationEngine::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        engine.record(&BigDecimal::from(1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = engine.current_snapshot();
        assert_eq!(stats.count, 4_000);
        assert_eq!(stats.sum, BigDecimal::from(4_000));
        assert_eq!(stats.avg, BigDecimal::from(1));
    }

    fn amount_strategy() -> impl Strategy<Value = BigDecimal> {
        (-1_000_000i64..1_000_000i64).prop_map(|cents| BigDecimal::new(cents.into(), 2))
    }

    proptest! {
        #[test]
        fn prop_sum_and_count_match_inputs(amounts in prop::collection::vec(amount_strategy(), 0..64)) {
            let engine = AggregationEngine::new();
            for amount in &amounts {
                engine.record(amount);
            }
            let stats = engine.current_snapshot();
            let expected: BigDecimal = amounts.iter().sum();

            prop_assert_eq!(stats.count, amounts.len() as u64);
            prop_assert_eq!(&stats.sum, &expected);
        }

        #[test]
        fn prop_avg_and_bounds_hold(amounts in prop::collection::vec(amount_strategy(), 0..64)) {
            let engine = AggregationEngine::new();
            engine.recompute(amounts.iter().cloned());
            let stats = engine.current_snapshot();

            if amounts.is_empty() {
                prop_assert_eq!(&*stats, &Statistics::empty());
            } else {
                let expected_avg = mean_half_up(&stats.sum, stats.count, DISPLAY_SCALE);
                prop_assert_eq!(&stats.avg, &expected_avg);
                for amount in &amounts {
                    prop_assert!(stats.min <= *amount && *amount <= stats.max);
                }
            }
        }

        #[test]
        fn prop_incremental_matches_recompute(amounts in prop::collection::vec(amount_strategy(), 1..64)) {
            let incremental = AggregationEngine::new();
            for amount in &amounts {
                incremental.record(amount);
            }
            let rebuilt = AggregationEngine::new();
            rebuilt.recompute(amounts.iter().cloned());

            prop_assert_eq!(&*incremental.current_snapshot(), &*rebuilt.current_snapshot());
        }
    }
}
