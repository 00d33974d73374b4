//! Live transaction window.
//!
//! Holds every admitted transaction that has not yet been swept out. The store
//! knows nothing about statistics; it only supports insert, eviction by cutoff,
//! point-in-time amount snapshots and clearing.
//!
//! Entries are keyed by `(timestamp, sequence)`. The sequence is a store-local
//! counter, so two transactions sharing an instant are both kept.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use bigdecimal::BigDecimal;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::Transaction;

/// Key of a stored transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
}

#[derive(Debug, Default)]
pub struct WindowStore {
    entries: DashMap<EntryKey, Transaction>,
    next_sequence: AtomicU64,
}

impl WindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction under its own timestamp.
    pub fn insert(&self, transaction: Transaction) -> EntryKey {
        let key = EntryKey {
            timestamp: transaction.timestamp,
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
        };
        self.entries.insert(key, transaction);
        key
    }

    /// Drop every entry whose timestamp is strictly before `cutoff`.
    /// Returns the number of entries evicted.
    pub fn evict_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut evicted = 0usize;
        self.entries.retain(|key, _| {
            let keep = key.timestamp >= cutoff;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Amounts of every stored transaction.
    ///
    /// Iteration locks one shard at a time, so entries mutated concurrently may
    /// or may not be included.
    pub fn snapshot_amounts(&self) -> Vec<BigDecimal> {
        self.entries
            .iter()
            .map(|entry| entry.value().amount.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
