//! Transaction statistics backend.
//!
//! Maintains sum/avg/max/min/count over every transaction recorded within a
//! trailing time window, under concurrent writers, readers and a background
//! expiry sweep.

pub mod admission;
pub mod aggregation;
pub mod api;
pub mod clock;
pub mod config;
pub mod middleware;
pub mod models;
pub mod service;
pub mod sweeper;
pub mod window_store;

pub use admission::{AdmissionPolicy, Rejection};
pub use aggregation::AggregationEngine;
pub use models::{AmountError, Statistics, Transaction};
pub use service::TransactionService;
pub use window_store::WindowStore;
