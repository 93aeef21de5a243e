//! # DriverLedger Core
//!
//! Core types, configuration, and storage for DriverLedger.
//!
//! This crate provides:
//! - Configuration loading and validation (JSON5 format)
//! - Domain records for drivers, trips, expenses, goals and reports
//! - A document store abstraction with a sled backend
//! - Report aggregation and driver-id maintenance

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod ledger;
pub mod storage;
pub mod types;

pub use config::{AuthConfig, Config, ConfigError};
pub use ledger::{Ledger, LedgerError, ReportPeriod, RewriteCounts};
pub use storage::{
    Collection, DocumentStore, Record, Repository, SledDocumentStore, StorageError, new_id,
};
pub use types::{Driver, Expense, ExpenseCategory, FuelType, Goal, Report, Trip};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::ledger::Ledger;
    pub use crate::storage::{DocumentStore, Repository, SledDocumentStore};
    pub use crate::types::*;
}
