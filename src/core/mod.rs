//! Core business logic: transactions, lots, conversions and results

pub mod cache;
pub mod classify;
pub mod company;
pub mod config;
pub mod conversion;
pub mod currency;
pub mod error;
pub mod holding;
pub mod ledger;
pub mod log;
pub mod period;
pub mod processor;
pub mod rates;
pub mod reference;
pub mod result;
pub mod transaction;

// Re-export main types for cleaner imports
pub use currency::Currency;
pub use error::{Error, Result};
pub use processor::{Services, TransactionProcessor};
pub use result::ProcessResult;
pub use transaction::{RawTransaction, Transaction, TransactionKind};
