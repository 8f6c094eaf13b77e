//! Error taxonomy of the processing core.
//!
//! Collaborators (providers, importer, config) report `anyhow` errors; the core
//! wraps them into one of these variants so callers can tell fatal input
//! problems from unavailable rates or broken reference data.

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown transaction type on {time}: {description}")]
    Classification {
        time: NaiveDateTime,
        description: String,
    },

    #[error("invalid transaction {transaction}: {reason}")]
    InvalidTransaction { transaction: String, reason: String },

    #[error("rate for {from}/{to} on {date} is not available: {reason}")]
    ConversionUnavailable {
        from: String,
        to: String,
        date: NaiveDate,
        reason: String,
    },

    #[error("unable to resolve item {item}: {reason}")]
    Metadata { item: String, reason: String },

    #[error("store operation failed: {0:#}")]
    Store(anyhow::Error),
}

impl Error {
    pub(crate) fn invalid(transaction: impl ToString, reason: impl Into<String>) -> Self {
        Error::InvalidTransaction {
            transaction: transaction.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn metadata(item: &str, reason: impl ToString) -> Self {
        Error::Metadata {
            item: item.to_string(),
            reason: reason.to_string(),
        }
    }
}
