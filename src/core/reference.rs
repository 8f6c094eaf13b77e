//! Persistent reference data consumed by the processor

use super::currency::Currency;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRecord {
    pub id: i64,
    pub code: Currency,
    pub name: String,
}

/// A traded instrument with its issuer details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Assigned by the store on creation
    pub id: i64,
    pub country_id: i64,
    pub currency_id: i64,
    pub code: String,
    pub name: String,
    pub address: String,
}

/// Storage of countries, currencies, items and cached conversion multipliers.
///
/// Lookups return `Ok(None)` for missing records; `Err` is reserved for a
/// broken store.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn get_multiplier(
        &self,
        at: NaiveDate,
        from: &Currency,
        to: &Currency,
    ) -> Result<Option<f64>>;

    async fn store_multiplier(
        &self,
        at: NaiveDate,
        from: &Currency,
        to: &Currency,
        multiplier: f64,
    ) -> Result<()>;

    async fn get_item_by_code(&self, code: &str) -> Result<Option<Item>>;

    /// Persists a new item and returns it with its assigned id.
    async fn create_item(&self, item: Item) -> Result<Item>;

    async fn get_country(&self, id: i64) -> Result<Option<Country>>;

    async fn get_or_create_country(&self, name: &str) -> Result<Country>;

    async fn get_or_create_currency(&self, code: &Currency) -> Result<CurrencyRecord>;
}
