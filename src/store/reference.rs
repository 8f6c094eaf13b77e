use super::memory::MemoryCollection;
use crate::core::cache::{KeyValueCollection, Store};
use crate::core::currency::{Currency, CurrencyRegistry};
use crate::core::reference::{Country, CurrencyRecord, Item, ReferenceStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::debug;

const CURRENCIES: &str = "currencies";
const CURRENCY_PAIRS: &str = "currency_pairs";
const COUNTRIES: &str = "countries";
const COUNTRY_IDS: &str = "country_ids";
const ITEMS: &str = "items";

/// Reference data kept as JSON values in key-value collections.
pub struct KvReferenceStore {
    currencies: Arc<dyn KeyValueCollection>,
    currency_pairs: Arc<dyn KeyValueCollection>,
    /// Country by name
    countries: Arc<dyn KeyValueCollection>,
    /// Country name by id
    country_ids: Arc<dyn KeyValueCollection>,
    /// Item by code
    items: Arc<dyn KeyValueCollection>,
    registry: CurrencyRegistry,
}

impl KvReferenceStore {
    pub fn new(store: &dyn Store, registry: CurrencyRegistry) -> Result<Self> {
        let open = |name: &str| {
            store
                .get_collection(name, true, true)
                .with_context(|| format!("Unable to open collection {name}"))
        };

        Ok(Self {
            currencies: open(CURRENCIES)?,
            currency_pairs: open(CURRENCY_PAIRS)?,
            countries: open(COUNTRIES)?,
            country_ids: open(COUNTRY_IDS)?,
            items: open(ITEMS)?,
            registry,
        })
    }

    /// Store without persistence, mostly for tests.
    pub fn in_memory() -> Self {
        Self {
            currencies: Arc::new(MemoryCollection::new()),
            currency_pairs: Arc::new(MemoryCollection::new()),
            countries: Arc::new(MemoryCollection::new()),
            country_ids: Arc::new(MemoryCollection::new()),
            items: Arc::new(MemoryCollection::new()),
            registry: CurrencyRegistry::default(),
        }
    }
}

async fn read<T: DeserializeOwned>(
    collection: &dyn KeyValueCollection,
    key: &str,
) -> Result<Option<T>> {
    match collection.get(key.as_bytes()).await? {
        Some(bytes) => Ok(Some(
            serde_json::from_slice(&bytes)
                .with_context(|| format!("Corrupted store value for key {key}"))?,
        )),
        None => Ok(None),
    }
}

async fn write<T: Serialize>(collection: &dyn KeyValueCollection, key: &str, value: &T) -> Result<()> {
    collection
        .put(key.as_bytes(), &serde_json::to_vec(value)?)
        .await
}

async fn next_id(collection: &dyn KeyValueCollection) -> Result<i64> {
    Ok(collection.count().await? as i64 + 1)
}

fn pair_key(at: NaiveDate, from: &Currency, to: &Currency) -> String {
    format!("{}|{}|{}", at.format("%Y-%m-%d"), from, to)
}

#[async_trait]
impl ReferenceStore for KvReferenceStore {
    async fn get_multiplier(
        &self,
        at: NaiveDate,
        from: &Currency,
        to: &Currency,
    ) -> Result<Option<f64>> {
        read(self.currency_pairs.as_ref(), &pair_key(at, from, to)).await
    }

    async fn store_multiplier(
        &self,
        at: NaiveDate,
        from: &Currency,
        to: &Currency,
        multiplier: f64,
    ) -> Result<()> {
        debug!("Storing multiplier {}/{} on {}: {}", from, to, at, multiplier);
        write(self.currency_pairs.as_ref(), &pair_key(at, from, to), &multiplier).await
    }

    async fn get_item_by_code(&self, code: &str) -> Result<Option<Item>> {
        read(self.items.as_ref(), code).await
    }

    async fn create_item(&self, mut item: Item) -> Result<Item> {
        if let Some(existing) = self.get_item_by_code(&item.code).await? {
            anyhow::bail!("Item {} already exists with id {}", item.code, existing.id);
        }
        item.id = next_id(self.items.as_ref()).await?;
        write(self.items.as_ref(), &item.code, &item).await?;
        debug!("Created item {} ({})", item.code, item.id);
        Ok(item)
    }

    async fn get_country(&self, id: i64) -> Result<Option<Country>> {
        let Some(name) = read::<String>(self.country_ids.as_ref(), &id.to_string()).await? else {
            return Ok(None);
        };
        read(self.countries.as_ref(), &name).await
    }

    async fn get_or_create_country(&self, name: &str) -> Result<Country> {
        if let Some(country) = read(self.countries.as_ref(), name).await? {
            return Ok(country);
        }

        let country = Country {
            id: next_id(self.countries.as_ref()).await?,
            name: name.to_string(),
        };
        write(self.countries.as_ref(), name, &country).await?;
        write(self.country_ids.as_ref(), &country.id.to_string(), &country.name).await?;
        debug!("Created country {} ({})", country.name, country.id);
        Ok(country)
    }

    async fn get_or_create_currency(&self, code: &Currency) -> Result<CurrencyRecord> {
        if let Some(currency) = read(self.currencies.as_ref(), code.code()).await? {
            return Ok(currency);
        }

        let currency = CurrencyRecord {
            id: next_id(self.currencies.as_ref()).await?,
            code: code.clone(),
            name: self.registry.name(code),
        };
        write(self.currencies.as_ref(), code.code(), &currency).await?;
        Ok(currency)
    }
}
