//! Company metadata lookups

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
            && self.city.is_empty()
            && self.state.is_empty()
            && self.zip.is_empty()
            && self.country.is_empty()
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        write!(
            f,
            "{}, {}, {} {}, {}",
            self.address, self.city, self.state, self.zip, self.country
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyData {
    pub long_name: String,
    pub address: Address,
    pub industry: String,
    pub sector: String,
}

#[async_trait]
pub trait CompanyDataProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn company_data(&self, ticker: &str) -> Result<CompanyData>;
}

/// Ordered company data providers; the first one to answer wins.
pub struct CompanyLookup {
    providers: Vec<Arc<dyn CompanyDataProvider>>,
    /// Broker codes that providers know under another ticker
    aliases: HashMap<String, String>,
}

impl CompanyLookup {
    pub fn new(
        providers: Vec<Arc<dyn CompanyDataProvider>>,
        aliases: HashMap<String, String>,
    ) -> Self {
        Self { providers, aliases }
    }

    pub async fn company_data(&self, code: &str) -> Result<CompanyData> {
        let ticker = self.aliases.get(code).map_or(code, String::as_str);

        let mut last_error = None;
        for provider in &self.providers {
            match provider.company_data(ticker).await {
                Ok(data) => return Ok(data),
                Err(e) => {
                    debug!("{} has no company data for {}: {:#}", provider.name(), ticker, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("No company data available for {}", ticker)))
    }
}
