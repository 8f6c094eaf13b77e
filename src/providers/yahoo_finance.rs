use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{Days, NaiveDate, NaiveTime};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::util::{RETRIES, RETRY_DELAY_MS, http_client, with_retry};
use crate::core::cache::Cache;
use crate::core::company::{Address, CompanyData, CompanyDataProvider};
use crate::core::currency::Currency;
use crate::core::rates::CurrencyRateProvider;

/// Days of history requested so weekends and holidays still have a close.
const LOOKBACK_DAYS: u64 = 7;

/// Last close at or before `until` (exclusive timestamp bound).
fn last_close_before(until: i64, timestamps: &[i64], closes: &[Option<f64>]) -> Option<f64> {
    timestamps
        .iter()
        .zip(closes)
        .filter(|(ts, _)| **ts < until)
        .filter_map(|(_, close)| *close)
        .next_back()
}

async fn fetch_text(url: &str, what: &str) -> Result<String> {
    let client = http_client()?;
    let response = with_retry(|| client.get(url).send(), RETRIES, RETRY_DELAY_MS)
        .await
        .map_err(|e| anyhow!("Request error: {} for {} URL: {}", e, what, url))?;

    if !response.status().is_success() {
        return Err(anyhow!("HTTP error: {} for {}", response.status(), what));
    }

    Ok(response.text().await?)
}

// YahooCurrencyProvider implementation for CurrencyRateProvider
pub struct YahooCurrencyProvider {
    base_url: String,
    cache: Arc<Cache<String, f64>>,
}

impl YahooCurrencyProvider {
    pub fn new(base_url: &str, cache: Arc<Cache<String, f64>>) -> Self {
        YahooCurrencyProvider {
            base_url: base_url.to_string(),
            cache,
        }
    }
}

#[derive(Debug, Deserialize)]
struct YahooCurrencyResponse {
    chart: CurrencyChartResult,
}

#[derive(Debug, Deserialize)]
struct CurrencyChartResult {
    result: Option<Vec<CurrencyChartItem>>,
}

#[derive(Debug, Deserialize)]
struct CurrencyChartItem {
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

#[async_trait]
impl CurrencyRateProvider for YahooCurrencyProvider {
    fn name(&self) -> &str {
        "Yahoo Finance"
    }

    async fn supports(&self, from: &Currency, to: &Currency) -> bool {
        from != to
    }

    /// Quotes are market closes, not middle rates.
    fn allows_reverse(&self) -> bool {
        false
    }

    #[instrument(name = "YahooRateFetch", skip(self), fields(from = %from, to = %to))]
    async fn get_rate(&self, from: &Currency, to: &Currency, at: NaiveDate) -> Result<f64> {
        let symbol = format!("{from}{to}=X");
        let cache_key = format!("{symbol}@{at}");
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(cached);
        }

        let start = at
            .checked_sub_days(Days::new(LOOKBACK_DAYS))
            .ok_or_else(|| anyhow!("Invalid date {} for currency pair: {}", at, symbol))?;
        let end = at
            .checked_add_days(Days::new(1))
            .ok_or_else(|| anyhow!("Invalid date {} for currency pair: {}", at, symbol))?;
        let (period1, period2) = (
            start.and_time(NaiveTime::MIN).and_utc().timestamp(),
            end.and_time(NaiveTime::MIN).and_utc().timestamp(),
        );

        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d",
            self.base_url, symbol, period1, period2
        );
        debug!("Requesting currency rate from {}", url);

        let text = fetch_text(&url, &format!("currency pair: {symbol}")).await?;
        let data: YahooCurrencyResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", symbol, e))?;

        let item = data
            .chart
            .result
            .and_then(|result| result.into_iter().next())
            .ok_or_else(|| anyhow!("No rate data found for currency pair: {}", symbol))?;

        let closes = item
            .indicators
            .as_ref()
            .and_then(|inds| inds.quote.first())
            .and_then(|q| q.close.as_deref())
            .unwrap_or_default();
        let rate = last_close_before(period2, item.timestamp.as_deref().unwrap_or_default(), closes)
            .ok_or_else(|| anyhow!("No close for {} on or before {}", symbol, at))?;

        self.cache.put(cache_key, rate).await;
        Ok(rate)
    }
}

// YahooCompanyProvider implementation for CompanyDataProvider
pub struct YahooCompanyProvider {
    base_url: String,
    cache: Arc<Cache<String, CompanyData>>,
}

impl YahooCompanyProvider {
    pub fn new(base_url: &str, cache: Arc<Cache<String, CompanyData>>) -> Self {
        YahooCompanyProvider {
            base_url: base_url.to_string(),
            cache,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: QuoteSummary,
}

#[derive(Debug, Deserialize)]
struct QuoteSummary {
    result: Option<Vec<QuoteSummaryItem>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryItem {
    asset_profile: Option<AssetProfile>,
    price: Option<Price>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssetProfile {
    address1: String,
    city: String,
    state: String,
    zip: String,
    country: String,
    industry: String,
    sector: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Price {
    long_name: String,
}

#[async_trait]
impl CompanyDataProvider for YahooCompanyProvider {
    fn name(&self) -> &str {
        "Yahoo Finance"
    }

    #[instrument(name = "YahooCompanyFetch", skip(self), fields(ticker = %ticker))]
    async fn company_data(&self, ticker: &str) -> Result<CompanyData> {
        if let Some(cached) = self.cache.get(&ticker.to_string()).await {
            return Ok(cached);
        }

        let url = format!(
            "{}/v10/finance/quoteSummary/{}?modules=assetProfile,price",
            self.base_url, ticker
        );
        debug!("Requesting company data from {}", url);

        let text = fetch_text(&url, &format!("ticker: {ticker}")).await?;
        let data: QuoteSummaryResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", ticker, e))?;

        let item = data
            .quote_summary
            .result
            .and_then(|result| result.into_iter().next())
            .ok_or_else(|| anyhow!("No company data found for ticker: {}", ticker))?;

        let profile = item.asset_profile.unwrap_or_default();
        let company = CompanyData {
            long_name: item.price.unwrap_or_default().long_name,
            address: Address {
                address: profile.address1,
                city: profile.city,
                state: profile.state,
                zip: profile.zip,
                country: profile.country,
            },
            industry: profile.industry,
            sector: profile.sector,
        };
        if company.long_name.is_empty() && company.address.is_empty() {
            return Err(anyhow!("Empty company data for ticker: {}", ticker));
        }

        self.cache.put(ticker.to_string(), company.clone()).await;
        Ok(company)
    }
}
