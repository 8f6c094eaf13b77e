//! Daily exchange rates published by the Czech National Bank

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{Days, Local, NaiveDate};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::util::{RETRIES, RETRY_DELAY_MS, http_client, with_retry};
use crate::core::currency::Currency;
use crate::core::rates::CurrencyRateProvider;

const DAILY_RATES_PATH: &str =
    "/cs/financni-trhy/devizovy-trh/kurzy-devizoveho-trhu/kurzy-devizoveho-trhu/denni_kurz.txt";

/// Rates issued more than this many days before the requested date are stale.
const MAX_AGE_DAYS: i64 = 5;

pub struct CnbRateProvider {
    base_url: String,
    czk: Currency,
    /// Currencies listed in the first fetched table
    listed: Mutex<Option<HashSet<Currency>>>,
}

impl CnbRateProvider {
    pub fn new(base_url: &str) -> Self {
        CnbRateProvider {
            base_url: base_url.to_string(),
            czk: Currency::new("CZK"),
            listed: Mutex::new(None),
        }
    }

    async fn fetch_table(&self, at: NaiveDate) -> Result<DailyRates> {
        let url = format!(
            "{}{}?date={}",
            self.base_url,
            DAILY_RATES_PATH,
            at.format("%d.%m.%Y")
        );
        debug!("Requesting CNB rates from {}", url);

        let client = http_client()?;
        let response = with_retry(|| client.get(&url).send(), RETRIES, RETRY_DELAY_MS)
            .await
            .map_err(|e| anyhow!("Request error: {} for CNB rates on {}", e, at))?;

        if !response.status().is_success() {
            return Err(anyhow!("cnb.cz server returned code {}", response.status()));
        }

        let table = DailyRates::parse(&response.text().await?)?;

        let mut listed = self.listed.lock().await;
        if listed.is_none() {
            *listed = Some(table.rates.keys().cloned().collect());
        }
        Ok(table)
    }
}

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(rename = "množství")]
    amount: String,
    #[serde(rename = "kód")]
    code: String,
    #[serde(rename = "kurz")]
    rate: String,
}

/// One published table: issue date and CZK per unit of each currency.
#[derive(Debug)]
struct DailyRates {
    issued: NaiveDate,
    rates: HashMap<Currency, f64>,
}

impl DailyRates {
    /// Parses the text format, e.g.
    ///
    /// ```text
    /// 01.03.2023 #43
    /// země|měna|množství|kód|kurz
    /// Austrálie|dolar|1|AUD|14,925
    /// ```
    fn parse(text: &str) -> Result<Self> {
        let (header, table) = text
            .split_once('\n')
            .ok_or_else(|| anyhow!("Bad CNB format: missing rate table"))?;

        let issued = header
            .split_whitespace()
            .next()
            .and_then(|date| NaiveDate::parse_from_str(date, "%d.%m.%Y").ok())
            .ok_or_else(|| anyhow!("Bad CNB format: unexpected header '{}'", header.trim()))?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'|')
            .trim(csv::Trim::All)
            .from_reader(table.as_bytes());

        let mut rates = HashMap::new();
        for row in reader.deserialize::<Row>() {
            let row = row.map_err(|e| anyhow!("Bad CNB format: {}", e))?;
            let amount = parse_czech_number(&row.amount)?;
            let rate = parse_czech_number(&row.rate)?;
            if amount <= 0.0 {
                return Err(anyhow!("Bad CNB format: amount {} for {}", row.amount, row.code));
            }
            rates.insert(Currency::new(&row.code), rate / amount);
        }

        Ok(Self { issued, rates })
    }
}

/// Decimal comma, optional spaces as thousands separators.
fn parse_czech_number(text: &str) -> Result<f64> {
    let normalized: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    normalized
        .parse::<f64>()
        .map_err(|_| anyhow!("Bad CNB format: invalid number '{}'", text))
}

#[async_trait]
impl CurrencyRateProvider for CnbRateProvider {
    fn name(&self) -> &str {
        "CNB.cz"
    }

    async fn supports(&self, from: &Currency, to: &Currency) -> bool {
        if *to != self.czk {
            return false;
        }

        if self.listed.lock().await.is_none() {
            let yesterday = Local::now()
                .date_naive()
                .checked_sub_days(Days::new(1))
                .unwrap_or(NaiveDate::MIN);
            if let Err(e) = self.fetch_table(yesterday).await {
                warn!("Unable to fetch currencies supported by cnb.cz: {:#}", e);
                return false;
            }
        }

        self.listed
            .lock()
            .await
            .as_ref()
            .is_some_and(|listed| listed.contains(from))
    }

    /// Published rates are middle rates.
    fn allows_reverse(&self) -> bool {
        true
    }

    #[instrument(name = "CnbRateFetch", skip(self), fields(from = %from))]
    async fn get_rate(&self, from: &Currency, to: &Currency, at: NaiveDate) -> Result<f64> {
        if *to != self.czk {
            return Err(anyhow!("cnb.cz only quotes rates to CZK, not {}", to));
        }

        let table = self.fetch_table(at).await?;
        if (at - table.issued).num_days() > MAX_AGE_DAYS {
            return Err(anyhow!(
                "cnb.cz rates issued on {} are too old for {}",
                table.issued,
                at
            ));
        }

        table
            .rates
            .get(from)
            .copied()
            .ok_or_else(|| anyhow!("cnb.cz has no rate for {} on {}", from, at))
    }
}
