//! Currency codes and the registry of known currencies

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

/// ISO 4217 currency code, stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Self {
        Currency(code.trim().to_uppercase())
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Currency {
    fn from(code: &str) -> Self {
        Currency::new(code)
    }
}

const KNOWN_CURRENCIES: &[(&str, &str)] = &[
    ("ARS", "Argentine peso"),
    ("AUD", "Australian dollar"),
    ("BRL", "Brazilian real"),
    ("CAD", "Canadian dollar"),
    ("CHF", "Swiss franc"),
    ("CNY", "Chinese yuan"),
    ("CZK", "Czech koruna"),
    ("DKK", "Danish krone"),
    ("EUR", "Euro"),
    ("GBP", "Pound sterling"),
    ("HKD", "Hong Kong dollar"),
    ("HRK", "Croatian kuna"),
    ("HUF", "Hungarian forint"),
    ("IDR", "Indonesian rupiah"),
    ("ILA", "Israeli agora"),
    ("ILS", "Israeli new shekel"),
    ("INR", "Indian rupee"),
    ("ISK", "Icelandic krona"),
    ("JPY", "Japanese yen"),
    ("KRW", "South Korean won"),
    ("MXN", "Mexican peso"),
    ("MYR", "Malaysian ringgit"),
    ("NOK", "Norwegian krone"),
    ("NZD", "New Zealand dollar"),
    ("PHP", "Philippine peso"),
    ("PLN", "Polish złoty"),
    ("RON", "Romanian leu"),
    ("RUB", "Russian ruble"),
    ("SAR", "Saudi riyal"),
    ("SEK", "Swedish krona"),
    ("SGD", "Singapore dollar"),
    ("THB", "Thai baht"),
    ("TRY", "Turkish lira"),
    ("TWD", "New Taiwan dollar"),
    ("USD", "United States dollar"),
    ("XDR", "Special drawing rights"),
    ("ZAC", "South African cent"),
    ("ZAR", "South African rand"),
];

/// Immutable table of currencies the application understands.
///
/// Built once at startup and handed to the importer and the store, so there is
/// no process-wide mutable lookup table.
#[derive(Debug, Clone)]
pub struct CurrencyRegistry {
    names: BTreeMap<Currency, String>,
}

impl CurrencyRegistry {
    pub fn new(entries: impl IntoIterator<Item = (Currency, String)>) -> Self {
        Self {
            names: entries.into_iter().collect(),
        }
    }

    pub fn contains(&self, currency: &Currency) -> bool {
        self.names.contains_key(currency)
    }

    /// Human-readable name, falling back to the code itself.
    pub fn name(&self, currency: &Currency) -> String {
        self.names
            .get(currency)
            .cloned()
            .unwrap_or_else(|| currency.to_string())
    }

    /// Parses a code and checks it is known.
    pub fn parse(&self, code: &str) -> Result<Currency> {
        let currency = Currency::new(code);
        if self.contains(&currency) {
            Ok(currency)
        } else {
            Err(anyhow!("Unknown currency: {}", code))
        }
    }
}

impl Default for CurrencyRegistry {
    fn default() -> Self {
        Self::new(
            KNOWN_CURRENCIES
                .iter()
                .map(|(code, name)| (Currency::new(code), name.to_string())),
        )
    }
}
