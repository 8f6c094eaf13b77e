//! Reading raw transactions from normalized CSV files

use crate::core::currency::{Currency, CurrencyRegistry};
use crate::core::transaction::RawTransaction;
use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// A source of raw, not yet classified transactions.
pub trait Importer {
    fn import(&self, path: &Path) -> Result<Vec<RawTransaction>>;
}

/// Reads the normalized column layout:
/// `date,direction,symbol,quantity,price,net_total,currency,fee,fee_currency,reference`.
pub struct CsvImporter<'a> {
    registry: &'a CurrencyRegistry,
}

#[derive(Debug, Deserialize)]
struct Record {
    date: String,
    #[serde(default)]
    direction: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    quantity: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    net_total: String,
    #[serde(default)]
    currency: String,
    #[serde(default)]
    fee: String,
    #[serde(default)]
    fee_currency: String,
    #[serde(default)]
    reference: String,
}

impl<'a> CsvImporter<'a> {
    pub fn new(registry: &'a CurrencyRegistry) -> Self {
        Self { registry }
    }

    pub fn read<R: Read>(&self, reader: R) -> Result<Vec<RawTransaction>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut transactions = Vec::new();
        for (index, record) in reader.deserialize::<Record>().enumerate() {
            // header is line 1
            let line = index + 2;
            let record = record.with_context(|| format!("Malformed row on line {line}"))?;
            let transaction = self
                .convert(record)
                .with_context(|| format!("Invalid row on line {line}"))?;
            transactions.push(transaction);
        }
        Ok(transactions)
    }

    fn convert(&self, record: Record) -> Result<RawTransaction> {
        Ok(RawTransaction {
            time: parse_time(&record.date)?,
            direction: record.direction,
            item: record.symbol,
            quantity: parse_number("quantity", &record.quantity)?,
            price: parse_number("price", &record.price)?,
            net_total: parse_number("net_total", &record.net_total)?,
            currency: self.parse_currency(&record.currency)?,
            fee: parse_number("fee", &record.fee)?,
            fee_currency: self.parse_currency(&record.fee_currency)?,
            reference: record.reference,
        })
    }

    fn parse_currency(&self, code: &str) -> Result<Option<Currency>> {
        if code.is_empty() {
            return Ok(None);
        }
        self.registry.parse(code).map(Some)
    }
}

impl Importer for CsvImporter<'_> {
    fn import(&self, path: &Path) -> Result<Vec<RawTransaction>> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let transactions = self
            .read(file)
            .with_context(|| format!("Failed to import {}", path.display()))?;
        debug!("Imported {} rows from {}", transactions.len(), path.display());
        Ok(transactions)
    }
}

fn parse_time(text: &str) -> Result<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
        .ok_or_else(|| anyhow!("Invalid date '{}'", text))
}

fn parse_number(column: &str, text: &str) -> Result<f64> {
    if text.is_empty() {
        return Ok(0.0);
    }
    text.parse::<f64>()
        .map_err(|_| anyhow!("Invalid {} '{}'", column, text))
}
