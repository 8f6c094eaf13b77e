//! Transaction classification and currency backfill.
//!
//! Broker exports describe most cash events only through free text, so the
//! kind of a row is inferred from its fields and its reference. The rules live
//! behind [`Classifier`] so another broker or locale can bring its own.

use super::config::ClassifierConfig;
use super::currency::Currency;
use super::error::{Error, Result};
use super::transaction::{RawTransaction, Transaction, TransactionKind};
use regex::Regex;
use std::collections::HashMap;

pub trait Classifier: Send + Sync {
    /// Assigns a kind to the row or fails when no rule matches.
    fn classify(&self, raw: RawTransaction) -> Result<Transaction>;
}

/// Regular expressions driving [`PatternClassifier`].
#[derive(Debug, Clone)]
pub struct ClassifierPatterns {
    pub buy: Regex,
    pub sell: Regex,
    pub deposit: Regex,
    pub withdrawal: Regex,
    /// Transfer fees booked as a deposit to the own account
    pub deposit_transfer_fee: Regex,
    pub capital_gain: Regex,
    pub dividend: Regex,
    pub fee: Regex,
    pub spin_off: Regex,
    pub return_of_principal: Regex,
    pub merger: Regex,
}

// Fio e-Broker wording (Czech and English)
const BUY: &str = r"(?i)^(nákup|buy)$";
const SELL: &str = r"(?i)^(prodej|sell)$";
const DEPOSIT: &str = r"(?i)Vloženo na účet|Převod z účtu";
const WITHDRAWAL: &str = r"(?i)Vybráno z|Převod na účet";
const DEPOSIT_TRANSFER_FEE: &str = r"Poplatek za převod na OU";
const CAPITAL_GAIN: &str = r"CAPITAL GAIN";
const DIVIDEND: &str = r"(?i)divid\.|dividenda|Korekce výnosu|Stock Dividend Cash Distribution|Refundable U\.S\. Fed Tax";
const FEE: &str = r"(?i)fee|poplatek";
const SPIN_OFF: &str = r"Spin-off";
const RETURN_OF_PRINCIPAL: &str = r"Return of Principal";
const MERGER: &str = r"Merger";

impl ClassifierPatterns {
    /// Default patterns with optional overrides from configuration.
    pub fn from_config(config: &ClassifierConfig) -> anyhow::Result<Self> {
        fn compile(custom: &Option<String>, default: &str) -> anyhow::Result<Regex> {
            let pattern = custom.as_deref().unwrap_or(default);
            Regex::new(pattern)
                .map_err(|e| anyhow::anyhow!("Invalid classifier pattern '{}': {}", pattern, e))
        }

        Ok(Self {
            buy: compile(&config.buy, BUY)?,
            sell: compile(&config.sell, SELL)?,
            deposit: compile(&config.deposit, DEPOSIT)?,
            withdrawal: compile(&config.withdrawal, WITHDRAWAL)?,
            deposit_transfer_fee: compile(&config.deposit_transfer_fee, DEPOSIT_TRANSFER_FEE)?,
            capital_gain: compile(&config.capital_gain, CAPITAL_GAIN)?,
            dividend: compile(&config.dividend, DIVIDEND)?,
            fee: compile(&config.fee, FEE)?,
            spin_off: compile(&config.spin_off, SPIN_OFF)?,
            return_of_principal: compile(&config.return_of_principal, RETURN_OF_PRINCIPAL)?,
            merger: compile(&config.merger, MERGER)?,
        })
    }
}

impl Default for ClassifierPatterns {
    fn default() -> Self {
        Self::from_config(&ClassifierConfig::default()).expect("built-in patterns are valid")
    }
}

/// Rule-based classifier working on direction, item, price, net total and
/// reference text.
#[derive(Debug, Clone, Default)]
pub struct PatternClassifier {
    patterns: ClassifierPatterns,
}

impl PatternClassifier {
    pub fn new(patterns: ClassifierPatterns) -> Self {
        Self { patterns }
    }

    fn infer_kind(&self, raw: &mut RawTransaction) -> Option<TransactionKind> {
        let p = &self.patterns;
        let direction = raw.direction.trim();
        let reference = raw.reference.trim();

        let mut kind = None;

        // explicit direction
        if p.buy.is_match(reference) || p.buy.is_match(direction) {
            kind = Some(TransactionKind::Buy);
        } else if p.sell.is_match(reference) || p.sell.is_match(direction) {
            kind = Some(TransactionKind::Sell);
        }

        // cash movements carry neither item nor price
        if kind.is_none() && raw.item.is_empty() && raw.price == 0.0 {
            if p.withdrawal.is_match(reference) && raw.net_total <= 0.0 {
                kind = Some(TransactionKind::Withdrawal);
            } else if p.deposit.is_match(reference) && raw.net_total >= 0.0 {
                kind = Some(TransactionKind::Deposit);
            } else if p.deposit_transfer_fee.is_match(reference) {
                kind = Some(TransactionKind::Deposit);
            }
        }

        if kind.is_none() && direction.is_empty() {
            if p.capital_gain.is_match(reference) || p.dividend.is_match(reference) {
                kind = Some(TransactionKind::Dividend);
            } else if p.fee.is_match(reference) {
                kind = Some(TransactionKind::Fee);
                raw.quantity = 0.0;
                raw.price = 0.0;
                raw.fee = -raw.net_total;
                if raw.fee_currency.is_none() {
                    raw.fee_currency = raw.currency.clone();
                }
            }
        }

        // textual overrides
        if p.spin_off.is_match(reference) {
            kind = Some(TransactionKind::Buy);
            raw.price = 0.0;
            raw.net_total = 0.0;
            raw.currency = None;
            raw.fee_currency = None;
        } else if p.return_of_principal.is_match(reference) {
            kind = Some(TransactionKind::ReturnOfCapital);
        } else if kind.is_none() && p.merger.is_match(reference) {
            kind = Some(TransactionKind::MergerCash);
        }

        kind
    }
}

impl Classifier for PatternClassifier {
    fn classify(&self, mut raw: RawTransaction) -> Result<Transaction> {
        let kind = self
            .infer_kind(&mut raw)
            .ok_or_else(|| Error::Classification {
                time: raw.time,
                description: format!(
                    "item '{}', direction '{}', net total {:.2}, reference '{}'",
                    raw.item, raw.direction, raw.net_total, raw.reference
                ),
            })?;

        if matches!(kind, TransactionKind::Dividend) {
            raw.quantity = 0.0;
            raw.price = 0.0;
        }

        let item = raw
            .item
            .trim()
            .strip_suffix('*')
            .unwrap_or(raw.item.trim())
            .to_string();

        Ok(Transaction {
            time: raw.time,
            kind,
            item,
            quantity: raw.quantity,
            price: raw.price,
            net_total: raw.net_total,
            currency: raw.currency,
            fee: raw.fee,
            fee_currency: raw.fee_currency,
            reference: raw.reference,
        })
    }
}

/// First known currency per instrument, used to fill rows that lost it.
///
/// Assumes an instrument never changes its trading currency over its history.
/// Rows produced by splits and spin-offs usually come without currency
/// columns and inherit it from the instrument's earlier trades.
#[derive(Debug, Default)]
pub struct KnownCurrencies {
    currency: HashMap<String, Currency>,
    fee_currency: HashMap<String, Currency>,
}

impl KnownCurrencies {
    /// Scans transactions ordered from the oldest to the newest.
    pub fn scan<'a>(oldest_first: impl IntoIterator<Item = &'a Transaction>) -> Self {
        let mut known = Self::default();
        for tr in oldest_first {
            if let Some(currency) = &tr.currency {
                known
                    .currency
                    .entry(tr.item.clone())
                    .or_insert_with(|| currency.clone());
            }
            if let Some(currency) = &tr.fee_currency {
                known
                    .fee_currency
                    .entry(tr.item.clone())
                    .or_insert_with(|| currency.clone());
            }
        }
        known
    }

    pub fn backfill(&self, tr: &mut Transaction) {
        if tr.currency.is_none() {
            tr.currency = self.currency.get(&tr.item).cloned();
        }
        if tr.fee_currency.is_none() {
            tr.fee_currency = self.fee_currency.get(&tr.item).cloned();
        }
    }
}
