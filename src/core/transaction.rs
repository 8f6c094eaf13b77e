//! Typed brokerage transactions

use super::currency::Currency;
use super::error::{Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Display;

/// Largest split ratio accepted before a row is considered misclassified.
pub const MAX_SPLIT_MULTIPLIER: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Fee not directly associated with another transaction
    Fee,
    /// Item purchase, also used for currency conversions
    Buy,
    /// Item sale, also used for currency conversions
    Sell,
    Dividend,
    Interest,
    Deposit,
    Withdrawal,
    /// Stock split with the ratio in `quantity`, e.g. 1.5 for a 3:2 split
    SplitMultiplier,
    /// Return of capital decreasing the investment value
    ReturnOfCapital,
    /// Cash paid out because of a merger
    MergerCash,
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransactionKind::Fee => "Fee",
            TransactionKind::Buy => "Buy",
            TransactionKind::Sell => "Sell",
            TransactionKind::Dividend => "Dividend",
            TransactionKind::Interest => "Interest",
            TransactionKind::Deposit => "Deposit",
            TransactionKind::Withdrawal => "Withdrawal",
            TransactionKind::SplitMultiplier => "SplitMultiplier",
            TransactionKind::ReturnOfCapital => "ReturnOfCapital",
            TransactionKind::MergerCash => "MergerCash",
        };
        // `pad` so width specifiers work in listings
        f.pad(name)
    }
}

/// A parsed but not yet classified row as delivered by an importer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTransaction {
    pub time: NaiveDateTime,
    /// Broker direction column ("buy"/"sell" equivalents), empty when absent
    pub direction: String,
    pub item: String,
    pub quantity: f64,
    pub price: f64,
    pub net_total: f64,
    pub currency: Option<Currency>,
    pub fee: f64,
    pub fee_currency: Option<Currency>,
    pub reference: String,
}

impl RawTransaction {
    pub fn hash(&self) -> String {
        identity_hash(&self.time, &self.item, self.quantity, self.net_total)
    }
}

/// A classified transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub time: NaiveDateTime,
    pub kind: TransactionKind,
    /// Instrument code, empty for cash-only events
    pub item: String,
    /// Unsigned; meaningful for buys, sells and splits
    pub quantity: f64,
    /// Unsigned price per unit in `currency`
    pub price: f64,
    /// Cash in (positive) or out (negative)
    pub net_total: f64,
    pub currency: Option<Currency>,
    /// Unsigned fee paid in `fee_currency`
    pub fee: f64,
    pub fee_currency: Option<Currency>,
    pub reference: String,
}

impl Transaction {
    /// Stable identity used to drop duplicated rows.
    pub fn hash(&self) -> String {
        identity_hash(&self.time, &self.item, self.quantity, self.net_total)
    }

    /// Transaction currency, required once backfill has run.
    pub fn currency(&self) -> Result<&Currency> {
        self.currency
            .as_ref()
            .ok_or_else(|| Error::invalid(self, "currency is not set"))
    }

    /// Fee currency; an unset fee currency is only acceptable for a zero fee,
    /// in which case the transaction currency stands in.
    pub fn fee_currency(&self) -> Result<&Currency> {
        match (&self.fee_currency, self.fee == 0.0) {
            (Some(currency), _) => Ok(currency),
            (None, true) => self.currency(),
            (None, false) => Err(Error::invalid(self, "fee currency is not set")),
        }
    }

    /// Checks kind-specific invariants that do not depend on currency fields.
    pub fn validate(&self) -> Result<()> {
        use TransactionKind::*;

        if self.price < 0.0 {
            return Err(Error::invalid(self, "price must not be negative"));
        }
        if self.fee < 0.0 {
            return Err(Error::invalid(self, "fee must not be negative"));
        }

        match self.kind {
            Sell if self.net_total < 0.0 => {
                Err(Error::invalid(self, "sell must have zero or positive net total"))
            }
            Buy if self.net_total > 0.0 => {
                Err(Error::invalid(self, "buy must have zero or negative net total"))
            }
            Deposit if self.net_total < 0.0 => {
                Err(Error::invalid(self, "deposit must have zero or positive net total"))
            }
            Withdrawal if self.net_total > 0.0 => Err(Error::invalid(
                self,
                "withdrawal must have zero or negative net total",
            )),
            Deposit | Withdrawal
                if self.quantity != 0.0 || self.price != 0.0 || !self.item.is_empty() =>
            {
                Err(Error::invalid(
                    self,
                    "deposit and withdrawal must have zero quantity, zero price and no item",
                ))
            }
            Dividend | Interest if self.item.is_empty() => {
                Err(Error::invalid(self, "dividend and interest must have an item"))
            }
            Dividend | Interest if self.quantity != 0.0 || self.price != 0.0 => Err(
                Error::invalid(self, "dividend and interest must carry the amount in net total"),
            ),
            SplitMultiplier if self.quantity <= 0.0 => {
                Err(Error::invalid(self, "split multiplier must be positive"))
            }
            SplitMultiplier if self.quantity >= MAX_SPLIT_MULTIPLIER => Err(Error::invalid(
                self,
                "split multiplier of 10 or more is almost certainly misclassified",
            )),
            _ => Ok(()),
        }
    }

    /// Checks currency fields are set wherever an amount needs them.
    pub fn check_currencies(&self) -> Result<()> {
        if (self.price != 0.0 || self.net_total != 0.0) && self.currency.is_none() {
            return Err(Error::invalid(
                self,
                "currency must be set when price or net total is not zero",
            ));
        }
        if self.fee != 0.0 && self.fee_currency.is_none() {
            return Err(Error::invalid(
                self,
                "fee currency must be set when fee is not zero",
            ));
        }
        Ok(())
    }
}

impl Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let currency = self.currency.as_ref().map_or("N/A", |c| c.code());
        let fee_currency = self.fee_currency.as_ref().map_or("N/A", |c| c.code());
        write!(
            f,
            "{{[{:>15} on {}] {:>7} {:.2} @ {:.2} = {:.2} {}, fee {:.2} {}, {}}}",
            self.kind,
            self.time.format("%Y-%m-%d %H:%M"),
            self.item,
            self.quantity,
            self.price,
            self.net_total,
            currency,
            self.fee,
            fee_currency,
            preview(&self.reference, 10)
        )
    }
}

fn identity_hash(time: &NaiveDateTime, item: &str, quantity: f64, net_total: f64) -> String {
    let input = format!(
        "{}|{}|{:.6}|{:.6}",
        time.and_utc().timestamp(),
        item,
        quantity,
        net_total
    );
    hex::encode(Sha256::digest(input.as_bytes()))
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 3, day)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn cash(kind: TransactionKind, net_total: f64) -> Transaction {
        Transaction {
            time: at(1),
            kind,
            item: String::new(),
            quantity: 0.0,
            price: 0.0,
            net_total,
            currency: Some(Currency::new("USD")),
            fee: 0.0,
            fee_currency: None,
            reference: String::new(),
        }
    }

    #[test]
    fn test_hash_is_stable_and_ignores_reference() {
        let mut a = cash(TransactionKind::Deposit, 1000.0);
        let b = a.clone();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);

        a.reference = "different text".to_string();
        assert_eq!(a.hash(), b.hash());

        a.net_total = 999.0;
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_keeps_item_and_quantity_apart() {
        let a = RawTransaction {
            time: at(1),
            item: "AB".to_string(),
            quantity: 12.5,
            net_total: -100.0,
            ..Default::default()
        };
        let b = RawTransaction {
            item: "AB1".to_string(),
            quantity: 2.5,
            ..a.clone()
        };
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_deposit_and_withdrawal_are_accepted() {
        assert!(cash(TransactionKind::Deposit, 1000.0).validate().is_ok());
        assert!(cash(TransactionKind::Withdrawal, -1000.0).validate().is_ok());
    }

    #[test]
    fn test_deposit_with_quantity_is_rejected() {
        let mut deposit = cash(TransactionKind::Deposit, 1000.0);
        deposit.quantity = 5.0;
        let err = deposit.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidTransaction { .. }));
        assert!(err.to_string().contains("zero quantity"));
    }

    #[test]
    fn test_sign_rules() {
        assert!(cash(TransactionKind::Deposit, -1.0).validate().is_err());
        assert!(cash(TransactionKind::Withdrawal, 1.0).validate().is_err());

        let mut sell = cash(TransactionKind::Sell, -5.0);
        sell.item = "X".to_string();
        assert!(sell.validate().is_err());

        let mut buy = cash(TransactionKind::Buy, 5.0);
        buy.item = "X".to_string();
        assert!(buy.validate().is_err());
    }

    #[test]
    fn test_dividend_needs_item() {
        let dividend = cash(TransactionKind::Dividend, 12.0);
        assert!(dividend.validate().is_err());

        let mut dividend = cash(TransactionKind::Dividend, 12.0);
        dividend.item = "AAPL".to_string();
        assert!(dividend.validate().is_ok());

        dividend.quantity = 1.0;
        assert!(dividend.validate().is_err());
    }

    #[test]
    fn test_split_multiplier_bounds() {
        let mut split = cash(TransactionKind::SplitMultiplier, 0.0);
        split.item = "X".to_string();
        split.quantity = 2.0;
        assert!(split.validate().is_ok());

        split.quantity = 10.0;
        assert!(split.validate().is_err());

        split.quantity = 0.0;
        assert!(split.validate().is_err());
    }

    #[test]
    fn test_currency_checks() {
        let mut tr = cash(TransactionKind::Deposit, 1000.0);
        tr.currency = None;
        assert!(tr.check_currencies().is_err());

        tr.net_total = 0.0;
        assert!(tr.check_currencies().is_ok());

        tr.fee = 1.0;
        assert!(tr.check_currencies().is_err());
        assert!(tr.fee_currency().is_err());
    }

    #[test]
    fn test_display_truncates_reference() {
        let mut tr = cash(TransactionKind::Deposit, 1000.0);
        tr.reference = "Vloženo na účet z banky".to_string();
        let line = tr.to_string();
        assert!(line.contains("Deposit on 2023-03-01 10:00"));
        assert!(line.contains("Vloženo na..."));
        assert!(line.contains("1000.00 USD"));
    }
}
