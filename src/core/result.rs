//! Aggregated outcome of one processing run

use super::currency::Currency;
use super::holding::HoldingPeriod;
use super::reference::{Country, Item};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Dividend totals of one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessItem {
    pub item: Item,
    pub country: Country,
    /// Currency of the dividends, taken from the latest dividend
    pub currency: Option<Currency>,
    /// Withheld tax in the item currency
    pub dividend_tax_paid: f64,
    pub dividend_tax_paid_reporting: f64,
    pub dividend_income_reporting: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessCountry {
    pub items: Vec<ProcessItem>,
    pub total_dividend_income: f64,
    pub total_dividend_tax_paid: f64,
}

/// Purchase lot consumed by a sale.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedLot {
    pub bought_at: NaiveDateTime,
    pub quantity: f64,
    /// Cost including the prorated fee, in the sell currency
    pub cost: f64,
    pub held_for: HoldingPeriod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaleRecord {
    pub item: String,
    pub time: NaiveDateTime,
    pub quantity: f64,
    pub net_total: f64,
    pub currency: Currency,
    pub cost: f64,
    pub gain_loss: f64,
    pub lots: Vec<MatchedLot>,
    pub shortfall: f64,
}

/// Part of a sale without any matching purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct Shortfall {
    pub item: String,
    pub time: NaiveDateTime,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessResult {
    pub reporting_currency: Currency,
    /// Dividend aggregates by country name
    pub countries: BTreeMap<String, ProcessCountry>,
    /// Realized gain or loss in each transaction currency
    pub gain_loss_by_currency: BTreeMap<Currency, f64>,
    /// Sale proceeds before fees plus cash payouts, in the reporting currency
    pub total_revenues: f64,
    /// Cost bases, fees and cash charges, in the reporting currency
    pub total_expenses: f64,
    pub sales: Vec<SaleRecord>,
    pub shortfalls: Vec<Shortfall>,
}

impl ProcessResult {
    pub fn new(reporting_currency: Currency) -> Self {
        Self {
            reporting_currency,
            countries: BTreeMap::new(),
            gain_loss_by_currency: BTreeMap::new(),
            total_revenues: 0.0,
            total_expenses: 0.0,
            sales: Vec::new(),
            shortfalls: Vec::new(),
        }
    }

    pub fn get_item(&self, code: &str) -> Option<&ProcessItem> {
        self.countries
            .values()
            .flat_map(|country| country.items.iter())
            .find(|item| item.item.code == code)
    }

    /// Registers an instrument under its country; a known code is kept as is.
    pub fn add_item(&mut self, item: Item, country: Country) -> &ProcessItem {
        let (name, index) = match self.locate(&item.code) {
            Some(found) => found,
            None => {
                let name = country.name.clone();
                let entry = self.countries.entry(name.clone()).or_default();
                entry.items.push(ProcessItem {
                    item,
                    country,
                    currency: None,
                    dividend_tax_paid: 0.0,
                    dividend_tax_paid_reporting: 0.0,
                    dividend_income_reporting: 0.0,
                });
                (name, entry.items.len() - 1)
            }
        };
        &self.countries[&name].items[index]
    }

    pub fn set_item_currency(&mut self, code: &str, currency: Currency) {
        if let Some((country, index)) = self.country_of(code) {
            country.items[index].currency = Some(currency);
        }
    }

    /// Adds dividend income to the item and its country.
    pub fn add_dividend_income(&mut self, code: &str, amount_reporting: f64) -> bool {
        let Some((country, index)) = self.country_of(code) else {
            return false;
        };
        country.items[index].dividend_income_reporting += amount_reporting;
        country.total_dividend_income += amount_reporting;
        true
    }

    /// Adds withheld tax to the item and its country.
    pub fn add_dividend_tax(&mut self, code: &str, amount: f64, amount_reporting: f64) -> bool {
        let Some((country, index)) = self.country_of(code) else {
            return false;
        };
        let item = &mut country.items[index];
        item.dividend_tax_paid += amount;
        item.dividend_tax_paid_reporting += amount_reporting;
        country.total_dividend_tax_paid += amount_reporting;
        true
    }

    pub fn add_gain_loss(&mut self, currency: &Currency, amount: f64) {
        *self
            .gain_loss_by_currency
            .entry(currency.clone())
            .or_insert(0.0) += amount;
    }

    pub fn total_dividend_income(&self) -> f64 {
        self.countries.values().map(|c| c.total_dividend_income).sum()
    }

    pub fn total_dividend_tax_paid(&self) -> f64 {
        self.countries.values().map(|c| c.total_dividend_tax_paid).sum()
    }

    fn locate(&self, code: &str) -> Option<(String, usize)> {
        self.countries.iter().find_map(|(name, country)| {
            country
                .items
                .iter()
                .position(|item| item.item.code == code)
                .map(|index| (name.clone(), index))
        })
    }

    fn country_of(&mut self, code: &str) -> Option<(&mut ProcessCountry, usize)> {
        let (name, index) = self.locate(code)?;
        self.countries.get_mut(&name).map(|country| (country, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, code: &str) -> Item {
        Item {
            id,
            country_id: 1,
            currency_id: 1,
            code: code.to_string(),
            name: format!("{code} Inc."),
            address: String::new(),
        }
    }

    fn country(id: i64, name: &str) -> Country {
        Country {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_items_are_added_once() {
        let mut result = ProcessResult::new(Currency::new("CZK"));
        assert!(result.get_item("KO").is_none());

        result.add_item(item(1, "KO"), country(1, "United States"));
        result.add_item(item(1, "KO"), country(1, "United States"));
        result.add_item(item(2, "NESN"), country(2, "Switzerland"));

        assert_eq!(result.countries.len(), 2);
        assert_eq!(result.countries["United States"].items.len(), 1);
        assert_eq!(result.get_item("NESN").unwrap().country.name, "Switzerland");
    }

    #[test]
    fn test_dividend_totals_roll_up_to_country() {
        let mut result = ProcessResult::new(Currency::new("CZK"));
        result.add_item(item(1, "KO"), country(1, "United States"));
        result.add_item(item(2, "T"), country(1, "United States"));

        assert!(result.add_dividend_income("KO", 100.0));
        assert!(result.add_dividend_income("T", 50.0));
        assert!(result.add_dividend_tax("KO", 0.6, 15.0));
        assert!(!result.add_dividend_income("MISSING", 1.0));

        let us = &result.countries["United States"];
        assert_eq!(us.total_dividend_income, 150.0);
        assert_eq!(us.total_dividend_tax_paid, 15.0);
        let ko = result.get_item("KO").unwrap();
        assert_eq!(ko.dividend_income_reporting, 100.0);
        assert_eq!(ko.dividend_tax_paid, 0.6);
        assert_eq!(result.total_dividend_income(), 150.0);
        assert_eq!(result.total_dividend_tax_paid(), 15.0);
    }

    #[test]
    fn test_gain_loss_by_currency() {
        let mut result = ProcessResult::new(Currency::new("CZK"));
        let usd = Currency::new("USD");
        result.add_gain_loss(&usd, 10.0);
        result.add_gain_loss(&usd, -4.0);
        result.add_gain_loss(&Currency::new("EUR"), 1.0);
        assert_eq!(result.gain_loss_by_currency[&usd], 6.0);
        assert_eq!(result.gain_loss_by_currency.len(), 2);
    }
}
