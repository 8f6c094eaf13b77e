//! Turns a batch of raw transactions into a tax result.
//!
//! The processor owns the ledger for one batch: it drops duplicates, keeps the
//! transactions up to the end of the reporting period, classifies them and
//! then replays them from the oldest, matching sales against purchases and
//! aggregating dividends and cash events in the reporting currency.

use super::classify::{Classifier, KnownCurrencies};
use super::company::CompanyLookup;
use super::conversion::ConversionCache;
use super::currency::Currency;
use super::error::{Error, Result};
use super::holding::HoldingPeriod;
use super::ledger::{Ledger, QUANTITY_EPSILON};
use super::period::ReportPeriod;
use super::rates::RateConverter;
use super::reference::{Country, Item, ReferenceStore};
use super::result::{MatchedLot, ProcessResult, SaleRecord, Shortfall};
use super::transaction::{RawTransaction, Transaction, TransactionKind};
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Collaborators shared by every processing run.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn ReferenceStore>,
    pub rates: Arc<RateConverter>,
    pub companies: Arc<CompanyLookup>,
}

pub struct TransactionProcessor {
    ledger: Ledger,
    conversion: ConversionCache,
    store: Arc<dyn ReferenceStore>,
    companies: Arc<CompanyLookup>,
    reporting_currency: Currency,
    period: ReportPeriod,
}

impl TransactionProcessor {
    /// Processor reporting the previous calendar year.
    pub fn new(
        transactions: Vec<RawTransaction>,
        classifier: &dyn Classifier,
        services: Services,
        reporting_currency: Currency,
    ) -> Result<Self> {
        Self::with_period(
            transactions,
            classifier,
            services,
            reporting_currency,
            ReportPeriod::previous_year(),
        )
    }

    pub fn with_period(
        transactions: Vec<RawTransaction>,
        classifier: &dyn Classifier,
        services: Services,
        reporting_currency: Currency,
        period: ReportPeriod,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut classified = Vec::new();

        for raw in transactions {
            if !seen.insert(raw.hash()) {
                debug!("Skipping duplicate transaction on {} of {}", raw.time, raw.item);
                continue;
            }
            if raw.time >= period.end {
                continue;
            }

            let transaction = classifier.classify(raw)?;
            transaction.validate()?;
            classified.push(transaction);
        }

        debug!(
            "Ledger holds {} transactions up to {}",
            classified.len(),
            period.end
        );

        Ok(Self {
            ledger: Ledger::new(classified),
            conversion: ConversionCache::new(services.store.clone(), services.rates),
            store: services.store,
            companies: services.companies,
            reporting_currency,
            period,
        })
    }

    pub fn period(&self) -> &ReportPeriod {
        &self.period
    }

    /// Deduplicated transactions from the newest.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.ledger.entries().iter().map(|entry| &entry.transaction)
    }

    pub fn print_transactions(&self) -> std::io::Result<()> {
        let stdout = std::io::stdout();
        self.write_transactions(&mut stdout.lock())
    }

    pub fn write_transactions<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for transaction in self.transactions() {
            writeln!(out, "{transaction}")?;
        }
        Ok(())
    }

    pub async fn process(&mut self) -> Result<ProcessResult> {
        self.fix_missing_currencies()?;
        self.ledger.reset();

        let mut result = ProcessResult::new(self.reporting_currency.clone());

        for index in self.ledger.oldest_first() {
            let Some(entry) = self.ledger.entry(index) else {
                continue;
            };
            let transaction = entry.transaction.clone();

            if self.period.precedes(transaction.time) {
                self.replay(index, &transaction);
                continue;
            }

            match transaction.kind {
                TransactionKind::Sell => self.process_sell(&mut result, index, &transaction).await?,
                TransactionKind::Dividend | TransactionKind::Interest => {
                    self.process_dividend(&mut result, &transaction).await?
                }
                TransactionKind::MergerCash
                | TransactionKind::Fee
                | TransactionKind::ReturnOfCapital => {
                    self.process_cash_and_capital(&mut result, &transaction)
                        .await?
                }
                TransactionKind::SplitMultiplier => {
                    let lots = self.ledger.apply_split(index);
                    info!(
                        "{} - split {}x applied to {} open lots",
                        transaction.item, transaction.quantity, lots
                    );
                }
                TransactionKind::Buy | TransactionKind::Deposit | TransactionKind::Withdrawal => {}
            }
        }

        Ok(result)
    }

    /// Instruments losing currency columns (splits, spin-offs) inherit the
    /// first currency seen for them.
    fn fix_missing_currencies(&mut self) -> Result<()> {
        let known = KnownCurrencies::scan(
            self.ledger
                .entries()
                .iter()
                .rev()
                .map(|entry| &entry.transaction),
        );

        for entry in self.ledger.entries_mut() {
            known.backfill(&mut entry.transaction);
            entry.transaction.check_currencies()?;
        }
        Ok(())
    }

    /// Moves lots for transactions before the reporting period without
    /// touching the result.
    fn replay(&mut self, index: usize, transaction: &Transaction) {
        match transaction.kind {
            TransactionKind::Sell => {
                let outcome = self.ledger.match_sell(index);
                if outcome.shortfall > QUANTITY_EPSILON {
                    debug!(
                        "Unmatched {:.4} of {} sold on {} before the reporting period",
                        outcome.shortfall, transaction.item, transaction.time
                    );
                }
            }
            TransactionKind::SplitMultiplier => {
                self.ledger.apply_split(index);
            }
            _ => {}
        }
    }

    async fn process_sell(
        &mut self,
        result: &mut ProcessResult,
        index: usize,
        sell: &Transaction,
    ) -> Result<()> {
        let currency = sell.currency()?;
        let fee_currency = sell.fee_currency()?;
        let reporting = &self.reporting_currency;

        let sell_fee = self
            .conversion
            .convert(sell.fee, fee_currency, currency, sell.time)
            .await?;
        let sell_fee_reporting = self
            .conversion
            .convert(sell.fee, fee_currency, reporting, sell.time)
            .await?;
        let revenue_reporting = self
            .conversion
            .convert(sell.net_total + sell_fee, currency, reporting, sell.time)
            .await?;

        result.total_revenues += revenue_reporting;
        result.total_expenses += sell_fee_reporting;

        info!(
            "{} - sold {:.2} items and got {:.2} {} net on {}",
            sell.item, sell.quantity, sell.net_total, currency, sell.time
        );

        let outcome = self.ledger.match_sell(index);
        if outcome.shortfall > QUANTITY_EPSILON {
            warn!(
                "Cannot find a purchase of {:.4} items of {} sold on {}",
                outcome.shortfall, sell.item, sell.time
            );
            result.shortfalls.push(Shortfall {
                item: sell.item.clone(),
                time: sell.time,
                quantity: outcome.shortfall,
            });
        }

        let mut cost = 0.0;
        let mut lots = Vec::with_capacity(outcome.lots.len());
        for lot in &outcome.lots {
            let Some(entry) = self.ledger.entry(lot.entry) else {
                continue;
            };
            let buy = &entry.transaction;

            // a lot without currency carries neither price nor net total
            let buy_currency = buy.currency.as_ref().unwrap_or(currency);

            let mut lot_cost = lot.quantity * entry.effective_price();
            let bought = entry.effective_quantity();
            if buy.fee > 0.0 && bought > 0.0 {
                let fee_portion = buy.fee / bought * lot.quantity;
                lot_cost += self
                    .conversion
                    .convert(fee_portion, buy.fee_currency()?, buy_currency, buy.time)
                    .await?;
            }
            let lot_cost = self
                .conversion
                .convert(lot_cost, buy_currency, currency, buy.time)
                .await?;
            cost += lot_cost;

            let held_for = HoldingPeriod::between(buy.time, sell.time);
            info!(
                "  bought {:.2} items on {} ({} ago) for {:.2} {}",
                lot.quantity, buy.time, held_for, lot_cost, currency
            );
            lots.push(MatchedLot {
                bought_at: buy.time,
                quantity: lot.quantity,
                cost: lot_cost,
                held_for,
            });
        }
        self.ledger.set_resolved_cost(index, cost);

        let cost_reporting = self
            .conversion
            .convert(cost, currency, reporting, sell.time)
            .await?;
        result.total_expenses += cost_reporting;

        let gain_loss = sell.net_total - cost;
        info!("  => gain/loss: {:.2} {}", gain_loss, currency);
        result.add_gain_loss(currency, gain_loss);

        result.sales.push(SaleRecord {
            item: sell.item.clone(),
            time: sell.time,
            quantity: sell.quantity,
            net_total: sell.net_total,
            currency: currency.clone(),
            cost,
            gain_loss,
            lots,
            shortfall: outcome.shortfall,
        });
        Ok(())
    }

    /// Positive amounts are income, negative amounts withheld tax.
    async fn process_dividend(
        &self,
        result: &mut ProcessResult,
        dividend: &Transaction,
    ) -> Result<()> {
        let currency = dividend.currency()?;

        if result.get_item(&dividend.item).is_none() {
            let (item, country) = self.resolve_item(&dividend.item, currency).await?;
            result.add_item(item, country);
        }
        result.set_item_currency(&dividend.item, currency.clone());

        if dividend.net_total >= 0.0 {
            let income = self
                .conversion
                .convert(
                    dividend.net_total,
                    currency,
                    &self.reporting_currency,
                    dividend.time,
                )
                .await?;
            result.add_dividend_income(&dividend.item, income);
        } else {
            let tax = -dividend.net_total;
            let tax_reporting = self
                .conversion
                .convert(tax, currency, &self.reporting_currency, dividend.time)
                .await?;
            result.add_dividend_tax(&dividend.item, tax, tax_reporting);
        }

        Ok(())
    }

    /// Finds the item in the store or creates it from company data.
    async fn resolve_item(&self, code: &str, currency: &Currency) -> Result<(Item, Country)> {
        let known = self
            .store
            .get_item_by_code(code)
            .await
            .map_err(|e| Error::metadata(code, format!("{e:#}")))?;

        if let Some(item) = known {
            let country = self
                .store
                .get_country(item.country_id)
                .await
                .map_err(|e| Error::metadata(code, format!("{e:#}")))?
                .ok_or_else(|| {
                    Error::metadata(code, format!("country {} is not known", item.country_id))
                })?;
            return Ok((item, country));
        }

        let company = self
            .companies
            .company_data(code)
            .await
            .map_err(|e| Error::metadata(code, format!("unable to get company data: {e:#}")))?;
        debug!("Company data for {}: {:?}", code, company);

        let country_name = match company.address.country.trim() {
            "" => "Unknown",
            name => name,
        };
        let country = self
            .store
            .get_or_create_country(country_name)
            .await
            .map_err(Error::Store)?;
        let currency = self
            .store
            .get_or_create_currency(currency)
            .await
            .map_err(Error::Store)?;

        let item = self
            .store
            .create_item(Item {
                id: 0,
                country_id: country.id,
                currency_id: currency.id,
                code: code.to_string(),
                name: company.long_name.clone(),
                address: company.address.to_string(),
            })
            .await
            .map_err(Error::Store)?;

        Ok((item, country))
    }

    /// Capital returns and merger cash (positive) or fees (negative).
    async fn process_cash_and_capital(
        &self,
        result: &mut ProcessResult,
        transaction: &Transaction,
    ) -> Result<()> {
        let currency = transaction.currency()?;
        let (revenues, expenses) = if transaction.net_total >= 0.0 {
            (transaction.net_total, 0.0)
        } else {
            (0.0, -transaction.net_total)
        };

        let revenues_reporting = self
            .conversion
            .convert(revenues, currency, &self.reporting_currency, transaction.time)
            .await?;
        let expenses_reporting = self
            .conversion
            .convert(expenses, currency, &self.reporting_currency, transaction.time)
            .await?;

        info!(
            "{} - {} - revenues {:.2} {}, expenses {:.2} {}",
            transaction.item, transaction.reference, revenues, currency, expenses, currency
        );

        result.total_revenues += revenues_reporting;
        result.total_expenses += expenses_reporting;
        result.add_gain_loss(currency, revenues - expenses);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify::PatternClassifier;
    use crate::core::company::{Address, CompanyData, CompanyDataProvider};
    use crate::core::rates::tests::StaticRates;
    use crate::store::reference::KvReferenceStore;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::HashMap;

    struct FakeCompanies;

    #[async_trait]
    impl CompanyDataProvider for FakeCompanies {
        fn name(&self) -> &str {
            "fake"
        }

        async fn company_data(&self, ticker: &str) -> anyhow::Result<CompanyData> {
            match ticker {
                "KO" => Ok(CompanyData {
                    long_name: "The Coca-Cola Company".to_string(),
                    address: Address {
                        address: "One Coca-Cola Plaza".to_string(),
                        city: "Atlanta".to_string(),
                        state: "GA".to_string(),
                        zip: "30313".to_string(),
                        country: "United States".to_string(),
                    },
                    ..Default::default()
                }),
                "NOADDR" => Ok(CompanyData {
                    long_name: "Nowhere Corp".to_string(),
                    ..Default::default()
                }),
                _ => Err(anyhow::anyhow!("unknown ticker {ticker}")),
            }
        }
    }

    fn at(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn usd() -> Option<Currency> {
        Some(Currency::new("USD"))
    }

    fn buy(time: NaiveDateTime, item: &str, quantity: f64, price: f64, fee: f64) -> RawTransaction {
        RawTransaction {
            time,
            direction: "buy".to_string(),
            item: item.to_string(),
            quantity,
            price,
            net_total: -(quantity * price + fee),
            currency: usd(),
            fee,
            fee_currency: usd(),
            reference: String::new(),
        }
    }

    fn sell(time: NaiveDateTime, item: &str, quantity: f64, price: f64, fee: f64) -> RawTransaction {
        RawTransaction {
            time,
            direction: "sell".to_string(),
            item: item.to_string(),
            quantity,
            price,
            net_total: quantity * price,
            currency: usd(),
            fee,
            fee_currency: usd(),
            reference: String::new(),
        }
    }

    fn dividend(time: NaiveDateTime, item: &str, net_total: f64) -> RawTransaction {
        RawTransaction {
            time,
            item: item.to_string(),
            net_total,
            currency: usd(),
            reference: format!("{item} - Divid. {net_total} USD"),
            ..Default::default()
        }
    }

    fn split(time: NaiveDateTime, item: &str, multiplier: f64) -> Transaction {
        Transaction {
            time,
            kind: TransactionKind::SplitMultiplier,
            item: item.to_string(),
            quantity: multiplier,
            price: 0.0,
            net_total: 0.0,
            currency: None,
            fee: 0.0,
            fee_currency: None,
            reference: "split".to_string(),
        }
    }

    /// Passes transactions of a fixed kind through untouched, for kinds the
    /// pattern rules never produce from a single row.
    struct Preclassified(HashMap<String, Transaction>);

    impl Classifier for Preclassified {
        fn classify(&self, raw: RawTransaction) -> Result<Transaction> {
            match self.0.get(&raw.reference) {
                Some(transaction) => Ok(transaction.clone()),
                None => PatternClassifier::default().classify(raw),
            }
        }
    }

    fn services(rates: Vec<Arc<dyn crate::core::rates::CurrencyRateProvider>>) -> Services {
        Services {
            store: Arc::new(KvReferenceStore::in_memory()),
            rates: Arc::new(RateConverter::new(rates)),
            companies: Arc::new(CompanyLookup::new(
                vec![Arc::new(FakeCompanies)],
                HashMap::new(),
            )),
        }
    }

    fn processor(transactions: Vec<RawTransaction>, reporting: &str) -> TransactionProcessor {
        processor_with(transactions, &PatternClassifier::default(), services(vec![]), reporting)
    }

    fn processor_with(
        transactions: Vec<RawTransaction>,
        classifier: &dyn Classifier,
        services: Services,
        reporting: &str,
    ) -> TransactionProcessor {
        TransactionProcessor::with_period(
            transactions,
            classifier,
            services,
            Currency::new(reporting),
            ReportPeriod::for_year(2023).unwrap(),
        )
        .unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn fifo_scenario() -> Vec<RawTransaction> {
        vec![
            sell(at(2023, 3, 5), "X", 12.0, 10.0, 2.0),
            buy(at(2023, 3, 1), "X", 10.0, 5.0, 1.0),
            buy(at(2023, 3, 3), "X", 5.0, 6.0, 1.0),
        ]
    }

    #[tokio::test]
    async fn test_fifo_cost_and_gain() {
        let mut processor = processor(fifo_scenario(), "USD");
        let result = processor.process().await.unwrap();

        assert_eq!(result.sales.len(), 1);
        let sale = &result.sales[0];
        assert!(close(sale.cost, 63.4), "cost was {}", sale.cost);
        assert!(close(sale.gain_loss, 56.6), "gain was {}", sale.gain_loss);
        assert_eq!(sale.lots.len(), 2);
        assert_eq!(sale.lots[0].bought_at, at(2023, 3, 1));
        assert!(close(sale.lots[0].quantity, 10.0));
        assert!(close(sale.lots[0].cost, 51.0));
        assert!(close(sale.lots[1].quantity, 2.0));
        assert!(close(sale.lots[1].cost, 12.4));
        assert_eq!(sale.lots[0].held_for.to_string(), "4d");

        assert!(close(result.gain_loss_by_currency[&Currency::new("USD")], 56.6));
        // proceeds before the sell fee
        assert!(close(result.total_revenues, 122.0));
        assert!(close(result.total_expenses, 65.4));
        assert!(result.shortfalls.is_empty());
    }

    #[tokio::test]
    async fn test_processing_twice_gives_the_same_result() {
        let mut processor = processor(fifo_scenario(), "USD");
        let first = processor.process().await.unwrap();
        let second = processor.process().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_sale_without_purchases_is_a_full_shortfall() {
        let transactions = vec![sell(at(2023, 2, 10), "Y", 5.0, 12.0, 0.0)];
        let mut processor = processor(transactions, "USD");
        let result = processor.process().await.unwrap();

        assert_eq!(result.shortfalls.len(), 1);
        assert_eq!(result.shortfalls[0].item, "Y");
        assert!(close(result.shortfalls[0].quantity, 5.0));
        assert_eq!(result.sales[0].cost, 0.0);
        assert!(result.sales[0].lots.is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_quantity_is_a_shortfall() {
        let transactions = vec![
            buy(at(2023, 2, 1), "Y", 3.0, 10.0, 0.0),
            sell(at(2023, 2, 10), "Y", 5.0, 12.0, 0.0),
        ];
        let mut processor = processor(transactions, "USD");
        let result = processor.process().await.unwrap();

        assert_eq!(result.shortfalls.len(), 1);
        assert_eq!(result.shortfalls[0].item, "Y");
        assert!(close(result.shortfalls[0].quantity, 2.0));
        assert!(close(result.sales[0].cost, 30.0));
        assert!(close(result.sales[0].shortfall, 2.0));
    }

    #[tokio::test]
    async fn test_purchase_after_sale_is_not_matched() {
        let transactions = vec![
            sell(at(2023, 2, 10), "Z", 1.0, 12.0, 0.0),
            buy(at(2023, 2, 11), "Z", 1.0, 10.0, 0.0),
        ];
        let mut processor = processor(transactions, "USD");
        let result = processor.process().await.unwrap();

        assert!(result.sales[0].lots.is_empty());
        assert!(close(result.sales[0].gain_loss, 12.0));
        assert_eq!(result.shortfalls.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicates_are_dropped() {
        let mut transactions = fifo_scenario();
        transactions.push(buy(at(2023, 3, 1), "X", 10.0, 5.0, 1.0));

        let mut with_duplicate = processor(transactions, "USD");
        assert_eq!(with_duplicate.transactions().count(), 3);

        let mut once = processor(fifo_scenario(), "USD");
        assert_eq!(
            with_duplicate.process().await.unwrap(),
            once.process().await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_rows_differing_in_item_and_quantity_are_kept() {
        let transactions = vec![
            buy(at(2023, 3, 1), "AB", 12.5, 8.0, 0.0),
            buy(at(2023, 3, 1), "AB1", 2.5, 40.0, 0.0),
        ];
        let processor = processor(transactions, "USD");
        let items: Vec<&str> = processor.transactions().map(|t| t.item.as_str()).collect();
        assert_eq!(items.len(), 2);
        assert!(items.contains(&"AB"));
        assert!(items.contains(&"AB1"));
    }

    #[tokio::test]
    async fn test_transactions_after_the_period_are_ignored() {
        let mut transactions = fifo_scenario();
        transactions.push(sell(at(2024, 1, 1), "X", 3.0, 10.0, 0.0));

        let mut processor = processor(transactions, "USD");
        assert_eq!(processor.transactions().count(), 3);
        let result = processor.process().await.unwrap();
        assert_eq!(result.sales.len(), 1);
    }

    #[tokio::test]
    async fn test_earlier_sales_consume_lots_without_being_reported() {
        let transactions = vec![
            buy(at(2022, 5, 1), "X", 10.0, 5.0, 0.0),
            buy(at(2022, 6, 1), "X", 10.0, 8.0, 0.0),
            sell(at(2022, 7, 1), "X", 10.0, 9.0, 0.0),
            sell(at(2023, 2, 1), "X", 5.0, 10.0, 0.0),
        ];
        let mut processor = processor(transactions, "USD");
        let result = processor.process().await.unwrap();

        assert_eq!(result.sales.len(), 1);
        // the 2022 sale used up the first lot
        assert!(close(result.sales[0].cost, 40.0));
        assert!(close(result.total_revenues, 50.0));
    }

    #[tokio::test]
    async fn test_dividends_and_withheld_tax() {
        let transactions = vec![
            dividend(at(2023, 4, 1), "KO", 100.0),
            dividend(at(2023, 4, 1), "KO", -15.0),
            dividend(at(2023, 7, 1), "KO", -50.0),
        ];
        let mut processor = processor(transactions, "USD");
        let result = processor.process().await.unwrap();

        let item = result.get_item("KO").unwrap();
        assert_eq!(item.country.name, "United States");
        assert_eq!(item.item.name, "The Coca-Cola Company");
        assert_eq!(item.currency, usd());
        assert!(close(item.dividend_income_reporting, 100.0));
        assert!(close(item.dividend_tax_paid, 65.0));
        assert!(close(result.total_dividend_tax_paid(), 65.0));
        assert!(close(result.total_dividend_income(), 100.0));
    }

    #[tokio::test]
    async fn test_known_item_is_taken_from_the_store() {
        let services = services(vec![]);
        let country = services.store.get_or_create_country("Switzerland").await.unwrap();
        services
            .store
            .create_item(Item {
                id: 0,
                country_id: country.id,
                currency_id: 1,
                code: "NESN".to_string(),
                name: "Nestlé".to_string(),
                address: String::new(),
            })
            .await
            .unwrap();

        let transactions = vec![dividend(at(2023, 4, 1), "NESN", 30.0)];
        let mut processor =
            processor_with(transactions, &PatternClassifier::default(), services, "USD");
        let result = processor.process().await.unwrap();
        assert_eq!(result.get_item("NESN").unwrap().country.name, "Switzerland");
    }

    #[tokio::test]
    async fn test_company_without_country_is_unknown() {
        let transactions = vec![dividend(at(2023, 4, 1), "NOADDR", 3.0)];
        let mut processor = processor(transactions, "USD");
        let result = processor.process().await.unwrap();
        assert!(result.countries.contains_key("Unknown"));
    }

    #[tokio::test]
    async fn test_missing_company_data_is_a_metadata_error() {
        let transactions = vec![dividend(at(2023, 4, 1), "NOPE", 3.0)];
        let mut processor = processor(transactions, "USD");
        let err = processor.process().await.unwrap_err();
        assert!(matches!(err, Error::Metadata { ref item, .. } if item == "NOPE"));
    }

    #[tokio::test]
    async fn test_amounts_are_converted_into_reporting_currency() {
        let cnb = Arc::new(StaticRates::new("cnb", true, &[("USD", "CZK", 20.0)]));
        let transactions = fifo_scenario();
        let mut processor = processor_with(
            transactions,
            &PatternClassifier::default(),
            services(vec![cnb.clone()]),
            "CZK",
        );
        let result = processor.process().await.unwrap();

        // gain stays in the sell currency
        assert!(close(result.gain_loss_by_currency[&Currency::new("USD")], 56.6));
        assert!(close(result.total_revenues, 122.0 * 20.0));
        assert!(close(result.total_expenses, 65.4 * 20.0));

        // one live quote per day, the rest from the store
        assert_eq!(cnb.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_rate_fails_processing() {
        let mut processor = processor(fifo_scenario(), "CZK");
        let err = processor.process().await.unwrap_err();
        assert!(matches!(err, Error::ConversionUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_split_rescales_open_lots() {
        let split = split(at(2023, 2, 1), "X", 2.0);
        let classifier = Preclassified(HashMap::from([(split.reference.clone(), split.clone())]));
        let transactions = vec![
            buy(at(2023, 1, 10), "X", 10.0, 8.0, 0.0),
            RawTransaction {
                time: split.time,
                item: split.item.clone(),
                quantity: split.quantity,
                reference: split.reference.clone(),
                ..Default::default()
            },
            sell(at(2023, 3, 1), "X", 20.0, 5.0, 0.0),
        ];

        let mut processor = processor_with(transactions, &classifier, services(vec![]), "USD");
        let result = processor.process().await.unwrap();

        let sale = &result.sales[0];
        assert!(result.shortfalls.is_empty());
        assert!(close(sale.cost, 80.0));
        assert!(close(sale.gain_loss, 20.0));
    }

    #[tokio::test]
    async fn test_currency_is_backfilled_for_spin_offs() {
        let mut spin_off = buy(at(2023, 1, 5), "VTRS", 5.0, 3.0, 0.0);
        spin_off.direction = String::new();
        spin_off.reference = "Spin-off VTRS".to_string();
        let transactions = vec![
            buy(at(2022, 1, 5), "VTRS", 1.0, 10.0, 0.0),
            spin_off,
            sell(at(2023, 6, 1), "VTRS", 5.0, 12.0, 0.0),
        ];

        let mut processor = processor(transactions, "USD");
        let result = processor.process().await.unwrap();
        let sale = &result.sales[0];
        // one unit from the 2022 lot, the spin-off lot carries no cost
        assert!(close(sale.cost, 10.0));
        assert!(processor.transactions().all(|t| t.currency.is_some()));
    }

    #[tokio::test]
    async fn test_unknown_row_fails_construction() {
        let mut row = dividend(at(2023, 4, 1), "KO", 1.0);
        row.reference = "mystery".to_string();
        let err = TransactionProcessor::with_period(
            vec![row],
            &PatternClassifier::default(),
            services(vec![]),
            Currency::new("USD"),
            ReportPeriod::for_year(2023).unwrap(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Classification { .. }));
    }

    #[tokio::test]
    async fn test_write_transactions_lists_newest_first() {
        let processor = processor(fifo_scenario(), "USD");
        let mut out = Vec::new();
        processor.write_transactions(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Sell on 2023-03-05"));
        assert!(lines[2].contains("Buy on 2023-03-01"));
    }
}
