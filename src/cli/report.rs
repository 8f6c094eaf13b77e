use super::ui;
use crate::core::currency::Currency;
use crate::core::period::ReportPeriod;
use crate::core::rates::RateConverter;
use crate::core::result::{ProcessCountry, ProcessResult};
use crate::core::TransactionProcessor;
use anyhow::Result;
use chrono::{Local, NaiveDate};
use comfy_table::Cell;
use futures::future::join_all;
use std::collections::BTreeMap;
use tracing::debug;

impl ProcessResult {
    pub fn display_as_report(
        &self,
        period: &ReportPeriod,
        converted_gains: &BTreeMap<Currency, Option<f64>>,
    ) -> String {
        let reporting = self.reporting_currency.code();

        let mut output = format!(
            "{}\n",
            ui::style_text(
                &format!("Tax report for {period} ({reporting})"),
                ui::StyleType::Title
            )
        );

        for (name, country) in &self.countries {
            output.push_str(&format!(
                "\nCountry: {}\n{}\n",
                ui::style_text(name, ui::StyleType::TotalLabel),
                country_table(country, reporting)
            ));
        }

        if !self.sales.is_empty() {
            output.push_str(&format!(
                "\n{}\n{}\n",
                ui::style_text("Sales", ui::StyleType::TotalLabel),
                self.sales_table()
            ));
        }

        output.push_str(&format!(
            "\n{}\n{}\n",
            ui::style_text("Gain/Loss", ui::StyleType::TotalLabel),
            self.gain_loss_table(converted_gains)
        ));

        output.push_str(&format!(
            "\nTotal revenues ({reporting}): {}\nTotal expenses ({reporting}): {}\n\
             Total dividend income ({reporting}): {}\nTotal dividend tax paid ({reporting}): {}\n",
            ui::style_text(&format!("{:.2}", self.total_revenues), ui::StyleType::TotalValue),
            ui::style_text(&format!("{:.2}", self.total_expenses), ui::StyleType::TotalValue),
            ui::style_text(
                &format!("{:.2}", self.total_dividend_income()),
                ui::StyleType::TotalValue
            ),
            ui::style_text(
                &format!("{:.2}", self.total_dividend_tax_paid()),
                ui::StyleType::TotalValue
            ),
        ));

        if !self.shortfalls.is_empty() {
            output.push_str(&format!(
                "\n{}\n",
                ui::style_text("Sales without matching purchases:", ui::StyleType::Error)
            ));
            for shortfall in &self.shortfalls {
                output.push_str(&format!(
                    "  {} sold on {}: {:.4} items unmatched\n",
                    shortfall.item,
                    shortfall.time.format("%Y-%m-%d %H:%M"),
                    shortfall.quantity
                ));
            }
        }

        output
    }

    fn sales_table(&self) -> comfy_table::Table {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Item"),
            ui::header_cell("Sold"),
            ui::header_cell("Quantity"),
            ui::header_cell("Proceeds"),
            ui::header_cell("Cost"),
            ui::header_cell("Gain/Loss"),
            ui::header_cell("Held"),
        ]);

        for sale in &self.sales {
            // shortest holding of the matched lots
            let held = sale
                .lots
                .iter()
                .map(|lot| lot.held_for)
                .min_by_key(|held| {
                    (
                        held.years,
                        held.months,
                        held.days,
                        held.hours,
                        held.minutes,
                        held.seconds,
                    )
                })
                .map(|held| held.to_string());

            table.add_row(vec![
                Cell::new(&sale.item),
                Cell::new(sale.time.format("%Y-%m-%d").to_string()),
                Cell::new(format!("{:.4}", sale.quantity)),
                Cell::new(format!("{:.2} {}", sale.net_total, sale.currency)),
                Cell::new(format!("{:.2} {}", sale.cost, sale.currency)),
                ui::gain_loss_cell(sale.gain_loss),
                ui::format_optional_cell(held, |h| h),
            ]);
        }
        table
    }

    fn gain_loss_table(
        &self,
        converted_gains: &BTreeMap<Currency, Option<f64>>,
    ) -> comfy_table::Table {
        let reporting = self.reporting_currency.code();
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Currency"),
            ui::header_cell("Gain/Loss"),
            ui::header_cell(&format!("Today in {reporting}")),
        ]);

        for (currency, amount) in &self.gain_loss_by_currency {
            let today = converted_gains.get(currency).copied().flatten();
            table.add_row(vec![
                Cell::new(currency.code()),
                ui::gain_loss_cell(*amount),
                ui::format_optional_cell(today, |v| format!("{v:.2}")),
            ]);
        }
        table
    }
}

fn country_table(country: &ProcessCountry, reporting: &str) -> comfy_table::Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Address"),
        ui::header_cell(&format!("Dividend income ({reporting})")),
        ui::header_cell("Tax paid"),
        ui::header_cell(&format!("Tax paid ({reporting})")),
    ]);

    for item in &country.items {
        let currency = item.currency.as_ref().map_or("", |c| c.code());
        table.add_row(vec![
            Cell::new(&item.item.code),
            Cell::new(&item.item.name),
            Cell::new(&item.item.address),
            ui::amount_cell(item.dividend_income_reporting),
            Cell::new(format!("{:.2} {}", item.dividend_tax_paid, currency)),
            ui::amount_cell(item.dividend_tax_paid_reporting),
        ]);
    }

    table.add_row(vec![
        Cell::new(ui::style_text("Total", ui::StyleType::TotalLabel)),
        Cell::new(""),
        Cell::new(""),
        ui::total_cell(country.total_dividend_income),
        Cell::new(""),
        ui::total_cell(country.total_dividend_tax_paid),
    ]);
    table
}

/// Gains per currency converted at `today`'s rate; `None` where no rate is
/// available.
pub async fn convert_gains(
    result: &ProcessResult,
    rates: &RateConverter,
    today: NaiveDate,
) -> BTreeMap<Currency, Option<f64>> {
    let reporting = &result.reporting_currency;
    let conversions = result
        .gain_loss_by_currency
        .iter()
        .map(|(currency, amount)| async move {
            let value = match rates.multiplier(currency, reporting, today).await {
                Ok(multiplier) => Some(amount * multiplier),
                Err(e) => {
                    debug!("Unable to convert {} gain into {}: {:#}", currency, reporting, e);
                    None
                }
            };
            (currency.clone(), value)
        });

    join_all(conversions).await.into_iter().collect()
}

pub async fn run(processor: &mut TransactionProcessor, rates: &RateConverter) -> Result<()> {
    let pb = ui::new_spinner(&format!("Processing transactions for {}...", processor.period()));
    let result = processor.process().await;
    pb.finish_and_clear();
    let result = result?;

    let pb = ui::new_spinner("Converting gains at today's rates...");
    let converted = convert_gains(&result, rates, Local::now().date_naive()).await;
    pb.finish_and_clear();

    println!("{}", result.display_as_report(processor.period(), &converted));
    Ok(())
}
