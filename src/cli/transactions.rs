use super::ui;
use crate::core::TransactionProcessor;
use anyhow::{Context, Result};

/// Prints the deduplicated, classified transactions from the newest.
pub fn run(processor: &TransactionProcessor) -> Result<()> {
    println!(
        "{} {}\n",
        ui::style_text("Transactions up to", ui::StyleType::Title),
        ui::style_text(
            &processor.period().end.format("%Y-%m-%d").to_string(),
            ui::StyleType::Subtle
        )
    );
    processor
        .print_transactions()
        .context("Failed to print transactions")?;
    println!(
        "\n{} {}",
        ui::style_text("Total:", ui::StyleType::TotalLabel),
        processor.transactions().count()
    );
    Ok(())
}
