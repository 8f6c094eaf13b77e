//! Lot ledger and FIFO matching of sales against open purchases.

use super::transaction::{Transaction, TransactionKind};

/// Quantities at or below this are treated as zero.
pub const QUANTITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub transaction: Transaction,
    /// Buy only: quantity not yet consumed by sales, in post-split units
    pub remaining_buy_quantity: f64,
    /// Buy only: product of the split multipliers applied to the lot
    pub split_factor: f64,
    /// Sell only: cost basis in the sell currency once matched
    pub resolved_buy_cost: Option<f64>,
}

impl LedgerEntry {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            remaining_buy_quantity: 0.0,
            split_factor: 1.0,
            resolved_buy_cost: None,
        }
    }

    fn reset(&mut self) {
        self.remaining_buy_quantity = match self.transaction.kind {
            TransactionKind::Buy => self.transaction.quantity,
            _ => 0.0,
        };
        self.split_factor = 1.0;
        self.resolved_buy_cost = None;
    }

    pub fn is_open(&self) -> bool {
        self.transaction.kind == TransactionKind::Buy
            && self.remaining_buy_quantity > QUANTITY_EPSILON
    }

    /// Purchased quantity expressed in post-split units.
    pub fn effective_quantity(&self) -> f64 {
        self.transaction.quantity * self.split_factor
    }

    /// Unit price expressed in post-split units.
    pub fn effective_price(&self) -> f64 {
        self.transaction.price / self.split_factor
    }
}

/// Part of a sale covered by one purchase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LotMatch {
    /// Index of the buy entry in the ledger
    pub entry: usize,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchOutcome {
    /// Matched lots from the oldest purchase
    pub lots: Vec<LotMatch>,
    /// Quantity no open purchase could cover
    pub shortfall: f64,
}

/// Classified transactions ordered from the newest to the oldest.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new(mut transactions: Vec<Transaction>) -> Self {
        // stable, so same-time rows keep their input order
        transactions.sort_by(|a, b| b.time.cmp(&a.time));
        Self {
            entries: transactions.into_iter().map(LedgerEntry::new).collect(),
        }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [LedgerEntry] {
        &mut self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&LedgerEntry> {
        self.entries.get(index)
    }

    /// Entry indices from the oldest to the newest.
    pub fn oldest_first(&self) -> impl Iterator<Item = usize> + use<> {
        (0..self.entries.len()).rev()
    }

    /// Reopens every purchase at its full quantity and forgets resolved costs.
    pub fn reset(&mut self) {
        self.entries.iter_mut().for_each(LedgerEntry::reset);
    }

    /// Covers the sale at `sell` with the oldest open purchases of the same
    /// item made no later than the sale, consuming the matched quantities.
    pub fn match_sell(&mut self, sell: usize) -> MatchOutcome {
        let Some(sell_entry) = self.entries.get(sell) else {
            return MatchOutcome::default();
        };
        let item = sell_entry.transaction.item.clone();
        let sold_at = sell_entry.transaction.time;
        let mut needed = sell_entry.transaction.quantity;

        let mut outcome = MatchOutcome::default();
        for index in (0..self.entries.len()).rev() {
            if needed <= QUANTITY_EPSILON {
                break;
            }

            let entry = &mut self.entries[index];
            if entry.transaction.item != item || !entry.is_open() {
                continue;
            }
            if entry.transaction.time > sold_at {
                // bought after the sale
                continue;
            }

            let taken = entry.remaining_buy_quantity.min(needed);
            entry.remaining_buy_quantity -= taken;
            needed -= taken;
            outcome.lots.push(LotMatch {
                entry: index,
                quantity: taken,
            });
        }

        if needed > QUANTITY_EPSILON {
            outcome.shortfall = needed;
        }
        outcome
    }

    /// Rescales the open lots of the split item bought at or before the split.
    /// Returns the number of affected lots.
    pub fn apply_split(&mut self, split: usize) -> usize {
        let Some(split_entry) = self.entries.get(split) else {
            return 0;
        };
        let item = split_entry.transaction.item.clone();
        let split_at = split_entry.transaction.time;
        let multiplier = split_entry.transaction.quantity;

        let mut affected = 0;
        for entry in self.entries.iter_mut() {
            if entry.transaction.item == item
                && entry.is_open()
                && entry.transaction.time <= split_at
            {
                entry.split_factor *= multiplier;
                entry.remaining_buy_quantity *= multiplier;
                affected += 1;
            }
        }
        affected
    }

    pub fn set_resolved_cost(&mut self, sell: usize, cost: f64) {
        if let Some(entry) = self.entries.get_mut(sell) {
            entry.resolved_buy_cost = Some(cost);
        }
    }
}
