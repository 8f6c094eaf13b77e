//! Currency conversion backed by persisted multipliers

use super::currency::Currency;
use super::error::{Error, Result};
use super::rates::RateConverter;
use super::reference::ReferenceStore;
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::debug;

/// Converts amounts at the daily rate of a transaction, consulting the store
/// before any provider and persisting every live multiplier it obtains.
#[derive(Clone)]
pub struct ConversionCache {
    store: Arc<dyn ReferenceStore>,
    rates: Arc<RateConverter>,
}

impl ConversionCache {
    pub fn new(store: Arc<dyn ReferenceStore>, rates: Arc<RateConverter>) -> Self {
        Self { store, rates }
    }

    pub async fn convert(
        &self,
        amount: f64,
        from: &Currency,
        to: &Currency,
        at: NaiveDateTime,
    ) -> Result<f64> {
        if from == to {
            return Ok(amount);
        }

        let date = at.date();
        if let Some(multiplier) = self.stored(date, from, to).await {
            debug!("Stored multiplier {}/{} on {}: {}", from, to, date, multiplier);
            return Ok(amount * multiplier);
        }

        if self.rates.is_reversible(from, to).await {
            if let Some(multiplier) = self.stored(date, to, from).await {
                debug!("Stored inverse multiplier {}/{} on {}: {}", to, from, date, multiplier);
                return Ok(amount / multiplier);
            }
        }

        let multiplier = self
            .rates
            .multiplier(from, to, date)
            .await
            .map_err(|e| Error::ConversionUnavailable {
                from: from.to_string(),
                to: to.to_string(),
                date,
                reason: format!("{e:#}"),
            })?;

        self.store
            .store_multiplier(date, from, to, multiplier)
            .await
            .map_err(Error::Store)?;

        Ok(amount * multiplier)
    }

    /// A failing read counts as a miss.
    async fn stored(&self, date: chrono::NaiveDate, from: &Currency, to: &Currency) -> Option<f64> {
        match self.store.get_multiplier(date, from, to).await {
            Ok(Some(multiplier)) if multiplier.is_finite() && multiplier > 0.0 => Some(multiplier),
            Ok(_) => None,
            Err(e) => {
                debug!("Unable to read multiplier {}/{} on {}: {:#}", from, to, date, e);
                None
            }
        }
    }
}
