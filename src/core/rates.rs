//! Live exchange rates from an ordered list of providers

use super::cache::Cache;
use super::currency::Currency;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

/// A source of historical exchange rates.
#[async_trait]
pub trait CurrencyRateProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the provider quotes `from` in units of `to`.
    async fn supports(&self, from: &Currency, to: &Currency) -> bool;

    /// Whether a quote may be inverted to serve the opposite pair. True for
    /// middle rates, false for bid or ask quotes.
    fn allows_reverse(&self) -> bool;

    /// Amount of `to` for one unit of `from` valid at `at`.
    async fn get_rate(&self, from: &Currency, to: &Currency, at: NaiveDate) -> Result<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Route {
    provider: usize,
    reversed: bool,
}

/// Picks the first provider able to quote a pair, directly or inverted, and
/// remembers it for the next request of the same pair.
pub struct RateConverter {
    providers: Vec<Arc<dyn CurrencyRateProvider>>,
    routes: Cache<(Currency, Currency), Route>,
}

impl RateConverter {
    pub fn new(providers: Vec<Arc<dyn CurrencyRateProvider>>) -> Self {
        Self {
            providers,
            routes: Cache::new(),
        }
    }

    /// Multiplier converting an amount in `from` into `to` at `at`.
    pub async fn multiplier(&self, from: &Currency, to: &Currency, at: NaiveDate) -> Result<f64> {
        if from == to {
            return Ok(1.0);
        }

        let pair = (from.clone(), to.clone());
        if let Some(route) = self.routes.get(&pair).await {
            match self.quote(route, from, to, at).await {
                Ok(multiplier) => return Ok(multiplier),
                Err(e) => debug!("Known route for {}/{} failed: {:#}", from, to, e),
            }
        }

        let mut last_error = None;
        for (index, provider) in self.providers.iter().enumerate() {
            let route = if provider.supports(from, to).await {
                Route {
                    provider: index,
                    reversed: false,
                }
            } else if provider.allows_reverse() && provider.supports(to, from).await {
                Route {
                    provider: index,
                    reversed: true,
                }
            } else {
                continue;
            };

            match self.quote(route, from, to, at).await {
                Ok(multiplier) => {
                    self.routes.put(pair, route).await;
                    return Ok(multiplier);
                }
                Err(e) => {
                    debug!("{} failed for {}/{}: {:#}", provider.name(), from, to, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("No provider supports {}/{}", from, to)))
    }

    /// True when some provider quotes `to`/`from` and allows inverting it, so
    /// a stored `to`→`from` multiplier can serve `from`→`to`.
    pub async fn is_reversible(&self, from: &Currency, to: &Currency) -> bool {
        for provider in &self.providers {
            if provider.allows_reverse() && provider.supports(to, from).await {
                return true;
            }
        }
        false
    }

    async fn quote(&self, route: Route, from: &Currency, to: &Currency, at: NaiveDate) -> Result<f64> {
        let provider = self
            .providers
            .get(route.provider)
            .ok_or_else(|| anyhow!("Unknown provider index {}", route.provider))?;

        let rate = if route.reversed {
            provider.get_rate(to, from, at).await?
        } else {
            provider.get_rate(from, to, at).await?
        };

        if !rate.is_finite() || rate <= 0.0 {
            return Err(anyhow!(
                "{} returned invalid rate {} for {}/{}",
                provider.name(),
                rate,
                from,
                to
            ));
        }

        Ok(if route.reversed { 1.0 / rate } else { rate })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider quoting fixed rates, counting every request.
    pub(crate) struct StaticRates {
        pub name: &'static str,
        pub rates: HashMap<(Currency, Currency), f64>,
        pub reversible: bool,
        pub calls: AtomicUsize,
    }

    impl StaticRates {
        pub(crate) fn new(name: &'static str, reversible: bool, rates: &[(&str, &str, f64)]) -> Self {
            Self {
                name,
                rates: rates
                    .iter()
                    .map(|(from, to, rate)| ((Currency::new(from), Currency::new(to)), *rate))
                    .collect(),
                reversible,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CurrencyRateProvider for StaticRates {
        fn name(&self) -> &str {
            self.name
        }

        async fn supports(&self, from: &Currency, to: &Currency) -> bool {
            self.rates.contains_key(&(from.clone(), to.clone()))
        }

        fn allows_reverse(&self) -> bool {
            self.reversible
        }

        async fn get_rate(&self, from: &Currency, to: &Currency, _at: NaiveDate) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.rates
                .get(&(from.clone(), to.clone()))
                .copied()
                .ok_or_else(|| anyhow!("{} has no rate for {}/{}", self.name, from, to))
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn test_identity() {
        let converter = RateConverter::new(vec![]);
        let usd = Currency::new("USD");
        assert_eq!(converter.multiplier(&usd, &usd, day()).await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_direct_and_reversed_rates() {
        let cnb = Arc::new(StaticRates::new("cnb", true, &[("USD", "CZK", 20.0)]));
        let converter = RateConverter::new(vec![cnb.clone()]);
        let (usd, czk) = (Currency::new("USD"), Currency::new("CZK"));

        assert_eq!(converter.multiplier(&usd, &czk, day()).await.unwrap(), 20.0);
        assert_eq!(converter.multiplier(&czk, &usd, day()).await.unwrap(), 0.05);
        assert!(converter.is_reversible(&czk, &usd).await);
        assert!(!converter.is_reversible(&usd, &czk).await);
    }

    #[tokio::test]
    async fn test_non_reversible_provider_is_not_inverted() {
        let yahoo = Arc::new(StaticRates::new("yahoo", false, &[("USD", "EUR", 0.9)]));
        let converter = RateConverter::new(vec![yahoo]);
        let (usd, eur) = (Currency::new("USD"), Currency::new("EUR"));

        assert_eq!(converter.multiplier(&usd, &eur, day()).await.unwrap(), 0.9);
        let err = converter.multiplier(&eur, &usd, day()).await.unwrap_err();
        assert_eq!(err.to_string(), "No provider supports EUR/USD");
        assert!(!converter.is_reversible(&eur, &usd).await);
    }

    #[tokio::test]
    async fn test_falls_through_providers_in_order() {
        let first = Arc::new(StaticRates::new("first", true, &[("EUR", "CZK", 25.0)]));
        let second = Arc::new(StaticRates::new("second", false, &[("USD", "CZK", 22.0)]));
        let converter = RateConverter::new(vec![first.clone(), second.clone()]);
        let (usd, czk) = (Currency::new("USD"), Currency::new("CZK"));

        assert_eq!(converter.multiplier(&usd, &czk, day()).await.unwrap(), 22.0);
        assert_eq!(first.calls(), 0);

        // the remembered route goes straight to the second provider
        assert_eq!(converter.multiplier(&usd, &czk, day()).await.unwrap(), 22.0);
        assert_eq!(second.calls(), 2);
        assert_eq!(first.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_rate_is_rejected() {
        let broken = Arc::new(StaticRates::new("broken", false, &[("USD", "CZK", 0.0)]));
        let converter = RateConverter::new(vec![broken]);
        let err = converter
            .multiplier(&Currency::new("USD"), &Currency::new("CZK"), day())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid rate"));
    }
}
