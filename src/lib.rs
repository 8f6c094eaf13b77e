pub mod cli;
pub mod core;
pub mod importer;
pub mod providers;
pub mod store;

use crate::core::cache::Cache;
use crate::core::classify::{ClassifierPatterns, PatternClassifier};
use crate::core::company::{CompanyDataProvider, CompanyLookup};
use crate::core::config::AppConfig;
use crate::core::currency::CurrencyRegistry;
use crate::core::period::ReportPeriod;
use crate::core::rates::{CurrencyRateProvider, RateConverter};
use crate::core::reference::ReferenceStore;
use crate::core::{Services, TransactionProcessor};
use crate::importer::{CsvImporter, Importer};
use crate::providers::cnb::CnbRateProvider;
use crate::providers::yahoo_finance::{YahooCompanyProvider, YahooCurrencyProvider};
use crate::store::KeyValueStore;
use crate::store::reference::KvReferenceStore;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Report,
    Transactions,
}

pub async fn run_command(
    command: AppCommand,
    config_path: Option<&str>,
    files: &[PathBuf],
) -> Result<()> {
    info!("taxlot starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let registry = CurrencyRegistry::default();
    let reporting_currency = registry
        .parse(&config.currency)
        .context("Invalid reporting currency in config")?;
    let period = match config.year {
        Some(year) => ReportPeriod::for_year(year)?,
        None => ReportPeriod::previous_year(),
    };

    let importer = CsvImporter::new(&registry);
    let mut transactions = Vec::new();
    for file in files {
        transactions.extend(importer.import(file)?);
    }
    info!("Imported {} transactions from {} files", transactions.len(), files.len());

    let data_path = config.default_data_path()?;
    let kv_store = KeyValueStore::open(&data_path)?;
    let store: Arc<dyn ReferenceStore> =
        Arc::new(KvReferenceStore::new(&kv_store, registry.clone())?);

    // Rate providers in fallback order
    let mut rate_providers: Vec<Arc<dyn CurrencyRateProvider>> = Vec::new();
    if let Some(cnb) = &config.providers.cnb {
        rate_providers.push(Arc::new(CnbRateProvider::new(&cnb.base_url)));
    }
    let mut company_providers: Vec<Arc<dyn CompanyDataProvider>> = Vec::new();
    if let Some(yahoo) = &config.providers.yahoo {
        rate_providers.push(Arc::new(YahooCurrencyProvider::new(
            &yahoo.base_url,
            Arc::new(Cache::new()),
        )));
        company_providers.push(Arc::new(YahooCompanyProvider::new(
            &yahoo.base_url,
            Arc::new(Cache::new()),
        )));
    }

    let rates = Arc::new(RateConverter::new(rate_providers));
    let services = Services {
        store,
        rates: Arc::clone(&rates),
        companies: Arc::new(CompanyLookup::new(
            company_providers,
            config.ticker_aliases.clone(),
        )),
    };

    let classifier = PatternClassifier::new(ClassifierPatterns::from_config(&config.classifier)?);
    let mut processor = TransactionProcessor::with_period(
        transactions,
        &classifier,
        services,
        reporting_currency,
        period,
    )?;

    match command {
        AppCommand::Report => cli::report::run(&mut processor, &rates).await,
        AppCommand::Transactions => cli::transactions::run(&processor),
    }
}
