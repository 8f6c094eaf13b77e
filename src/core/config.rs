use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CnbProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

/// Rate and company data providers; rate providers are tried in the order
/// CNB, Yahoo.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub cnb: Option<CnbProviderConfig>,
    pub yahoo: Option<YahooProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            cnb: Some(CnbProviderConfig {
                base_url: "https://www.cnb.cz".to_string(),
            }),
            yahoo: Some(YahooProviderConfig {
                base_url: "https://query1.finance.yahoo.com".to_string(),
            }),
        }
    }
}

/// Optional replacements for the built-in classification patterns.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ClassifierConfig {
    pub buy: Option<String>,
    pub sell: Option<String>,
    pub deposit: Option<String>,
    pub withdrawal: Option<String>,
    pub deposit_transfer_fee: Option<String>,
    pub capital_gain: Option<String>,
    pub dividend: Option<String>,
    pub fee: Option<String>,
    pub spin_off: Option<String>,
    pub return_of_principal: Option<String>,
    pub merger: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Reporting currency
    pub currency: String,
    /// Reported calendar year, defaults to the previous one
    pub year: Option<i32>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Ticker renames used for company lookups, e.g. `VOW3: VOW3.DE`
    #[serde(default)]
    pub ticker_aliases: HashMap<String, String>,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "taxlot", "taxlot")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "taxlot", "taxlot")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
