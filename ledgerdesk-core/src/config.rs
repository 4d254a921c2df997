use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which tax rate wins when both an auto-calculated and a selected rate exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxPrecedence {
    #[default]
    Auto,
    Manual,
}

impl FromStr for TaxPrecedence {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(TaxPrecedence::Auto),
            "manual" => Ok(TaxPrecedence::Manual),
            _ => Err(ConfigError::Invalid {
                name: "TAX_RATE_PRECEDENCE",
                value: s.to_string(),
            }),
        }
    }
}

/// Runtime configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    /// Accounting backend serving reference data and tax lookups
    pub api_base_url: String,
    /// Assistant chat backend
    pub assistant_url: String,
    pub chat_history_limit: usize,
    pub search_debounce_ms: u64,
    pub tax_precedence: TaxPrecedence,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            database_url: "postgres://localhost/ledgerdesk".to_string(),
            api_base_url: "http://localhost:5000/api".to_string(),
            assistant_url: "http://localhost:5000/api/assistant".to_string(),
            chat_history_limit: 10,
            search_debounce_ms: 300,
            tax_precedence: TaxPrecedence::Auto,
        }
    }
}

impl AppConfig {
    /// Reads every setting from the process environment, falling back to
    /// defaults for unset variables. Call `dotenv().ok()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`AppConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            server_host: lookup("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse(&lookup, "SERVER_PORT", defaults.server_port)?,
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            api_base_url: lookup("API_BASE_URL").unwrap_or(defaults.api_base_url),
            assistant_url: lookup("ASSISTANT_URL").unwrap_or(defaults.assistant_url),
            chat_history_limit: parse(&lookup, "CHAT_HISTORY_LIMIT", defaults.chat_history_limit)?,
            search_debounce_ms: parse(&lookup, "SEARCH_DEBOUNCE_MS", defaults.search_debounce_ms)?,
            tax_precedence: match lookup("TAX_RATE_PRECEDENCE") {
                Some(raw) => raw.parse()?,
                None => defaults.tax_precedence,
            },
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}
