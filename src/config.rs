//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section carries serde defaults, so a partial file (or an empty
//! one) is still a valid configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub odds: OddsDefaults,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Credit granted to an account on first contact.
    #[serde(default = "default_starting_credit")]
    pub starting_credit: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_credit: default_starting_credit(),
        }
    }
}

/// Values applied when an odds spec leaves a field out.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct OddsDefaults {
    #[serde(default = "default_max_bet")]
    pub max_bet: i64,
    /// Bets per user per odds epoch, 0 = unlimited.
    #[serde(default = "default_user_limit")]
    pub user_limit: u32,
    #[serde(default = "default_min_bet")]
    pub min_bet: i64,
    /// Raw ratio points added to the underdog's loss ratio.
    #[serde(default = "default_vig")]
    pub vig: i64,
}

impl Default for OddsDefaults {
    fn default() -> Self {
        Self {
            max_bet: default_max_bet(),
            user_limit: default_user_limit(),
            min_bet: default_min_bet(),
            vig: default_vig(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_port(),
        }
    }
}

fn default_starting_credit() -> i64 {
    1000
}

fn default_max_bet() -> i64 {
    20_000
}

fn default_user_limit() -> u32 {
    2
}

fn default_min_bet() -> i64 {
    20
}

fn default_vig() -> i64 {
    20
}

fn default_database_url() -> String {
    "sqlite://ringside.sqlite".to_string()
}

fn default_port() -> u16 {
    3000
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }
}
