use anyhow::{Context, Result};

use collector::FEED_URL;

use crate::normalize::DEFAULT_REGION_CODE;
use crate::schema::{Tables, DEFAULT_SCHEMA};

const DEFAULT_MAX_CONNECTIONS: u32 = 2;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: String,
    pub feed_url: String,
    pub region_code: String,
    pub tables: Tables,
    pub max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let schema = var("WAREHOUSE_SCHEMA", DEFAULT_SCHEMA);
        let defaults = Tables::in_schema(&schema);
        let price = var("PRICE_TABLE", &defaults.price);
        let tables = Tables {
            station: var("STATION_TABLE", &defaults.station),
            date: var("DATE_TABLE", &defaults.date),
            fuel: var("FUEL_TABLE", &defaults.fuel),
            price_key: var("PRICE_KEY_TABLE", &price),
            price,
        };

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("DB_MAX_CONNECTIONS is not a number: {}", v))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            db_url: lookup("DB_URL").context("DB_URL env var missing")?,
            feed_url: var("FEED_URL", FEED_URL),
            region_code: var("REGION_CODE", DEFAULT_REGION_CODE),
            tables,
            max_connections,
        })
    }
}
