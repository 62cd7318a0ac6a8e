//! Star schema layout: table names (configurable) and column names (fixed).

pub const STATION_ID: &str = "idStation";
pub const DATE_ID: &str = "idDate";
pub const FUEL_ID: &str = "idCarburant";
pub const FUEL_NAME: &str = "nom";
pub const PRICE_ID: &str = "idPrix";

pub const DEFAULT_SCHEMA: &str = "carbu_db";

/// Tables the updater reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub station: String,
    pub date: String,
    pub fuel: String,
    pub price: String,
    /// Table scanned for `MAX(idPrix)`. Usually the same as `price`; a
    /// deployment that loads into a staging fact table while ids live in
    /// the production copy points this at the production copy.
    pub price_key: String,
}

impl Tables {
    /// Default table names under `schema`.
    pub fn in_schema(schema: &str) -> Self {
        let qualify = |name: &str| {
            if schema.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", schema, name)
            }
        };
        let price = qualify("fact_prix");
        Self {
            station: qualify("dim_station"),
            date: qualify("dim_date"),
            fuel: qualify("dim_carburant"),
            price_key: price.clone(),
            price,
        }
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self::in_schema(DEFAULT_SCHEMA)
    }
}
