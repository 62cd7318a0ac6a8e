//! Rows and dimension entries exchanged between the sync stages.
//!
//! Serialized field names are the warehouse column names of the star schema.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Fuels
// =============================================================================

/// Fuel types published by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Fuel {
    Gazole,
    Gplc,
    Sp95,
    Sp98,
    E10,
    E85,
}

impl Fuel {
    /// Order in which facts are emitted for each station.
    ///
    /// Price ids are assigned row-major then fuel-minor along this list, so
    /// reordering it changes which id a given (station, fuel) pair receives.
    pub const CANONICAL_ORDER: [Fuel; 6] = [
        Fuel::Gazole,
        Fuel::Gplc,
        Fuel::Sp95,
        Fuel::Sp98,
        Fuel::E10,
        Fuel::E85,
    ];

    /// Name stored in the fuel dimension (`nom`).
    pub fn name(self) -> &'static str {
        match self {
            Fuel::Gazole => "gazole",
            Fuel::Gplc => "gplc",
            Fuel::Sp95 => "sp95",
            Fuel::Sp98 => "sp98",
            Fuel::E10 => "e10",
            Fuel::E85 => "e85",
        }
    }

    /// Feed column carrying this fuel's price.
    pub fn price_column(self) -> &'static str {
        match self {
            Fuel::Gazole => "gazole_prix",
            Fuel::Gplc => "gplc_prix",
            Fuel::Sp95 => "sp95_prix",
            Fuel::Sp98 => "sp98_prix",
            Fuel::E10 => "e10_prix",
            Fuel::E85 => "e85_prix",
        }
    }
}

impl fmt::Display for Fuel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key returned for a fuel name the dimension does not know.
pub const UNKNOWN_FUEL_KEY: i64 = 0;

/// Fuel dimension keys resolved for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuelKeys(BTreeMap<Fuel, i64>);

impl FuelKeys {
    pub fn insert(&mut self, fuel: Fuel, key: i64) {
        self.0.insert(fuel, key);
    }

    /// Key for `fuel`, the unknown sentinel if it was never resolved.
    pub fn get(&self, fuel: Fuel) -> i64 {
        self.0.get(&fuel).copied().unwrap_or(UNKNOWN_FUEL_KEY)
    }

    /// Fuels that resolved to the unknown sentinel, in canonical order.
    pub fn unknown(&self) -> Vec<Fuel> {
        Fuel::CANONICAL_ORDER
            .into_iter()
            .filter(|&f| self.get(f) == UNKNOWN_FUEL_KEY)
            .collect()
    }
}

impl FromIterator<(Fuel, i64)> for FuelKeys {
    fn from_iter<I: IntoIterator<Item = (Fuel, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// One normalized station observation.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub station_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub postal_code: i64,
    pub city: String,
    pub address: String,
    pub department_code: i64,
    pub prices: BTreeMap<Fuel, Option<f64>>,
}

impl SnapshotRow {
    /// Reported price for `fuel`; `None` when absent.
    pub fn price(&self, fuel: Fuel) -> Option<f64> {
        self.prices.get(&fuel).copied().flatten()
    }

    pub fn to_station(&self) -> StationEntry {
        StationEntry {
            station_id: self.station_id,
            latitude: self.latitude,
            longitude: self.longitude,
            postal_code: self.postal_code,
            city: self.city.clone(),
            address: self.address.clone(),
            department_code: self.department_code,
        }
    }
}

// =============================================================================
// Dimension and fact entries
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationEntry {
    #[serde(rename = "idStation")]
    pub station_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "cp")]
    pub postal_code: i64,
    #[serde(rename = "ville")]
    pub city: String,
    #[serde(rename = "adresse")]
    pub address: String,
    #[serde(rename = "codeDepartement")]
    pub department_code: i64,
}

/// The single date entry created per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateEntry {
    #[serde(rename = "idDate")]
    pub date_id: i64,
    /// `YYYY-MM-DD HH:MM:SS`
    #[serde(rename = "heureDate")]
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceFact {
    #[serde(rename = "idPrix")]
    pub price_id: i64,
    #[serde(rename = "idStation")]
    pub station_id: i64,
    #[serde(rename = "idDate")]
    pub date_id: i64,
    #[serde(rename = "idCarburant")]
    pub fuel_id: i64,
    #[serde(rename = "prix")]
    pub price: Option<f64>,
}
