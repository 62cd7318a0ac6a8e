//! Projects a raw feed snapshot onto the rows the updater needs.
//!
//! Rows outside the target region are discarded before any casting. Rows
//! inside it that fail to cast are dropped and reported, never fatal.

use collector::{RawRow, RawSnapshot};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{MalformedRowError, NormalizeError};
use crate::model::{Fuel, SnapshotRow};

pub const COL_ID: &str = "id";
pub const COL_LATITUDE: &str = "latitude";
pub const COL_LONGITUDE: &str = "longitude";
pub const COL_POSTAL_CODE: &str = "cp";
pub const COL_CITY: &str = "ville";
pub const COL_ADDRESS: &str = "adresse";
pub const COL_DEPARTMENT: &str = "code_departement";
pub const COL_REGION: &str = "code_region";

const STATION_COLUMNS: [&str; 8] = [
    COL_ID,
    COL_LATITUDE,
    COL_LONGITUDE,
    COL_POSTAL_CODE,
    COL_CITY,
    COL_ADDRESS,
    COL_DEPARTMENT,
    COL_REGION,
];

/// Île-de-France.
pub const DEFAULT_REGION_CODE: &str = "11";

#[derive(Debug, Default)]
pub struct Normalized {
    pub rows: Vec<SnapshotRow>,
    pub rejected: Vec<MalformedRowError>,
    /// Rows skipped because they belong to another region.
    pub other_region: usize,
}

pub fn normalize(snapshot: &RawSnapshot, region_code: &str) -> Result<Normalized, NormalizeError> {
    let fuel_columns = Fuel::CANONICAL_ORDER.map(Fuel::price_column);
    if let Some(missing) = STATION_COLUMNS
        .iter()
        .chain(fuel_columns.iter())
        .find(|c| snapshot.column_index(c).is_none())
    {
        return Err(NormalizeError::MissingColumn(*missing));
    }

    let region_code = region_code.trim();
    let mut out = Normalized::default();

    for raw in snapshot.rows() {
        if raw.get(COL_REGION).map(str::trim) != Some(region_code) {
            out.other_region += 1;
            continue;
        }
        match normalize_row(&raw) {
            Ok(row) => out.rows.push(row),
            Err(e) => {
                warn!(line = e.line, field = e.field, value = %e.value, "dropping malformed row");
                out.rejected.push(e);
            }
        }
    }

    debug!(
        kept = out.rows.len(),
        rejected = out.rejected.len(),
        other_region = out.other_region,
        region = region_code,
        "snapshot normalized"
    );

    Ok(out)
}

fn normalize_row(raw: &RawRow<'_>) -> Result<SnapshotRow, MalformedRowError> {
    let mut prices = BTreeMap::new();
    for fuel in Fuel::CANONICAL_ORDER {
        prices.insert(fuel, price(raw, fuel.price_column())?);
    }

    Ok(SnapshotRow {
        station_id: integer(raw, COL_ID)?,
        latitude: float(raw, COL_LATITUDE)?,
        longitude: float(raw, COL_LONGITUDE)?,
        postal_code: integer(raw, COL_POSTAL_CODE)?,
        city: text(raw, COL_CITY),
        address: text(raw, COL_ADDRESS),
        department_code: integer(raw, COL_DEPARTMENT)?,
        prices,
    })
}

fn field<'a>(raw: &RawRow<'a>, name: &str) -> &'a str {
    raw.get(name).unwrap_or("").trim()
}

fn malformed(raw: &RawRow<'_>, name: &'static str) -> MalformedRowError {
    MalformedRowError {
        line: raw.line(),
        field: name,
        value: field(raw, name).to_string(),
    }
}

fn integer(raw: &RawRow<'_>, name: &'static str) -> Result<i64, MalformedRowError> {
    field(raw, name).parse().map_err(|_| malformed(raw, name))
}

fn float(raw: &RawRow<'_>, name: &'static str) -> Result<f64, MalformedRowError> {
    match field(raw, name).parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(malformed(raw, name)),
    }
}

fn text(raw: &RawRow<'_>, name: &str) -> String {
    field(raw, name).to_string()
}

/// Empty and NaN mean "no price reported", which is a value, not an error.
fn price(raw: &RawRow<'_>, name: &'static str) -> Result<Option<f64>, MalformedRowError> {
    let value = field(raw, name);
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<f64>() {
        Ok(v) if v.is_nan() => Ok(None),
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(malformed(raw, name)),
    }
}
