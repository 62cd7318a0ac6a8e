//! Surrogate key allocation.
//!
//! Keys are `MAX(existing) + 1`, read fresh on every call. There is no lock
//! or reservation: two runs allocating at the same time would collide.

use tracing::{debug, warn};

use crate::model::{Fuel, FuelKeys, UNKNOWN_FUEL_KEY};
use crate::schema::{Tables, DATE_ID, FUEL_ID, FUEL_NAME, PRICE_ID};
use crate::warehouse::{Warehouse, WarehouseError, WarehouseResult};

pub struct KeyAllocator<'a, W> {
    warehouse: &'a W,
    tables: &'a Tables,
}

impl<'a, W: Warehouse> KeyAllocator<'a, W> {
    pub fn new(warehouse: &'a W, tables: &'a Tables) -> Self {
        Self { warehouse, tables }
    }

    /// Next `idDate`; `1` for an empty date dimension.
    pub async fn next_date_key(&self) -> WarehouseResult<i64> {
        self.next_key(&self.tables.date, DATE_ID).await
    }

    /// Next `idPrix`; `1` for an empty fact table.
    pub async fn next_price_key(&self) -> WarehouseResult<i64> {
        self.next_key(&self.tables.price_key, PRICE_ID).await
    }

    /// First of `count` contiguous `idPrix` values, failing if the last one
    /// would not fit in an `i64`.
    pub async fn reserve_price_keys(&self, count: usize) -> WarehouseResult<i64> {
        let first = self.next_price_key().await?;
        let last = i64::try_from(count.saturating_sub(1))
            .ok()
            .and_then(|span| first.checked_add(span));
        match last {
            Some(_) => Ok(first),
            None => Err(key_space_exhausted(&self.tables.price_key, PRICE_ID, first)),
        }
    }

    async fn next_key(&self, table: &str, column: &str) -> WarehouseResult<i64> {
        let max = self
            .warehouse
            .max_integer_column(table, column)
            .await?
            .unwrap_or(0);
        let next = max
            .checked_add(1)
            .ok_or_else(|| key_space_exhausted(table, column, max))?;
        debug!(table, column, max, "allocated next key");
        Ok(next)
    }

    /// `idCarburant` for `name`, or [`UNKNOWN_FUEL_KEY`] when the fuel
    /// dimension has no row with that exact name.
    pub async fn resolve_fuel_key(&self, name: &str) -> WarehouseResult<i64> {
        let key = self
            .warehouse
            .lookup_integer_by_exact_match(&self.tables.fuel, FUEL_ID, FUEL_NAME, name)
            .await?
            .unwrap_or(UNKNOWN_FUEL_KEY);
        if key == UNKNOWN_FUEL_KEY {
            warn!(fuel = name, "fuel missing from fuel dimension, using unknown key");
        }
        Ok(key)
    }

    /// Resolves every feed fuel, one lookup each, in canonical order.
    pub async fn resolve_fuel_keys(&self) -> WarehouseResult<FuelKeys> {
        let mut keys = FuelKeys::default();
        for fuel in Fuel::CANONICAL_ORDER {
            keys.insert(fuel, self.resolve_fuel_key(fuel.name()).await?);
        }
        Ok(keys)
    }
}

fn key_space_exhausted(table: &str, column: &str, from: i64) -> WarehouseError {
    WarehouseError::Decode {
        table: table.to_string(),
        column: column.to_string(),
        detail: format!("no keys left after {}", from),
    }
}
