//! Sync orchestration: one run of allocate → reconcile → build → commit.
//!
//! Commit order matters. Facts reference both the station and the date
//! dimension, so stations and the date entry are written first. A failed
//! commit aborts the run without undoing earlier commits: the next run's
//! reconciliation skips stations that did land. Price facts that landed
//! before a later failure are not detected on retry and may be duplicated.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::facts::build_facts;
use crate::keys::KeyAllocator;
use crate::model::{DateEntry, Fuel, PriceFact, SnapshotRow, StationEntry};
use crate::reconcile::{existing_station_ids, unseen_stations};
use crate::schema::{Tables, STATION_ID};
use crate::warehouse::{Record, Warehouse};

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything a run will write, computed from reads only.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    pub date: DateEntry,
    pub stations: Vec<StationEntry>,
    pub facts: Vec<PriceFact>,
    /// Fuels whose facts carry the unknown-fuel key.
    pub unknown_fuels: Vec<Fuel>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub date_id: i64,
    pub stations_inserted: usize,
    pub facts_inserted: usize,
    pub first_price_id: Option<i64>,
    pub last_price_id: Option<i64>,
    pub unknown_fuels: usize,
    /// Nothing was written.
    pub dry_run: bool,
}

impl SyncPlan {
    pub fn report(&self, dry_run: bool) -> SyncReport {
        SyncReport {
            date_id: self.date.date_id,
            stations_inserted: self.stations.len(),
            facts_inserted: self.facts.len(),
            first_price_id: self.facts.first().map(|f| f.price_id),
            last_price_id: self.facts.last().map(|f| f.price_id),
            unknown_fuels: self.unknown_fuels.len(),
            dry_run,
        }
    }
}

/// Runs syncs against one warehouse.
///
/// Assumes it is the only writer for the duration of a run.
pub struct Updater<W> {
    warehouse: W,
    tables: Tables,
}

impl<W: Warehouse> Updater<W> {
    pub fn new(warehouse: W, tables: Tables) -> Self {
        Self { warehouse, tables }
    }

    /// Plans and commits one run.
    pub async fn run(
        &self,
        rows: &[SnapshotRow],
        observed_at: NaiveDateTime,
    ) -> SyncResult<SyncReport> {
        let plan = self.plan(rows, observed_at).await?;
        self.commit(plan).await
    }

    /// Reads the warehouse and computes the run's writes.
    pub async fn plan(
        &self,
        rows: &[SnapshotRow],
        observed_at: NaiveDateTime,
    ) -> SyncResult<SyncPlan> {
        if rows.is_empty() {
            warn!("snapshot is empty, the run will only record its date");
        }

        let keys = KeyAllocator::new(&self.warehouse, &self.tables);

        let date = DateEntry {
            date_id: keys.next_date_key().await?,
            timestamp: observed_at.format(DATE_FORMAT).to_string(),
        };
        debug!(date_id = date.date_id, timestamp = %date.timestamp, "date allocated");

        let existing = self.warehouse.read_all_rows(&self.tables.station).await?;
        let existing = existing_station_ids(&existing, &self.tables.station, STATION_ID)?;
        let stations = unseen_stations(rows, &existing);
        debug!(
            existing = existing.len(),
            new = stations.len(),
            "stations reconciled"
        );

        let fuel_keys = keys.resolve_fuel_keys().await?;
        let first_price_id = keys
            .reserve_price_keys(rows.len() * Fuel::CANONICAL_ORDER.len())
            .await?;
        let facts = build_facts(rows, &fuel_keys, date.date_id, first_price_id);
        debug!(facts = facts.len(), first_price_id, "facts built");

        Ok(SyncPlan {
            date,
            stations,
            facts,
            unknown_fuels: fuel_keys.unknown(),
        })
    }

    /// Writes a plan: stations (if any), then the date, then the facts.
    pub async fn commit(&self, plan: SyncPlan) -> SyncResult<SyncReport> {
        let report = plan.report(false);

        if plan.stations.is_empty() {
            info!("no new stations to insert");
        } else {
            info!(count = plan.stations.len(), "inserting new stations");
            self.insert(&self.tables.station, &plan.stations).await?;
        }

        info!(
            date_id = plan.date.date_id,
            timestamp = %plan.date.timestamp,
            "inserting date entry"
        );
        let date = std::slice::from_ref(&plan.date);
        self.insert(&self.tables.date, date).await?;

        info!(count = plan.facts.len(), "inserting price facts");
        self.insert(&self.tables.price, &plan.facts).await?;

        if !plan.unknown_fuels.is_empty() {
            let names: Vec<&str> = plan.unknown_fuels.iter().map(|f| f.name()).collect();
            warn!(fuels = ?names, "facts committed with the unknown fuel key");
        }

        Ok(report)
    }

    async fn insert<T: Serialize>(&self, table: &str, rows: &[T]) -> SyncResult<()> {
        let records = to_records(table, rows)?;
        let errors = self.warehouse.batch_insert(table, records).await?;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SyncError::InsertRejected {
                table: table.to_string(),
                errors,
            })
        }
    }
}

fn to_records<T: Serialize>(table: &str, rows: &[T]) -> SyncResult<Vec<Record>> {
    rows.iter()
        .map(|row| match serde_json::to_value(row) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(other) => Err(SyncError::Encode {
                table: table.to_string(),
                source: serde::ser::Error::custom(format!("expected an object, got {}", other)),
            }),
            Err(source) => Err(SyncError::Encode {
                table: table.to_string(),
                source,
            }),
        })
        .collect()
}
