//! Updater - Loads fuel-price snapshots into the star-schema warehouse
//!
//! Responsibilities:
//! - Normalize the feed snapshot for one region
//! - Allocate surrogate keys for the date and price tables
//! - Insert stations never seen before (the station id is the business key)
//! - Emit one price fact per station and fuel, sharing the run's date key
//! - Commit stations, then the date, then the facts
//!
//! A run is not concurrent-safe: keys are `MAX + 1` with no reservation, so
//! at most one run may touch a warehouse at a time.

pub mod config;
pub mod error;
pub mod facts;
pub mod keys;
pub mod model;
pub mod normalize;
pub mod reconcile;
pub mod schema;
pub mod sync;
pub mod warehouse;

pub use error::{MalformedRowError, NormalizeError, SyncError, SyncResult};
pub use model::{DateEntry, Fuel, FuelKeys, PriceFact, SnapshotRow, StationEntry};
pub use schema::Tables;
pub use sync::{SyncPlan, SyncReport, Updater};
pub use warehouse::{MemoryWarehouse, PgWarehouse, Warehouse};
