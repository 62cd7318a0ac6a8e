use std::fmt;
use std::future::Future;

use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryWarehouse;
pub use postgres::PgWarehouse;

/// A warehouse row: column name to value.
pub type Record = serde_json::Map<String, serde_json::Value>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by a [`Warehouse`]. Every variant is fatal to a run.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("warehouse unavailable")]
    Unavailable {
        #[source]
        source: BoxError,
    },

    #[error("query against `{table}` failed")]
    Query {
        table: String,
        #[source]
        source: BoxError,
    },

    #[error("unexpected value in `{table}`.`{column}`: {detail}")]
    Decode {
        table: String,
        column: String,
        detail: String,
    },
}

pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// A row-level rejection reported by [`Warehouse::batch_insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertError {
    /// Position of the rejected row in the batch, when the store reports it.
    pub index: Option<usize>,
    pub message: String,
}

impl fmt::Display for InsertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "row {}: {}", i, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Capabilities the updater needs from the analytical store.
///
/// Implementations are thin: no caching, no retries. "No rows" is a value
/// (`None`, empty `Vec`), never an error; only failures to reach or query
/// the store are [`WarehouseError`]s.
pub trait Warehouse {
    /// `MAX(column)` over `table`, `None` when the table is empty.
    fn max_integer_column(
        &self,
        table: &str,
        column: &str,
    ) -> impl Future<Output = WarehouseResult<Option<i64>>> + Send;

    /// `key_column` of the first row whose `match_column` equals `value`.
    fn lookup_integer_by_exact_match(
        &self,
        table: &str,
        key_column: &str,
        match_column: &str,
        value: &str,
    ) -> impl Future<Output = WarehouseResult<Option<i64>>> + Send;

    /// Every row of `table`.
    fn read_all_rows(
        &self,
        table: &str,
    ) -> impl Future<Output = WarehouseResult<Vec<Record>>> + Send;

    /// Appends `rows` to `table`.
    ///
    /// Rejected rows are returned as descriptors; an empty list means the
    /// whole batch was accepted.
    fn batch_insert(
        &self,
        table: &str,
        rows: Vec<Record>,
    ) -> impl Future<Output = WarehouseResult<Vec<InsertError>>> + Send;
}

/// Reads an integer cell, accepting JSON numbers and numeric strings.
pub(crate) fn integer_cell(
    record: &Record,
    table: &str,
    column: &str,
) -> WarehouseResult<Option<i64>> {
    let decode = |detail: String| WarehouseError::Decode {
        table: table.to_string(),
        column: column.to_string(),
        detail,
    };

    match record.get(column) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| decode(format!("{} is not an integer", n))),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| decode(format!("{:?} is not an integer", s))),
        Some(other) => Err(decode(format!("{} is not an integer", other))),
    }
}
