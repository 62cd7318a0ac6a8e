use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use super::{integer_cell, InsertError, Record, Warehouse, WarehouseError, WarehouseResult};

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, Vec<Record>>,
    /// Tables whose inserts are rejected, with the rejection message.
    rejecting: HashMap<String, String>,
    /// Tables whose every access fails as if the store were down.
    unreachable: HashSet<String>,
    /// Order in which tables received non-empty inserts.
    insert_log: Vec<(String, usize)>,
}

/// In-memory warehouse used by the test suite.
///
/// Tables are created on first insert; reading a table that was never
/// written yields no rows. Clones share the same storage so a test can
/// keep a handle to inspect what a sync committed.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds rows to `table` without going through the insert log.
    pub async fn seed<I>(&self, table: &str, rows: I)
    where
        I: IntoIterator<Item = serde_json::Value>,
    {
        let mut inner = self.inner.lock().await;
        let target = inner.tables.entry(table.to_string()).or_default();
        for row in rows {
            if let serde_json::Value::Object(map) = row {
                target.push(map);
            }
        }
    }

    /// Makes every subsequent insert into `table` fail with `message`.
    pub async fn reject_inserts(&self, table: &str, message: &str) {
        let mut inner = self.inner.lock().await;
        inner.rejecting.insert(table.to_string(), message.to_string());
    }

    /// Makes every subsequent access to `table` fail as unavailable.
    pub async fn make_unreachable(&self, table: &str) {
        let mut inner = self.inner.lock().await;
        inner.unreachable.insert(table.to_string());
    }

    /// Copy of the rows currently held for `table`.
    pub async fn rows(&self, table: &str) -> Vec<Record> {
        let inner = self.inner.lock().await;
        inner.tables.get(table).cloned().unwrap_or_default()
    }

    /// Tables that received accepted, non-empty inserts, in order, with row counts.
    pub async fn insert_log(&self) -> Vec<(String, usize)> {
        let inner = self.inner.lock().await;
        inner.insert_log.clone()
    }
}

impl Inner {
    fn check_reachable(&self, table: &str) -> WarehouseResult<()> {
        if self.unreachable.contains(table) {
            return Err(WarehouseError::Unavailable {
                source: format!("table {} is unreachable", table).into(),
            });
        }
        Ok(())
    }
}

impl Warehouse for MemoryWarehouse {
    async fn max_integer_column(
        &self,
        table: &str,
        column: &str,
    ) -> WarehouseResult<Option<i64>> {
        let inner = self.inner.lock().await;
        inner.check_reachable(table)?;

        let mut max = None;
        for record in inner.tables.get(table).into_iter().flatten() {
            if let Some(value) = integer_cell(record, table, column)? {
                max = Some(max.map_or(value, |m: i64| m.max(value)));
            }
        }
        Ok(max)
    }

    async fn lookup_integer_by_exact_match(
        &self,
        table: &str,
        key_column: &str,
        match_column: &str,
        value: &str,
    ) -> WarehouseResult<Option<i64>> {
        let inner = self.inner.lock().await;
        inner.check_reachable(table)?;

        let found = inner
            .tables
            .get(table)
            .into_iter()
            .flatten()
            .find(|record| record.get(match_column).and_then(|v| v.as_str()) == Some(value));

        match found {
            Some(record) => integer_cell(record, table, key_column),
            None => Ok(None),
        }
    }

    async fn read_all_rows(&self, table: &str) -> WarehouseResult<Vec<Record>> {
        let inner = self.inner.lock().await;
        inner.check_reachable(table)?;
        Ok(inner.tables.get(table).cloned().unwrap_or_default())
    }

    async fn batch_insert(
        &self,
        table: &str,
        rows: Vec<Record>,
    ) -> WarehouseResult<Vec<InsertError>> {
        let mut inner = self.inner.lock().await;
        inner.check_reachable(table)?;

        if let Some(message) = inner.rejecting.get(table) {
            let errors = (0..rows.len())
                .map(|i| InsertError {
                    index: Some(i),
                    message: message.clone(),
                })
                .collect();
            return Ok(errors);
        }

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        info!(table, rows = rows.len(), "memory warehouse insert");
        inner.insert_log.push((table.to_string(), rows.len()));
        inner.tables.entry(table.to_string()).or_default().extend(rows);
        Ok(Vec::new())
    }
}
