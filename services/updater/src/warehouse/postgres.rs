use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::debug;

use super::{InsertError, Record, Warehouse, WarehouseError, WarehouseResult};

/// [`Warehouse`] backed by PostgreSQL.
///
/// Identifiers are quoted, values are always bound. Batch inserts go through
/// `jsonb_populate_recordset` so one statement carries the whole batch.
#[derive(Debug, Clone)]
pub struct PgWarehouse {
    pool: PgPool,
}

impl PgWarehouse {
    pub async fn connect(db_url: &str, max_connections: u32) -> WarehouseResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await
            .map_err(|e| WarehouseError::Unavailable {
                source: Box::new(e),
            })?;
        Ok(Self { pool })
    }
}

/// Quote a possibly schema-qualified identifier (`schema.table`).
pub fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Connectivity failures are `Unavailable`; anything the server answered is `Query`.
fn classify(table: &str, e: sqlx::Error) -> WarehouseError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_) => WarehouseError::Unavailable {
            source: Box::new(e),
        },
        other => WarehouseError::Query {
            table: table.to_string(),
            source: Box::new(other),
        },
    }
}

impl Warehouse for PgWarehouse {
    async fn max_integer_column(
        &self,
        table: &str,
        column: &str,
    ) -> WarehouseResult<Option<i64>> {
        let sql = format!(
            "SELECT MAX({})::BIGINT FROM {}",
            quote_ident(column),
            quote_ident(table)
        );
        debug!(%sql, "max query");

        let row: (Option<i64>,) = sqlx::query_as(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(table, e))?;

        Ok(row.0)
    }

    async fn lookup_integer_by_exact_match(
        &self,
        table: &str,
        key_column: &str,
        match_column: &str,
        value: &str,
    ) -> WarehouseResult<Option<i64>> {
        let sql = format!(
            "SELECT {}::BIGINT FROM {} WHERE {} = $1 LIMIT 1",
            quote_ident(key_column),
            quote_ident(table),
            quote_ident(match_column)
        );
        debug!(%sql, value, "lookup query");

        let row: Option<(Option<i64>,)> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(table, e))?;

        Ok(row.and_then(|r| r.0))
    }

    async fn read_all_rows(&self, table: &str) -> WarehouseResult<Vec<Record>> {
        let sql = format!("SELECT to_jsonb(t) FROM {} AS t", quote_ident(table));
        debug!(%sql, "full table read");

        let rows: Vec<(Value,)> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(table, e))?;

        rows.into_iter()
            .map(|(value,)| match value {
                Value::Object(map) => Ok(map),
                other => Err(WarehouseError::Decode {
                    table: table.to_string(),
                    column: "*".to_string(),
                    detail: format!("expected a row object, got {}", other),
                }),
            })
            .collect()
    }

    async fn batch_insert(
        &self,
        table: &str,
        rows: Vec<Record>,
    ) -> WarehouseResult<Vec<InsertError>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let count = rows.len();
        let target = quote_ident(table);
        let sql = format!(
            "INSERT INTO {} SELECT * FROM jsonb_populate_recordset(NULL::{}, $1)",
            target, target
        );
        let payload = Value::Array(rows.into_iter().map(Value::Object).collect());

        match sqlx::query(&sql).bind(payload).execute(&self.pool).await {
            Ok(result) => {
                debug!(table, rows = result.rows_affected(), "batch inserted");
                Ok(Vec::new())
            }
            Err(sqlx::Error::Database(db)) => {
                let message = match db.constraint() {
                    Some(constraint) => format!("{} (constraint {})", db.message(), constraint),
                    None => db.message().to_string(),
                };
                debug!(table, count, %message, "batch rejected");
                Ok(vec![InsertError {
                    index: None,
                    message,
                }])
            }
            Err(e) => Err(classify(table, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_simple_ident() {
        assert_eq!(quote_ident("dim_station"), "\"dim_station\"");
    }

    #[test]
    fn test_quote_keeps_case() {
        assert_eq!(quote_ident("idStation"), "\"idStation\"");
    }

    #[test]
    fn test_quote_schema_qualified() {
        assert_eq!(quote_ident("carbu_db.fact_prix"), "\"carbu_db\".\"fact_prix\"");
    }

    #[test]
    fn test_quote_escapes_embedded_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_classify_pool_timeout_is_unavailable() {
        let err = classify("dim_date", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, WarehouseError::Unavailable { .. }));
    }

    #[test]
    fn test_classify_row_not_found_is_query() {
        let err = classify("dim_date", sqlx::Error::RowNotFound);
        match err {
            WarehouseError::Query { table, .. } => assert_eq!(table, "dim_date"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
