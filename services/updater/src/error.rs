use thiserror::Error;

use crate::warehouse::{InsertError, WarehouseError};

/// A feed row that could not be cast to its typed shape. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: cannot read `{field}` from {value:?}")]
pub struct MalformedRowError {
    pub line: usize,
    pub field: &'static str,
    pub value: String,
}

/// Snapshot-level failures: nothing can be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("feed is missing required column `{0}`")]
    MissingColumn(&'static str),
}

/// Failures that abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("warehouse rejected {} row(s) inserted into `{table}`: {}", .errors.len(), summarize(.errors))]
    InsertRejected {
        table: String,
        errors: Vec<InsertError>,
    },

    #[error("cannot encode rows for `{table}`")]
    Encode {
        table: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type SyncResult<T> = Result<T, SyncError>;

fn summarize(errors: &[InsertError]) -> String {
    const SHOWN: usize = 3;
    let mut parts: Vec<String> = errors.iter().take(SHOWN).map(|e| e.to_string()).collect();
    if errors.len() > SHOWN {
        parts.push(format!("and {} more", errors.len() - SHOWN));
    }
    parts.join("; ")
}
