//! Station dimension diffing.

use std::collections::HashSet;

use crate::model::{SnapshotRow, StationEntry};
use crate::warehouse::{integer_cell, Record, WarehouseError, WarehouseResult};

/// Business keys present in the station dimension.
///
/// A row without a station id is a corrupt dimension, not something to skip.
pub fn existing_station_ids(
    records: &[Record],
    table: &str,
    column: &str,
) -> WarehouseResult<HashSet<i64>> {
    records
        .iter()
        .map(|record| {
            integer_cell(record, table, column)?.ok_or_else(|| WarehouseError::Decode {
                table: table.to_string(),
                column: column.to_string(),
                detail: "station row without an id".to_string(),
            })
        })
        .collect()
}

/// Stations of the snapshot whose id is not in `existing`, in snapshot order.
///
/// Duplicate ids inside the snapshot itself are not collapsed.
pub fn unseen_stations(rows: &[SnapshotRow], existing: &HashSet<i64>) -> Vec<StationEntry> {
    rows.iter()
        .filter(|row| !existing.contains(&row.station_id))
        .map(SnapshotRow::to_station)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn row(station_id: i64) -> SnapshotRow {
        SnapshotRow {
            station_id,
            latitude: 48.8,
            longitude: 2.3,
            postal_code: 75000,
            city: "Paris".into(),
            address: format!("{} avenue", station_id),
            department_code: 75,
            prices: BTreeMap::new(),
        }
    }

    fn records(values: Vec<serde_json::Value>) -> Vec<Record> {
        values
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect()
    }

    #[test]
    fn test_existing_ids_from_records() {
        let recs = records(vec![json!({"idStation": 1}), json!({"idStation": "2"})]);
        let ids = existing_station_ids(&recs, "dim_station", "idStation").unwrap();
        assert_eq!(ids, HashSet::from([1, 2]));
    }

    #[test]
    fn test_row_without_id_is_decode_error() {
        let recs = records(vec![json!({"ville": "Paris"})]);
        let err = existing_station_ids(&recs, "dim_station", "idStation").unwrap_err();
        assert!(matches!(err, WarehouseError::Decode { .. }));
    }

    #[test]
    fn test_only_unseen_are_returned() {
        let existing = HashSet::from([1, 3]);
        let out = unseen_stations(&[row(1), row(2), row(3), row(4)], &existing);
        let ids: Vec<_> = out.iter().map(|s| s.station_id).collect();
        assert_eq!(ids, vec![2, 4]);
    }

    #[test]
    fn test_projection_keeps_station_fields() {
        let out = unseen_stations(&[row(9)], &HashSet::new());
        assert_eq!(out[0], row(9).to_station());
        assert_eq!(out[0].address, "9 avenue");
    }

    #[test]
    fn test_everything_known_yields_empty() {
        let existing = HashSet::from([1, 2]);
        assert!(unseen_stations(&[row(1), row(2)], &existing).is_empty());
    }

    #[test]
    fn test_same_inputs_same_output() {
        let existing = HashSet::from([5]);
        let rows = [row(5), row(6), row(7)];
        assert_eq!(unseen_stations(&rows, &existing), unseen_stations(&rows, &existing));
    }

    #[test]
    fn test_snapshot_duplicates_are_kept() {
        let out = unseen_stations(&[row(8), row(8)], &HashSet::new());
        assert_eq!(out.len(), 2);
    }
}
