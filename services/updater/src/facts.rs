//! Price fact construction.

use crate::model::{Fuel, FuelKeys, PriceFact, SnapshotRow};

/// One fact per (row, fuel), rows in snapshot order and fuels in
/// [`Fuel::CANONICAL_ORDER`], with price ids contiguous from `first_price_id`.
/// The caller guarantees the whole id range fits in an `i64`.
///
/// A fuel the station did not report still gets a fact, with a null price.
pub fn build_facts(
    rows: &[SnapshotRow],
    fuel_keys: &FuelKeys,
    date_id: i64,
    first_price_id: i64,
) -> Vec<PriceFact> {
    rows.iter()
        .flat_map(|row| Fuel::CANONICAL_ORDER.map(|fuel| (row, fuel)))
        .enumerate()
        .map(|(offset, (row, fuel))| PriceFact {
            price_id: first_price_id + offset as i64,
            station_id: row.station_id,
            date_id,
            fuel_id: fuel_keys.get(fuel),
            price: row.price(fuel),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UNKNOWN_FUEL_KEY;
    use std::collections::BTreeMap;

    fn keys() -> FuelKeys {
        Fuel::CANONICAL_ORDER
            .into_iter()
            .zip(1i64..)
            .collect()
    }

    fn row(station_id: i64, prices: &[(Fuel, Option<f64>)]) -> SnapshotRow {
        SnapshotRow {
            station_id,
            latitude: 48.8,
            longitude: 2.3,
            postal_code: 75000,
            city: "Paris".into(),
            address: "rue".into(),
            department_code: 75,
            prices: prices.iter().copied().collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_six_facts_per_row() {
        let rows = vec![row(1, &[]), row(2, &[]), row(3, &[])];
        let facts = build_facts(&rows, &keys(), 4, 10);
        assert_eq!(facts.len(), rows.len() * 6);
    }

    #[test]
    fn test_ids_contiguous_from_start() {
        let rows = vec![row(1, &[]), row(2, &[])];
        let facts = build_facts(&rows, &keys(), 4, 101);
        let ids: Vec<i64> = facts.iter().map(|f| f.price_id).collect();
        assert_eq!(ids, (101..113).collect::<Vec<_>>());
    }

    #[test]
    fn test_row_major_fuel_minor_order() {
        let rows = vec![row(1, &[]), row(2, &[])];
        let facts = build_facts(&rows, &keys(), 4, 1);
        let pairs: Vec<(i64, i64)> = facts.iter().map(|f| (f.station_id, f.fuel_id)).collect();
        assert_eq!(
            pairs,
            vec![
                (1, 1),
                (1, 2),
                (1, 3),
                (1, 4),
                (1, 5),
                (1, 6),
                (2, 1),
                (2, 2),
                (2, 3),
                (2, 4),
                (2, 5),
                (2, 6),
            ]
        );
    }

    #[test]
    fn test_missing_price_keeps_fact_with_null() {
        let rows = vec![row(7, &[(Fuel::Gazole, Some(1.5)), (Fuel::Gplc, None)])];
        let facts = build_facts(&rows, &keys(), 4, 1);
        assert_eq!(facts[0].price, Some(1.5));
        assert_eq!(facts[1].price, None);
        assert_eq!(facts[1].fuel_id, 2);
        // never reported at all
        assert_eq!(facts[5].price, None);
        assert_eq!(facts[5].fuel_id, 6);
    }

    #[test]
    fn test_shared_date_id() {
        let rows = vec![row(1, &[]), row(2, &[])];
        let facts = build_facts(&rows, &keys(), 42, 1);
        assert!(facts.iter().all(|f| f.date_id == 42));
    }

    #[test]
    fn test_unknown_fuel_uses_sentinel() {
        let partial: FuelKeys = [(Fuel::Gazole, 1)].into_iter().collect();
        let facts = build_facts(&[row(1, &[])], &partial, 1, 1);
        assert_eq!(facts[0].fuel_id, 1);
        assert!(facts[1..].iter().all(|f| f.fuel_id == UNKNOWN_FUEL_KEY));
        assert_eq!(facts.len(), 6);
    }

    #[test]
    fn test_ids_may_end_at_i64_max() {
        let facts = build_facts(&[row(1, &[])], &keys(), 1, i64::MAX - 5);
        assert_eq!(facts.last().map(|f| f.price_id), Some(i64::MAX));
    }

    #[test]
    fn test_no_rows_no_facts() {
        assert!(build_facts(&[], &keys(), 1, 1).is_empty());
    }
}
