mod common;
use common::*;

use pylontech_bridge::reconcile::{cell_position, physical_position, reconcile, IdentityMap, Placement, UnitId};

use proptest::prelude::*;
use std::collections::BTreeSet;

fn placements(fingerprints: &[Option<String>]) -> Vec<Placement> {
    fingerprints
        .iter()
        .enumerate()
        .map(|(n, fp)| Placement {
            position: n as u16 + 1,
            fingerprint: fp.clone(),
        })
        .collect()
}

fn unique_barcodes(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[A-Z0-9]{8}", 1..=max).prop_map(|s| s.into_iter().collect())
}

#[test]
fn reshuffled_rack_keeps_identity() {
    common_setup();

    let first: Vec<Option<String>> = MODULES.iter().map(|m| Some(m.to_string())).collect();
    let (map, res) = reconcile(&placements(&first), IdentityMap::default());
    assert_eq!(res.ids, vec![UnitId(1), UnitId(2), UnitId(3)]);

    // top and bottom modules swapped
    let swapped = vec![first[2].clone(), first[1].clone(), first[0].clone()];
    let (_, res) = reconcile(&placements(&swapped), map);
    assert_eq!(res.ids, vec![UnitId(3), UnitId(2), UnitId(1)]);
    assert!(res.ambiguities.is_empty());
}

#[test]
fn unit_added_at_the_top() {
    common_setup();

    let first: Vec<Option<String>> = vec![Some("A".into()), Some("B".into())];
    let (map, _) = reconcile(&placements(&first), IdentityMap::default());

    let grown = vec![Some("C".into()), Some("A".into()), Some("B".into())];
    let (map, res) = reconcile(&placements(&grown), map);

    assert_eq!(res.ids, vec![UnitId(3), UnitId(1), UnitId(2)]);
    assert_eq!(map.by_position.get(&1), Some(&UnitId(3)));
}

proptest! {
    #[test]
    fn positions_are_a_reversal(count in 1usize..32) {
        let mapped: BTreeSet<usize> = (1..=count).filter_map(|i| physical_position(count, i)).collect();
        prop_assert_eq!(mapped, (1..=count).collect::<BTreeSet<_>>());
        for i in 1..=count {
            prop_assert_eq!(physical_position(count, physical_position(count, i).unwrap()), Some(i));
        }
        prop_assert_eq!(physical_position(count, 0), None);
        prop_assert_eq!(physical_position(count, count + 1), None);

        let cells: BTreeSet<usize> = (0..count).filter_map(|j| cell_position(count, j)).collect();
        prop_assert_eq!(cells, (1..=count).collect::<BTreeSet<_>>());
        prop_assert_eq!(cell_position(count, count), None);
    }

    #[test]
    fn ids_are_injective(
        fingerprints in prop::collection::vec(prop::option::of("[AB]{2}"), 1..12),
    ) {
        let (_, res) = reconcile(&placements(&fingerprints), IdentityMap::default());
        let ids: BTreeSet<UnitId> = res.ids.iter().copied().collect();
        prop_assert_eq!(ids.len(), fingerprints.len());
    }

    #[test]
    fn reconcile_is_idempotent(
        fingerprints in prop::collection::vec(prop::option::of("[A-D]{2}"), 1..10),
    ) {
        let input = placements(&fingerprints);
        let (map, first) = reconcile(&input, IdentityMap::default());
        let (again, second) = reconcile(&input, map.clone());
        prop_assert_eq!(first.ids, second.ids);
        prop_assert_eq!(map, again);
    }

    #[test]
    fn reshuffle_preserves_ids(
        (barcodes, order) in unique_barcodes(12).prop_flat_map(|b| {
            let n = b.len();
            (Just(b), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
        }),
    ) {
        let before: Vec<Option<String>> = barcodes.iter().cloned().map(Some).collect();
        let (map, first) = reconcile(&placements(&before), IdentityMap::default());

        let after: Vec<Option<String>> = order.iter().map(|n| before[*n].clone()).collect();
        let (_, second) = reconcile(&placements(&after), map);

        for (slot, n) in order.iter().enumerate() {
            prop_assert_eq!(second.ids[slot], first.ids[*n]);
        }
        prop_assert!(!second.degraded);
    }

    #[test]
    fn duplicates_never_fail(
        barcode in "[A-Z]{6}",
        count in 2usize..8,
    ) {
        let fingerprints = vec![Some(barcode.clone()); count];
        let (map, res) = reconcile(&placements(&fingerprints), IdentityMap::default());

        prop_assert_eq!(res.ids.len(), count);
        prop_assert_eq!(res.ambiguities.len(), 1);
        prop_assert_eq!(res.ambiguities[0].positions.len(), count);
        prop_assert!(res.degraded);
        prop_assert!(!map.by_fingerprint.contains_key(&barcode));
    }
}
