use proptest::prelude::*;
use tyweave_core::inference::{TypeId, TypeKind, TypeTable};

/// Concrete builtins used as union members
fn leaf_types(table: &TypeTable) -> Vec<TypeId> {
    let b = table.builtins();
    vec![
        b.int8, b.int16, b.int32, b.int64, b.uint8, b.float32, b.float64, b.bool, b.char, b.symbol, b.nil,
        b.string,
    ]
}

fn members(table: &TypeTable, ty: TypeId) -> Vec<TypeId> {
    match table.kind(ty) {
        TypeKind::Union(members) => members.clone(),
        _ => vec![ty],
    }
}

proptest! {
    #[test]
    fn merge_ignores_order(
        picks in prop::collection::vec(0usize..12, 1..8).prop_shuffle(),
        rotate in 0usize..8,
    ) {
        let mut table = TypeTable::new();
        let leaves = leaf_types(&table);
        let types: Vec<TypeId> = picks.iter().map(|pick| leaves[*pick]).collect();
        let mut rotated = types.clone();
        rotated.rotate_left(rotate % types.len());

        let first = table.merge(&types);
        let second = table.merge(&rotated);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn merge_is_flat_sorted_and_deduplicated(picks in prop::collection::vec(0usize..12, 1..8)) {
        let mut table = TypeTable::new();
        let leaves = leaf_types(&table);
        let types: Vec<TypeId> = picks.iter().map(|pick| leaves[*pick]).collect();
        let merged = table.merge(&types).unwrap();

        let result = members(&table, merged);
        let mut expected = types.clone();
        expected.sort_unstable();
        expected.dedup();
        prop_assert_eq!(result, expected);
    }

    #[test]
    fn merging_unions_flattens(
        left in prop::collection::vec(0usize..12, 1..5),
        right in prop::collection::vec(0usize..12, 1..5),
    ) {
        let mut table = TypeTable::new();
        let leaves = leaf_types(&table);
        let left: Vec<TypeId> = left.iter().map(|pick| leaves[*pick]).collect();
        let right: Vec<TypeId> = right.iter().map(|pick| leaves[*pick]).collect();

        let left_union = table.merge(&left).unwrap();
        let right_union = table.merge(&right).unwrap();
        let nested = table.merge(&[left_union, right_union]);
        let all: Vec<TypeId> = left.iter().chain(&right).copied().collect();
        prop_assert_eq!(nested, table.merge(&all));
    }

    #[test]
    fn no_return_vanishes_next_to_other_types(picks in prop::collection::vec(0usize..12, 1..6)) {
        let mut table = TypeTable::new();
        let leaves = leaf_types(&table);
        let no_return = table.builtins().no_return;
        let types: Vec<TypeId> = picks.iter().map(|pick| leaves[*pick]).collect();
        let mut with_no_return = types.clone();
        with_no_return.push(no_return);

        prop_assert_eq!(table.merge(&with_no_return), table.merge(&types));
    }
}

#[test]
fn test_merge_of_nothing() {
    let mut table = TypeTable::new();
    assert_eq!(table.merge(&[]), None);
    let no_return = table.builtins().no_return;
    assert_eq!(table.merge(&[no_return]), Some(no_return));
}
