//! Class descriptor interning across transactions and restarts.

use darkstore_core::{ClassId, StoreError};
use darkstore_testkit::{class_info_strategy, TestStore, TxnRunner};
use proptest::prelude::*;

#[test]
fn ids_survive_abort_and_reopen() {
    let store = TestStore::memory();
    let txn = store.begin().unwrap();
    let first = store.get_class_id(&txn, b"class Point { x, y }").unwrap();
    assert_eq!(first, ClassId::new(1));
    store.abort(&txn).unwrap();

    let second = store
        .transaction(|txn| store.get_class_id(txn, b"class Line { a, b }"))
        .unwrap();
    assert_eq!(second, ClassId::new(2));

    let store = store.reopen();
    let (again, info, third) = store
        .transaction(|txn| {
            let again = store.get_class_id(txn, b"class Point { x, y }")?;
            let info = store.get_class_info(txn, second)?;
            let third = store.get_class_id(txn, b"class Circle { r }")?;
            Ok((again, info, third))
        })
        .unwrap();
    assert_eq!(again, first);
    assert_eq!(info, b"class Line { a, b }");
    assert_eq!(third, ClassId::new(3));
}

#[test]
fn interning_does_not_wait_for_locks() {
    let store = TestStore::memory();
    let holder = TxnRunner::begin(&store);
    let other = TxnRunner::begin(&store);

    let id = holder.call(|s, t| s.get_class_id(t, b"shared")).unwrap();
    assert_eq!(other.call(|s, t| s.get_class_id(t, b"shared")).unwrap(), id);
    assert_eq!(other.call(move |s, t| s.get_class_info(t, id)).unwrap(), b"shared");
    holder.commit().unwrap();
    other.commit().unwrap();
}

#[test]
fn unknown_ids_are_rejected() {
    let store = TestStore::memory();
    let err = store
        .transaction(|txn| store.get_class_info(txn, ClassId::new(0)))
        .unwrap_err();
    assert!(err.is_invalid_argument());
    let err = store
        .transaction(|txn| store.get_class_info(txn, ClassId::new(7)))
        .unwrap_err();
    assert!(matches!(err, StoreError::ClassInfoNotFound { .. }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn descriptors_round_trip(blobs in prop::collection::vec(class_info_strategy(), 1..8)) {
        let store = TestStore::memory();
        let ids = store
            .transaction(|txn| {
                blobs.iter().map(|b| store.get_class_id(txn, b)).collect::<Result<Vec<_>, _>>()
            })
            .unwrap();
        for (blob, id) in blobs.iter().zip(&ids) {
            let info = store.transaction(|txn| store.get_class_info(txn, *id)).unwrap();
            prop_assert_eq!(&info, blob);
        }
        let mut distinct: Vec<_> = blobs.clone();
        distinct.sort();
        distinct.dedup();
        let mut unique_ids = ids.clone();
        unique_ids.sort();
        unique_ids.dedup();
        prop_assert_eq!(unique_ids.len(), distinct.len());
    }
}
