//! Stored values and names come back exactly as written.

use darkstore_codec::encode_string;
use darkstore_testkit::{distinct_names_strategy, name_strategy, object_data_strategy, TestStore};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn object_data_survives_commit(data in prop::collection::vec(object_data_strategy(), 1..6)) {
        let store = TestStore::memory();
        let oids = store
            .transaction(|txn| {
                let oids: Vec<_> = data.iter().map(|_| store.create_object(txn)).collect::<Result<_, _>>()?;
                store.set_objects(txn, &oids, &data)?;
                Ok(oids)
            })
            .unwrap();
        for (oid, expected) in oids.iter().zip(&data) {
            let value = store.transaction(|txn| store.get_object(txn, *oid, false)).unwrap();
            prop_assert_eq!(&value, expected);
        }
    }

    #[test]
    fn names_are_walked_in_encoded_order(names in distinct_names_strategy(12)) {
        let store = TestStore::memory();
        store
            .transaction(|txn| {
                let oid = store.create_object(txn)?;
                store.set_object(txn, oid, b"target")?;
                for name in &names {
                    store.set_binding(txn, name, oid)?;
                }
                Ok(())
            })
            .unwrap();

        let walked = store
            .transaction(|txn| {
                let mut walked = Vec::new();
                let mut next = store.next_bound_name(txn, None)?;
                while let Some(current) = next {
                    next = store.next_bound_name(txn, Some(&current))?;
                    walked.push(current);
                }
                Ok(walked)
            })
            .unwrap();

        let mut expected = names.clone();
        expected.sort_by_key(|n| encode_string(n).unwrap());
        prop_assert_eq!(walked, expected);
    }

    #[test]
    fn unbound_lookup_then_bind(name in name_strategy()) {
        let store = TestStore::memory();
        let txn = store.begin().unwrap();
        prop_assert!(store.get_binding(&txn, &name).unwrap_err().is_not_found());
        prop_assert!(!store.remove_binding(&txn, &name).unwrap());
        let oid = store.create_object(&txn).unwrap();
        store.set_binding(&txn, &name, oid).unwrap();
        prop_assert_eq!(store.get_binding(&txn, &name).unwrap(), oid);
        store.commit(&txn).unwrap();
    }
}
