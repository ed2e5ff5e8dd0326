//! Object isolation across concurrent transactions.

use darkstore_core::{AccessKey, CoordinatorKind, DataStore, LockMode, ObjectId, StoreError};
use darkstore_testkit::{
    lock_owners, read_counter, stress_contended_counter, test_config, wait_for_waiter, StressConfig,
    TestStore, TxnRunner,
};

fn seed(store: &DataStore, data: &[u8]) -> ObjectId {
    store
        .transaction(|txn| {
            let oid = store.create_object(txn)?;
            store.set_object(txn, oid, data)?;
            Ok(oid)
        })
        .unwrap()
}

#[test]
fn reader_upgrade_blocks_mark_for_update() {
    let store = TestStore::memory();
    let oid = seed(&store, &[1, 2]);
    let key = AccessKey::Object(oid);

    let t2 = TxnRunner::begin(&store);
    let t3 = TxnRunner::begin(&store);
    assert_eq!(t2.call(move |s, t| s.get_object(t, oid, false)).unwrap(), vec![1, 2]);
    assert_eq!(lock_owners(&store, &key), vec![(t2.id(), LockMode::Read)]);
    assert_eq!(t2.call(move |s, t| s.get_object(t, oid, true)).unwrap(), vec![1, 2]);
    assert_eq!(lock_owners(&store, &key), vec![(t2.id(), LockMode::Write)]);

    let mark = t3.run(move |s, t| s.mark_for_update(t, oid));
    wait_for_waiter(&store, &key, t3.id(), LockMode::Write);
    mark.assert_blocked();

    t2.commit().unwrap();
    mark.result().unwrap();
    assert_eq!(lock_owners(&store, &key), vec![(t3.id(), LockMode::Write)]);
    t3.commit().unwrap();
}

#[test]
fn upgrade_behind_earlier_reader_leaves_no_lock() {
    let store = TestStore::memory();
    let oid = seed(&store, b"shared");
    let key = AccessKey::Object(oid);

    let first = TxnRunner::begin(&store);
    let upgrader = TxnRunner::begin(&store);
    first.call(move |s, t| s.get_object(t, oid, false)).unwrap();
    upgrader.call(move |s, t| s.get_object(t, oid, false)).unwrap();

    let upgrade = upgrader.run(move |s, t| s.mark_for_update(t, oid));
    wait_for_waiter(&store, &key, upgrader.id(), LockMode::Write);
    upgrade.assert_blocked();

    first.commit().unwrap();
    upgrade.result().unwrap();
    assert_eq!(lock_owners(&store, &key), vec![(upgrader.id(), LockMode::Write)]);
    upgrader.call(move |s, t| s.set_object(t, oid, b"upgraded")).unwrap();
    upgrader.commit().unwrap();
    assert!(lock_owners(&store, &key).is_empty());

    store
        .transaction(|txn| store.set_object(txn, oid, b"after"))
        .unwrap();
    assert!(lock_owners(&store, &key).is_empty());
}

#[test]
fn readers_share_and_writer_waits() {
    let store = TestStore::memory();
    let oid = seed(&store, b"v1");
    let key = AccessKey::Object(oid);

    let r1 = TxnRunner::begin(&store);
    let r2 = TxnRunner::begin(&store);
    let w = TxnRunner::begin(&store);
    r1.call(move |s, t| s.get_object(t, oid, false)).unwrap();
    r2.call(move |s, t| s.get_object(t, oid, false)).unwrap();
    assert_eq!(
        lock_owners(&store, &key),
        vec![(r1.id(), LockMode::Read), (r2.id(), LockMode::Read)]
    );

    let write = w.run(move |s, t| s.set_object(t, oid, b"v2"));
    wait_for_waiter(&store, &key, w.id(), LockMode::Write);

    r1.commit().unwrap();
    write.assert_blocked();
    assert_eq!(lock_owners(&store, &key), vec![(r2.id(), LockMode::Read)]);

    r2.commit().unwrap();
    write.result().unwrap();
    assert_eq!(lock_owners(&store, &key), vec![(w.id(), LockMode::Write)]);
    w.commit().unwrap();

    let value = store.transaction(|txn| store.get_object(txn, oid, false)).unwrap();
    assert_eq!(value, b"v2");
}

#[test]
fn uncommitted_writes_are_not_visible() {
    let store = TestStore::memory();
    let oid = seed(&store, b"old");

    let writer = TxnRunner::begin(&store);
    let reader = TxnRunner::begin(&store);
    let created = writer
        .call(move |s, t| {
            s.set_object(t, oid, b"new")?;
            let created = s.create_object(t)?;
            s.set_object(t, created, b"fresh")?;
            Ok::<_, StoreError>(created)
        })
        .unwrap();

    let read = reader.run(move |s, t| s.get_object(t, oid, false));
    read.assert_blocked();
    writer.abort().unwrap();
    assert_eq!(read.result().unwrap(), b"old");
    assert!(reader
        .call(move |s, t| s.get_object(t, created, false))
        .unwrap_err()
        .is_not_found());
    reader.commit().unwrap();
}

#[test]
fn aborted_batch_leaves_no_trace() {
    let store = TestStore::memory();
    let a = seed(&store, &[5]);
    let b = seed(&store, &[6]);

    let batch = TxnRunner::begin(&store);
    let observer = TxnRunner::begin(&store);
    batch
        .call(move |s, t| s.set_objects(t, &[a, b], &[[9u8], [10u8]]))
        .unwrap();
    assert_eq!(lock_owners(&store, &AccessKey::Object(a)), vec![(batch.id(), LockMode::Write)]);
    assert_eq!(lock_owners(&store, &AccessKey::Object(b)), vec![(batch.id(), LockMode::Write)]);

    let read = observer.run(move |s, t| s.get_object(t, b, false));
    read.assert_blocked();
    batch.abort().unwrap();
    assert_eq!(read.result().unwrap(), vec![6]);
    assert_eq!(observer.call(move |s, t| s.get_object(t, a, false)).unwrap(), vec![5]);
    observer.commit().unwrap();
}

#[test]
fn deadlock_aborts_the_younger_transaction() {
    let store = TestStore::memory();
    let a = seed(&store, b"a");
    let b = seed(&store, b"b");

    let older = TxnRunner::begin(&store);
    let younger = TxnRunner::begin(&store);
    older.call(move |s, t| s.mark_for_update(t, a)).unwrap();
    younger.call(move |s, t| s.mark_for_update(t, b)).unwrap();

    let older_wait = older.run(move |s, t| s.mark_for_update(t, b));
    wait_for_waiter(&store, &AccessKey::Object(b), older.id(), LockMode::Write);

    let err = younger.call(move |s, t| s.mark_for_update(t, a)).unwrap_err();
    assert!(matches!(err, StoreError::Deadlock { .. }), "{err}");
    assert!(younger.txn().is_aborted());
    assert!(err.is_retryable());

    older_wait.result().unwrap();
    older.commit().unwrap();
    assert_eq!(store.stats().deadlocks(), 1);
}

#[test]
fn placeholders_are_never_readable() {
    let store = TestStore::memory_with(darkstore_testkit::test_config().allocation_block_size(10));
    let oid = seed(&store, b"x");
    let last = ObjectId::new(oid.as_u64() + 9).unwrap();
    assert!(store.is_placeholder_committed(last).unwrap());

    for for_update in [false, true] {
        let err = store
            .transaction(|txn| store.get_object(txn, last, for_update))
            .unwrap_err();
        assert!(matches!(err, StoreError::ObjectNotFound { .. }));
    }
    let err = store
        .transaction(|txn| store.mark_for_update(txn, last))
        .unwrap_err();
    assert!(err.is_not_found());

    let seen = store.transaction(|txn| store.next_object_id(txn, Some(oid))).unwrap();
    assert_eq!(seen, None);
    assert!(store.is_placeholder_committed(last).unwrap());
}

#[test]
fn contended_increments_are_not_lost() {
    let store = TestStore::memory();
    let config = StressConfig {
        operations: 400,
        threads: 8,
        ..Default::default()
    };
    let (result, counter) = stress_contended_counter(store.store.clone(), &config);
    assert_eq!(result.failed_ops, 0);
    assert_eq!(read_counter(&store, counter).unwrap(), 400);
}

#[test]
fn null_coordinator_never_blocks() {
    let store = TestStore::memory_with(test_config().coordinator(CoordinatorKind::Null));
    assert!(store.access().lock_manager().is_none());
    let oid = seed(&store, b"start");

    let w1 = TxnRunner::begin(&store);
    let w2 = TxnRunner::begin(&store);
    assert_eq!(w1.call(move |s, t| s.get_object(t, oid, true)).unwrap(), b"start");
    assert_eq!(w2.call(move |s, t| s.get_object(t, oid, true)).unwrap(), b"start");
    w1.call(move |s, t| s.set_object(t, oid, b"one")).unwrap();
    w2.call(move |s, t| s.set_object(t, oid, b"two")).unwrap();
    w1.commit().unwrap();
    w2.commit().unwrap();

    let value = store.transaction(|txn| store.get_object(txn, oid, false)).unwrap();
    assert_eq!(value, b"two");
    assert_eq!(store.stats().lock_waits(), 0);
}
