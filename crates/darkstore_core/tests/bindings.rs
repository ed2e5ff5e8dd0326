//! Name binding isolation: next-key locking, resampling and timeouts.

use darkstore_core::{AccessKey, DataStore, LockMode, ObjectId, StoreError};
use darkstore_testkit::{
    count_bindings, lock_owners, stress_concurrent_bindings, test_config, wait_for_waiter,
    StressConfig, TestStore, TxnRunner,
};
use std::time::{Duration, Instant};

fn oid(n: u64) -> ObjectId {
    ObjectId::new(n).unwrap()
}

fn name(n: &str) -> AccessKey {
    AccessKey::Name(n.to_owned())
}

fn bind(store: &DataStore, names: &[(&str, u64)]) {
    store
        .transaction(|txn| {
            for (n, id) in names {
                store.set_binding(txn, n, oid(*id))?;
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn rebinding_waits_for_reader() {
    let store = TestStore::memory();
    bind(&store, &[("a", 100)]);

    let t2 = TxnRunner::begin(&store);
    let t3 = TxnRunner::begin(&store);
    assert_eq!(t2.call(|s, t| s.get_binding(t, "a")).unwrap(), oid(100));

    let set = t3.run(|s, t| s.set_binding(t, "a", oid(200)));
    wait_for_waiter(&store, &name("a"), t3.id(), LockMode::Write);
    set.assert_blocked();

    t2.commit().unwrap();
    set.result().unwrap();
    t3.commit().unwrap();

    let found = store.transaction(|txn| store.get_binding(txn, "a")).unwrap();
    assert_eq!(found, oid(200));
}

#[test]
fn remover_relocks_after_inserter_aborts() {
    let store = TestStore::memory();
    bind(&store, &[("a", 1), ("b", 2)]);

    let t2 = TxnRunner::begin(&store);
    let t3 = TxnRunner::begin(&store);
    let t4 = TxnRunner::begin(&store);
    t2.call(|s, t| s.set_binding(t, "c", oid(3))).unwrap();

    let remove = t3.run(|s, t| s.remove_binding(t, "b"));
    wait_for_waiter(&store, &AccessKey::NameEnd, t3.id(), LockMode::Write);
    remove.assert_blocked();

    t2.abort().unwrap();
    assert!(remove.result().unwrap());
    assert_eq!(lock_owners(&store, &AccessKey::NameEnd), vec![(t3.id(), LockMode::Write)]);
    assert!(lock_owners(&store, &name("c")).is_empty());

    let next = t4.run(|s, t| s.next_bound_name(t, Some("a")));
    wait_for_waiter(&store, &name("b"), t4.id(), LockMode::Read);
    next.assert_blocked();

    t3.commit().unwrap();
    assert_eq!(next.result().unwrap(), None);
    t4.commit().unwrap();
}

#[test]
fn remover_locks_name_committed_while_waiting() {
    let store = TestStore::memory();
    bind(&store, &[("a", 1), ("b", 2)]);

    let t2 = TxnRunner::begin(&store);
    let t3 = TxnRunner::begin(&store);
    t2.call(|s, t| s.set_binding(t, "c", oid(3))).unwrap();

    let remove = t3.run(|s, t| s.remove_binding(t, "b"));
    wait_for_waiter(&store, &AccessKey::NameEnd, t3.id(), LockMode::Write);

    t2.commit().unwrap();
    assert!(remove.result().unwrap());
    assert_eq!(lock_owners(&store, &name("c")), vec![(t3.id(), LockMode::Write)]);
    t3.commit().unwrap();

    let names = store
        .transaction(|txn| {
            let first = store.next_bound_name(txn, None)?;
            let second = store.next_bound_name(txn, first.as_deref())?;
            Ok((first, second))
        })
        .unwrap();
    assert_eq!(names, (Some("a".to_owned()), Some("c".to_owned())));
}

#[test]
fn scan_is_repeatable() {
    let store = TestStore::memory();
    bind(&store, &[("a", 1), ("b", 2), ("c", 3)]);

    let scanner = TxnRunner::begin(&store);
    let inserter = TxnRunner::begin(&store);
    let scan = |s: &DataStore, t: &darkstore_core::Transaction| {
        let mut names = Vec::new();
        let mut next = s.next_bound_name(t, None)?;
        while let Some(current) = next {
            next = s.next_bound_name(t, Some(&current))?;
            names.push(current);
        }
        Ok::<_, StoreError>(names)
    };

    let first = scanner.call(scan).unwrap();
    assert_eq!(first, ["a", "b", "c"]);

    let insert = inserter.run(|s, t| s.set_binding(t, "bb", oid(4)));
    wait_for_waiter(&store, &name("c"), inserter.id(), LockMode::Write);
    let append = TxnRunner::begin(&store);
    let appended = append.run(|s, t| s.set_binding(t, "d", oid(5)));
    wait_for_waiter(&store, &AccessKey::NameEnd, append.id(), LockMode::Write);

    assert_eq!(scanner.call(scan).unwrap(), first);
    insert.assert_blocked();
    appended.assert_blocked();

    scanner.commit().unwrap();
    insert.result().unwrap();
    appended.result().unwrap();
    inserter.commit().unwrap();
    append.commit().unwrap();
    assert_eq!(count_bindings(&store).unwrap(), 5);
}

#[test]
fn absent_name_stays_absent() {
    let store = TestStore::memory();
    bind(&store, &[("a", 1), ("z", 26)]);

    let reader = TxnRunner::begin(&store);
    let writer = TxnRunner::begin(&store);
    let err = reader.call(|s, t| s.get_binding(t, "m")).unwrap_err();
    assert!(matches!(err, StoreError::NameNotBound { .. }));
    assert_eq!(lock_owners(&store, &name("z")), vec![(reader.id(), LockMode::Read)]);

    let set = writer.run(|s, t| s.set_binding(t, "m", oid(13)));
    wait_for_waiter(&store, &name("m"), writer.id(), LockMode::Write);
    assert!(reader.call(|s, t| s.get_binding(t, "m")).unwrap_err().is_not_found());

    reader.commit().unwrap();
    set.result().unwrap();
    writer.commit().unwrap();
}

#[test]
fn removing_unbound_name_reads_next() {
    let store = TestStore::memory();
    bind(&store, &[("k", 1)]);

    let txn = TxnRunner::begin(&store);
    assert!(!txn.call(|s, t| s.remove_binding(t, "j")).unwrap());
    assert_eq!(lock_owners(&store, &name("j")), vec![(txn.id(), LockMode::Write)]);
    assert_eq!(lock_owners(&store, &name("k")), vec![(txn.id(), LockMode::Read)]);
    txn.commit().unwrap();
}

#[test]
fn blocked_writer_times_out() {
    let config = test_config().lock_timeout(Duration::from_millis(100));
    let store = TestStore::memory_with(config);

    let holder = TxnRunner::begin_with_timeout(&store, Duration::from_millis(200));
    let waiter = TxnRunner::begin(&store);
    holder.call(|s, t| s.set_binding(t, "x", oid(1))).unwrap();

    let started = Instant::now();
    let err = waiter.call(|s, t| s.set_binding(t, "x", oid(2))).unwrap_err();
    assert!(matches!(err, StoreError::Timeout { .. }), "{err}");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(waiter.txn().is_aborted());
    assert_eq!(store.stats().lock_timeouts(), 1);

    let err = waiter.call(|s, t| s.get_binding(t, "y")).unwrap_err();
    assert!(matches!(err, StoreError::TransactionNotActive { .. }));
}

#[test]
fn blocked_writer_granted_when_holder_ends() {
    let store = TestStore::memory();

    let holder = TxnRunner::begin_with_timeout(&store, Duration::from_secs(1));
    let waiter = TxnRunner::begin(&store);
    holder.call(|s, t| s.set_binding(t, "x", oid(1))).unwrap();

    let set = waiter.run(|s, t| s.set_binding(t, "x", oid(2)));
    wait_for_waiter(&store, &name("x"), waiter.id(), LockMode::Write);
    holder.commit().unwrap();
    set.result().unwrap();
    waiter.commit().unwrap();

    let found = store.transaction(|txn| store.get_binding(txn, "x")).unwrap();
    assert_eq!(found, oid(2));
}

#[test]
fn concurrent_binders_all_land() {
    let store = TestStore::memory();
    let config = StressConfig {
        operations: 200,
        threads: 4,
        ..Default::default()
    };
    let result = stress_concurrent_bindings(store.store.clone(), &config);
    assert_eq!(result.failed_ops, 0);
    assert_eq!(count_bindings(&store).unwrap(), 200);
}
