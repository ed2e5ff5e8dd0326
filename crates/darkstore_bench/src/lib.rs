//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use darkstore_core::{CoordinatorKind, DataStore, ObjectId, StoreConfig};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Generate random object data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` random binding names of the given length.
pub fn random_names(count: usize, len: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| (&mut rng).sample_iter(&Alphanumeric).take(len).map(char::from).collect())
        .collect()
}

/// Opens an in-memory store using the given access coordinator.
pub fn open_store(coordinator: CoordinatorKind) -> Arc<DataStore> {
    let config = StoreConfig::new()
        .coordinator(coordinator)
        .txn_timeout(Duration::from_secs(60));
    DataStore::open(config).expect("Failed to open store")
}

/// Creates `count` objects holding `size` bytes each, in one transaction.
pub fn populate(store: &DataStore, count: usize, size: usize) -> Vec<ObjectId> {
    let data = random_data(size);
    store
        .transaction(|txn| {
            let mut oids = Vec::with_capacity(count);
            for _ in 0..count {
                let oid = store.create_object(txn)?;
                store.set_object(txn, oid, &data)?;
                oids.push(oid);
            }
            Ok(oids)
        })
        .expect("Failed to populate store")
}

/// Binds every name to a fresh object, in one transaction.
pub fn bind_all(store: &DataStore, names: &[String]) {
    store
        .transaction(|txn| {
            for name in names {
                let oid = store.create_object(txn)?;
                store.set_object(txn, oid, name.as_bytes())?;
                store.set_binding(txn, name, oid)?;
            }
            Ok(())
        })
        .expect("Failed to bind names");
}
