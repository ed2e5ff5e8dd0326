//! Transactions driven from their own thread.
//!
//! A transaction may only be used by the thread that began it, and a
//! blocked lock request stalls that thread. [`TxnRunner`] owns a worker
//! thread that begins one transaction and then runs the closures it is
//! sent, so a test can start a request, check that it is blocked, and
//! resolve it from another transaction.

use darkstore_core::{DataStore, StoreResult, Transaction, TransactionId};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Job = Box<dyn FnOnce(&DataStore, &Transaction) + Send>;

/// How long a call may take before [`Call::result`] gives up.
const RESULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a call must stay unfinished to count as blocked.
const BLOCKED_GRACE: Duration = Duration::from_millis(50);

/// A transaction running on a dedicated thread.
pub struct TxnRunner {
    txn: Transaction,
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl TxnRunner {
    /// Begins a transaction with the store's default timeout.
    pub fn begin(store: &Arc<DataStore>) -> Self {
        Self::begin_with_timeout(store, store.transactions().default_timeout())
    }

    /// Begins a transaction with the given timeout.
    pub fn begin_with_timeout(store: &Arc<DataStore>, timeout: Duration) -> Self {
        let (jobs, inbox) = mpsc::channel::<Job>();
        let (started, txn) = mpsc::channel();
        let store = store.clone();
        let handle = thread::Builder::new()
            .name("txn-runner".into())
            .spawn(move || {
                let txn = match store.transactions().begin_with_timeout(timeout) {
                    Ok(txn) => txn,
                    Err(e) => {
                        let _ = started.send(Err(e));
                        return;
                    }
                };
                let _ = started.send(Ok(txn.clone()));
                for job in inbox {
                    job(store.as_ref(), &txn);
                }
                if txn.is_active() {
                    let _ = store.transactions().abort(&txn);
                }
            })
            .expect("Failed to spawn runner thread");
        let txn = txn
            .recv()
            .expect("runner thread exited")
            .expect("Failed to begin transaction");
        Self {
            txn,
            jobs: Some(jobs),
            handle: Some(handle),
        }
    }

    /// Returns the transaction.
    pub fn txn(&self) -> &Transaction {
        &self.txn
    }

    /// Returns the transaction ID.
    pub fn id(&self) -> TransactionId {
        self.txn.id()
    }

    /// Starts `f` on the runner thread without waiting for it.
    pub fn run<T, F>(&self, f: F) -> Call<T>
    where
        T: Send + 'static,
        F: FnOnce(&DataStore, &Transaction) -> T + Send + 'static,
    {
        let (reply, rx) = mpsc::channel();
        let job: Job = Box::new(move |store: &DataStore, txn: &Transaction| {
            let _ = reply.send(f(store, txn));
        });
        self.jobs
            .as_ref()
            .expect("runner already stopped")
            .send(job)
            .expect("runner thread exited");
        Call { rx }
    }

    /// Runs `f` on the runner thread and waits for its result.
    pub fn call<T, F>(&self, f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(&DataStore, &Transaction) -> T + Send + 'static,
    {
        self.run(f).result()
    }

    /// Commits the transaction.
    pub fn commit(&self) -> StoreResult<()> {
        self.call(|store, txn| store.commit(txn))
    }

    /// Aborts the transaction.
    pub fn abort(&self) -> StoreResult<()> {
        self.call(|store, txn| store.abort(txn))
    }
}

impl Drop for TxnRunner {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for TxnRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxnRunner")
            .field("txn", &self.txn.id())
            .finish_non_exhaustive()
    }
}

/// A call started by [`TxnRunner::run`].
#[derive(Debug)]
pub struct Call<T> {
    rx: Receiver<T>,
}

impl<T> Call<T> {
    /// Waits for the call to finish and returns its result.
    ///
    /// # Panics
    ///
    /// Panics if the call does not finish within five seconds.
    pub fn result(self) -> T {
        match self.rx.recv_timeout(RESULT_TIMEOUT) {
            Ok(value) => value,
            Err(RecvTimeoutError::Timeout) => panic!("call did not finish"),
            Err(RecvTimeoutError::Disconnected) => panic!("runner thread exited"),
        }
    }

    /// Checks that the call has not finished yet.
    ///
    /// # Panics
    ///
    /// Panics if the call finishes within a short grace period.
    pub fn assert_blocked(&self) {
        match self.rx.recv_timeout(BLOCKED_GRACE) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(_) => panic!("call finished but should be blocked"),
            Err(RecvTimeoutError::Disconnected) => panic!("runner thread exited"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestStore;

    #[test]
    fn runs_on_owner_thread() {
        let store = TestStore::memory();
        let runner = TxnRunner::begin(&store);
        let oid = runner
            .call(|store, txn| {
                let oid = store.create_object(txn)?;
                store.set_object(txn, oid, b"v")?;
                Ok::<_, darkstore_core::StoreError>(oid)
            })
            .unwrap();
        runner.commit().unwrap();
        let value = store.transaction(|txn| store.get_object(txn, oid, false)).unwrap();
        assert_eq!(value, b"v");
    }

    #[test]
    fn blocked_call_finishes_after_commit() {
        let store = TestStore::memory();
        let oid = store
            .transaction(|txn| {
                let oid = store.create_object(txn)?;
                store.set_object(txn, oid, b"a")?;
                Ok(oid)
            })
            .unwrap();

        let writer = TxnRunner::begin(&store);
        let reader = TxnRunner::begin(&store);
        writer
            .call(move |store, txn| store.set_object(txn, oid, b"b"))
            .unwrap();
        let read = reader.run(move |store, txn| store.get_object(txn, oid, false));
        read.assert_blocked();
        writer.commit().unwrap();
        assert_eq!(read.result().unwrap(), b"b");
        reader.commit().unwrap();
    }

    #[test]
    fn dropped_runner_aborts() {
        let store = TestStore::memory();
        {
            let runner = TxnRunner::begin(&store);
            runner.call(|store, txn| store.create_object(txn)).unwrap();
            assert_eq!(store.active_transactions(), 1);
        }
        assert_eq!(store.active_transactions(), 0);
    }
}
