//! Transaction handles.

use super::participant::TransactionParticipant;
use crate::error::{AbortCause, StoreError, StoreResult};
use crate::types::TransactionId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Operations may be performed.
    Active,
    /// Participants are being prepared.
    Preparing,
    /// Participants are being aborted.
    Aborting,
    /// The transaction has been aborted.
    Aborted,
    /// Prepared participants are being committed.
    Committing,
    /// The transaction has committed.
    Committed,
}

struct TxnState {
    status: TransactionStatus,
    participants: Vec<Arc<dyn TransactionParticipant>>,
    has_durable: bool,
    abort_cause: Option<AbortCause>,
}

struct TxnInner {
    id: TransactionId,
    created: Instant,
    timeout: Duration,
    deadline: Instant,
    owner: ThreadId,
    state: Mutex<TxnState>,
}

/// A transaction.
///
/// Handles are cheap to clone and all clones refer to the same
/// transaction. A transaction belongs to the thread that began it: joining,
/// committing and aborting from any other thread is an error.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TxnInner>,
}

fn same_participant(a: &Arc<dyn TransactionParticipant>, b: &Arc<dyn TransactionParticipant>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

impl Transaction {
    pub(crate) fn new(id: TransactionId, timeout: Duration) -> Self {
        let created = Instant::now();
        Self {
            inner: Arc::new(TxnInner {
                id,
                created,
                timeout,
                deadline: created + timeout,
                owner: thread::current().id(),
                state: Mutex::new(TxnState {
                    status: TransactionStatus::Active,
                    participants: Vec::new(),
                    has_durable: false,
                    abort_cause: None,
                }),
            }),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.inner.id
    }

    /// Returns when the transaction was created.
    #[must_use]
    pub fn created(&self) -> Instant {
        self.inner.created
    }

    /// Returns the transaction timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Returns the instant after which the transaction has timed out.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.inner.deadline
    }

    /// Returns the thread that owns the transaction.
    #[must_use]
    pub fn owner(&self) -> ThreadId {
        self.inner.owner
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.inner.state.lock().status
    }

    /// Returns true while operations may still be performed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status() == TransactionStatus::Active
    }

    /// Returns true once an abort has started.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.inner.state.lock().abort_cause.is_some()
    }

    /// Returns why the transaction was aborted, if it was.
    #[must_use]
    pub fn abort_cause(&self) -> Option<AbortCause> {
        self.inner.state.lock().abort_cause.clone()
    }

    fn check_thread(&self, operation: &str) -> StoreResult<()> {
        if thread::current().id() != self.inner.owner {
            return Err(StoreError::illegal_state(format!(
                "{operation} of {} called from the wrong thread",
                self.id()
            )));
        }
        Ok(())
    }

    fn not_active(&self) -> StoreError {
        StoreError::TransactionNotActive { txn: self.id() }
    }

    /// Checks whether the deadline has passed, aborting the transaction if
    /// it has.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] after aborting an expired
    /// transaction, or [`StoreError::TransactionNotActive`] if it has
    /// already ended.
    pub fn check_timeout(&self) -> StoreResult<()> {
        self.check_thread("check_timeout")?;
        match self.status() {
            TransactionStatus::Aborted | TransactionStatus::Committed => {
                return Err(self.not_active())
            }
            TransactionStatus::Aborting | TransactionStatus::Committing => return Ok(()),
            TransactionStatus::Active | TransactionStatus::Preparing => {}
        }
        let now = Instant::now();
        if now > self.inner.deadline {
            let error = StoreError::Timeout {
                txn: self.id(),
                conflicting: None,
            };
            debug!(
                txn = %self.id(),
                running_ms = now.duration_since(self.inner.created).as_millis() as u64,
                "transaction timed out"
            );
            let _ = self.abort(AbortCause::from(&error));
            return Err(error);
        }
        Ok(())
    }

    /// Adds a participant. Returns `false` if it had already joined.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TransactionNotActive`] if the transaction has
    /// ended, or [`StoreError::IllegalState`] if it is not active, the
    /// caller is not the owning thread, or a second durable participant
    /// tries to join.
    pub fn join(&self, participant: Arc<dyn TransactionParticipant>) -> StoreResult<bool> {
        self.check_thread("join")?;
        let mut state = self.inner.state.lock();
        match state.status {
            TransactionStatus::Active => {}
            TransactionStatus::Aborted | TransactionStatus::Committed => {
                return Err(self.not_active())
            }
            status => {
                return Err(StoreError::illegal_state(format!(
                    "{} is not active: {status:?}",
                    self.id()
                )))
            }
        }
        if state
            .participants
            .iter()
            .any(|p| same_participant(p, &participant))
        {
            return Ok(false);
        }
        trace!(txn = %self.id(), participant = participant.type_name(), "join");
        if participant.is_durable() {
            if state.has_durable {
                return Err(StoreError::illegal_state(format!(
                    "{} already has a durable participant",
                    self.id()
                )));
            }
            state.has_durable = true;
            state.participants.push(participant);
        } else if state.has_durable {
            let at = state.participants.len() - 1;
            state.participants.insert(at, participant);
        } else {
            state.participants.push(participant);
        }
        Ok(true)
    }

    /// Aborts the transaction, aborting every participant.
    ///
    /// Aborting a transaction that is already aborting does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TransactionNotActive`] if it has already been
    /// aborted, or [`StoreError::IllegalState`] if it is committing or
    /// committed or the caller is not the owning thread.
    pub fn abort(&self, cause: AbortCause) -> StoreResult<()> {
        self.check_thread("abort")?;
        let participants = {
            let mut state = self.inner.state.lock();
            match state.status {
                TransactionStatus::Active | TransactionStatus::Preparing => {}
                TransactionStatus::Aborting => return Ok(()),
                TransactionStatus::Aborted => return Err(self.not_active()),
                TransactionStatus::Committing | TransactionStatus::Committed => {
                    return Err(StoreError::illegal_state(format!(
                        "{} cannot abort while {:?}",
                        self.id(),
                        state.status
                    )))
                }
            }
            debug!(txn = %self.id(), %cause, "abort");
            state.status = TransactionStatus::Aborting;
            state.abort_cause = Some(cause);
            state.participants.clone()
        };
        for participant in participants {
            if let Err(e) = participant.abort(self) {
                warn!(
                    txn = %self.id(),
                    participant = participant.type_name(),
                    error = %e,
                    "participant abort failed"
                );
            }
        }
        self.inner.state.lock().status = TransactionStatus::Aborted;
        Ok(())
    }

    fn set_status(&self, status: TransactionStatus) {
        self.inner.state.lock().status = status;
    }

    fn aborted_error(&self) -> StoreError {
        match self.abort_cause() {
            Some(cause) if cause.is_retryable() => StoreError::Timeout {
                txn: self.id(),
                conflicting: None,
            },
            _ => self.not_active(),
        }
    }

    fn fail(&self, error: StoreError) -> StoreError {
        if !self.is_aborted() {
            let _ = self.abort(AbortCause::from(&error));
        }
        error
    }

    /// Commits the transaction. The last participant gets
    /// `prepare_and_commit`; every other one is prepared first and, unless
    /// it was read-only, committed afterwards.
    pub(crate) fn commit(&self) -> StoreResult<()> {
        self.check_thread("commit")?;
        match self.status() {
            TransactionStatus::Active => {}
            TransactionStatus::Aborted => return Err(self.aborted_error()),
            status => {
                return Err(StoreError::illegal_state(format!(
                    "{} is not active: {status:?}",
                    self.id()
                )))
            }
        }
        self.check_timeout()?;

        self.set_status(TransactionStatus::Preparing);
        let participants = self.inner.state.lock().participants.clone();
        let count = participants.len();
        let mut prepared = Vec::with_capacity(count);
        for (i, participant) in participants.into_iter().enumerate() {
            let result = if i + 1 < count {
                participant.prepare(self).map(|read_only| {
                    trace!(txn = %self.id(), participant = participant.type_name(), read_only, "prepared");
                    if read_only {
                        self.inner
                            .state
                            .lock()
                            .participants
                            .retain(|p| !same_participant(p, &participant));
                    } else {
                        prepared.push(participant.clone());
                    }
                })
            } else {
                participant.prepare_and_commit(self).map(|()| {
                    trace!(txn = %self.id(), participant = participant.type_name(), "prepared and committed");
                })
            };
            if let Err(e) = result {
                return Err(self.fail(e));
            }
            if self.is_aborted() {
                return Err(self.aborted_error());
            }
        }

        self.set_status(TransactionStatus::Committing);
        for participant in prepared {
            if let Err(e) = participant.commit(self) {
                warn!(
                    txn = %self.id(),
                    participant = participant.type_name(),
                    error = %e,
                    "participant commit failed"
                );
            }
        }
        self.set_status(TransactionStatus::Committed);
        debug!(txn = %self.id(), "committed");
        Ok(())
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Transaction {}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("timeout", &self.inner.timeout)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner.id, f)
    }
}
