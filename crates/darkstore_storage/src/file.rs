//! File-based storage backend for persistent storage.

use crate::backend::{IsolationLevel, StorageBackend};
use crate::error::{StorageError, StorageResult};
use crate::record::{encode_batch, read_record, ReadOutcome};
use crate::table::{Entry, Table, TableSet, WriteBatch};
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// A file-based storage backend.
///
/// Every applied batch is appended to a single log file as one
/// checksummed record (see [`crate::record`]), and the tables are kept in
/// memory. Opening the backend replays the log.
///
/// # Durability
///
/// - `apply(batch, true)` calls `File::sync_data()` before returning
/// - `apply(batch, false)` leaves the record in the OS page cache
/// - `flush()` syncs everything written so far
///
/// A crash can leave a partially written record at the end of the log. It
/// is cut off on the next open; its batch was never acknowledged as
/// durable, so nothing committed is lost. A bad record followed by more
/// data is reported as corruption.
///
/// # Example
///
/// ```no_run
/// use darkstore_storage::{FileBackend, IsolationLevel, StorageBackend, Table, WriteBatch};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("store.log"), IsolationLevel::default()).unwrap();
/// let mut batch = WriteBatch::new();
/// batch.put(Table::Names, b"root".to_vec(), b"1".to_vec());
/// backend.apply(&batch, true).unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
    tables: RwLock<TableSet>,
    isolation: IsolationLevel,
    closed: AtomicBool,
    truncated_bytes: u64,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path and replays it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, read or repaired, or
    /// if a record other than the last one is corrupt.
    pub fn open(path: &Path, isolation: IsolationLevel) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let mut tables = TableSet::default();
        let mut offset = 0usize;
        while offset < data.len() {
            match read_record(&data[offset..]) {
                ReadOutcome::Record(batch, len) => {
                    tables.apply(&batch);
                    offset += len;
                }
                ReadOutcome::Truncated => break,
                ReadOutcome::Invalid(message) => {
                    return Err(StorageError::corrupted(offset as u64, message));
                }
            }
        }

        let truncated_bytes = (data.len() - offset) as u64;
        if truncated_bytes > 0 {
            file.set_len(offset as u64)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::End(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            tables: RwLock::new(tables),
            isolation,
            closed: AtomicBool::new(false),
            truncated_bytes,
        })
    }

    /// Opens or creates a file backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be opened.
    pub fn open_with_create_dirs(path: &Path, isolation: IsolationLevel) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path, isolation)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns how many bytes of torn tail were cut off when opening.
    #[must_use]
    pub fn truncated_bytes(&self) -> u64 {
        self.truncated_bytes
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, table: Table, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self.tables.read().get(table, key))
    }

    fn next_entry(&self, table: Table, from: Bound<&[u8]>) -> StorageResult<Option<Entry>> {
        self.check_open()?;
        Ok(self.tables.read().next_entry(table, from))
    }

    fn prev_entry(&self, table: Table, before: Bound<&[u8]>) -> StorageResult<Option<Entry>> {
        self.check_open()?;
        Ok(self.tables.read().prev_entry(table, before))
    }

    fn apply(&self, batch: &WriteBatch, sync: bool) -> StorageResult<()> {
        self.check_open()?;
        if batch.is_empty() {
            return Ok(());
        }
        let record = encode_batch(batch)?;

        // Holding the file lock across the table update keeps replay order
        // identical to the order readers observed.
        let mut file = self.file.lock();
        file.write_all(&record)?;
        if sync {
            file.sync_data()?;
        }
        self.tables.write().apply(batch);
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        self.check_open()?;
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn isolation(&self) -> IsolationLevel {
        self.isolation
    }
}
