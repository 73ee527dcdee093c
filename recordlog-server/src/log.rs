//! Volatile in-memory record sequence.
//!
//! Records are numbered by insertion order; the offset handed back by
//! [`CommitLog::append`] is the index a later [`CommitLog::read`] must use.
//! Nothing here is durable: contents are lost when the process exits. The
//! durable byte-addressed store lives in `recordlog-store` and is not
//! consulted by this sequence.

use crate::error::ServerError;
use parking_lot::Mutex;
use recordlog_protocol::Record;

/// In-memory append-only record sequence.
pub struct CommitLog {
    records: Mutex<Vec<Record>>,
}

impl CommitLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Appends a record, returning the offset it was stored under.
    pub fn append(&self, mut record: Record) -> u64 {
        let mut records = self.records.lock();
        let offset = records.len() as u64;
        record.offset = offset;
        records.push(record);
        offset
    }

    /// Reads the record at the given offset.
    pub fn read(&self, offset: u64) -> Result<Record, ServerError> {
        let records = self.records.lock();
        records
            .get(offset as usize)
            .cloned()
            .ok_or(ServerError::OffsetNotFound(offset))
    }

    /// Returns the number of records appended so far.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Default for CommitLog {
    fn default() -> Self {
        Self::new()
    }
}
