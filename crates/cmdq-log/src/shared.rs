use std::sync::{Arc, Mutex, MutexGuard};

use super::{CommandLog, CommandRecord, LogEntry, LogError, LogSeq, OwnedLogEntry};

/// Cloneable handle that serializes access to one log backend. Concurrent
/// appenders are ordered by arrival at the lock.
#[derive(Clone)]
pub struct SharedLog {
    inner: Arc<Mutex<Box<dyn CommandLog>>>,
}

impl SharedLog {
    pub fn new(log: impl CommandLog + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(log))),
        }
    }

    /// Encodes and appends a command, returning its offset.
    pub fn append_record(&self, record: &CommandRecord) -> Result<LogSeq, LogError> {
        let kind = record
            .kind()
            .ok_or_else(|| LogError::NotACommand(record.statement_text.clone()))?;
        let payload = record.encode()?;
        self.append(LogEntry::new(kind, &payload))
    }

    pub fn append(&self, entry: LogEntry<'_>) -> Result<LogSeq, LogError> {
        let seq = self.lock()?.append(entry)?;
        log::debug!("appended {:?} at offset {seq}", entry.kind);
        Ok(seq)
    }

    pub fn load_from(&self, from: LogSeq) -> Result<Vec<OwnedLogEntry>, LogError> {
        self.lock()?.load_from(from)
    }

    pub fn next_seq(&self) -> Result<LogSeq, LogError> {
        Ok(self.lock()?.next_seq())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn CommandLog>>, LogError> {
        self.inner.lock().map_err(|_| LogError::Poisoned)
    }
}

impl std::fmt::Debug for SharedLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedLog").finish_non_exhaustive()
    }
}

impl From<Box<dyn CommandLog>> for SharedLog {
    fn from(log: Box<dyn CommandLog>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(log)),
        }
    }
}
