use std::sync::{Arc, PoisonError, RwLock};

use super::{CommandLog, LogEntry, LogError, LogSeq, OwnedLogEntry};

/// Process-local log. Every clone appends to and tails the same entries, which
/// lets tests run several nodes against one log.
#[derive(Debug, Default, Clone)]
pub struct MemLog {
    shared: Arc<RwLock<Vec<OwnedLogEntry>>>,
}

impl MemLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.shared.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CommandLog for MemLog {
    fn append(&mut self, entry: LogEntry<'_>) -> Result<LogSeq, LogError> {
        let mut entries = self.shared.write().map_err(|_| LogError::Poisoned)?;
        let seq = entries.len() as LogSeq;
        entries.push(OwnedLogEntry {
            seq,
            kind: entry.kind,
            payload: entry.payload.to_vec(),
        });
        Ok(seq)
    }

    fn load_from(&self, from: LogSeq) -> Result<Vec<OwnedLogEntry>, LogError> {
        let entries = self.shared.read().map_err(|_| LogError::Poisoned)?;
        let skip = usize::try_from(from).unwrap_or(usize::MAX);
        Ok(entries.iter().skip(skip).cloned().collect())
    }

    fn next_seq(&self) -> LogSeq {
        self.len() as LogSeq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::command;

    fn append_command(log: &mut MemLog, text: &str) -> LogSeq {
        let record = command(text);
        let payload = record.encode().unwrap();
        log.append(LogEntry::new(record.kind().unwrap(), &payload))
            .unwrap()
    }

    #[test]
    fn tail_starts_at_requested_offset() {
        let mut log = MemLog::new();
        append_command(&mut log, "REGISTER TOPIC orders");
        append_command(&mut log, "UNSET 'auto.offset.reset'");

        let tail = log.load_from(1).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].seq, 1);
        assert_eq!(
            tail[0].record().unwrap().statement_text,
            "UNSET 'auto.offset.reset'"
        );
        assert!(log.load_from(2).unwrap().is_empty());
        assert!(log.load_from(LogSeq::MAX).unwrap().is_empty());
    }

    #[test]
    fn clones_append_to_one_sequence() {
        let mut node_a = MemLog::new();
        let mut node_b = node_a.clone();
        assert!(node_b.is_empty());
        assert_eq!(append_command(&mut node_a, "REGISTER TOPIC a"), 0);
        assert_eq!(append_command(&mut node_b, "DROP TOPIC a"), 1);
        assert_eq!(node_a.next_seq(), 2);
        let first = node_b.load_from(0).unwrap().remove(0);
        assert_eq!(first.record().unwrap().statement_text, "REGISTER TOPIC a");
    }
}
