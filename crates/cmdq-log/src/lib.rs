//! Append-only, strictly ordered command log.
//!
//! Every accepted command gets the next dense offset, starting at 0. Nodes
//! tail the log with [`CommandLog::load_from`] and apply entries in order.

pub mod fs;
pub mod mem;
pub mod shared;

use std::collections::BTreeMap;

use cmdq_statement::{Statement, StatementKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use fs::FsLog;
pub use mem::MemLog;
pub use shared::SharedLog;

/// Offset assigned to every accepted command.
pub type LogSeq = u64;

/// Classification of a log entry, mirroring the distributed statement kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    RegisterTopic,
    DropTopic,
    SetProperty,
    UnsetProperty,
}

impl LogKind {
    /// `None` for statements that never enter the log.
    pub fn for_statement(kind: &StatementKind) -> Option<LogKind> {
        match kind {
            StatementKind::RegisterTopic(_) => Some(LogKind::RegisterTopic),
            StatementKind::DropTopic(_) => Some(LogKind::DropTopic),
            StatementKind::SetProperty(_) => Some(LogKind::SetProperty),
            StatementKind::UnsetProperty(_) => Some(LogKind::UnsetProperty),
            StatementKind::PrintTopic(_)
            | StatementKind::ListTopics
            | StatementKind::ListFunctions
            | StatementKind::ListProperties => None,
        }
    }
}

/// Payload stored for each accepted command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub statement_text: String,
    pub statement: Statement,
    /// Raw client overrides that were in effect when the command was submitted.
    #[serde(default)]
    pub overrides: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub submitted_at_ns: u64,
}

impl CommandRecord {
    pub fn kind(&self) -> Option<LogKind> {
        LogKind::for_statement(self.statement.kind())
    }

    pub fn encode(&self) -> Result<Vec<u8>, LogError> {
        Ok(serde_cbor::to_vec(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, LogError> {
        Ok(serde_cbor::from_slice(payload)?)
    }
}

/// Borrowed entry used when appending.
#[derive(Debug, Clone, Copy)]
pub struct LogEntry<'a> {
    pub kind: LogKind,
    pub payload: &'a [u8],
}

impl<'a> LogEntry<'a> {
    pub fn new(kind: LogKind, payload: &'a [u8]) -> Self {
        Self { kind, payload }
    }
}

/// Owned entry returned by log readers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnedLogEntry {
    pub seq: LogSeq,
    pub kind: LogKind,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl OwnedLogEntry {
    pub fn record(&self) -> Result<CommandRecord, LogError> {
        CommandRecord::decode(&self.payload)
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Cbor(#[from] serde_cbor::Error),
    #[error("corrupt entry: {0}")]
    Corrupt(String),
    #[error("statement '{0}' is not a log command")]
    NotACommand(String),
    #[error("command log lock poisoned")]
    Poisoned,
}

/// Backend interface. Implementations assign dense, strictly increasing
/// offsets and never reorder or drop accepted entries.
pub trait CommandLog: Send {
    fn append(&mut self, entry: LogEntry<'_>) -> Result<LogSeq, LogError>;

    /// Loads entries starting at `from` (inclusive). Passing 0 returns the full log.
    fn load_from(&self, from: LogSeq) -> Result<Vec<OwnedLogEntry>, LogError>;

    /// Returns the offset the next append will receive.
    fn next_seq(&self) -> LogSeq;
}

#[cfg(test)]
pub(crate) mod testing {
    use cmdq_statement::{ParsedStatement, parse_statements};

    use super::CommandRecord;

    /// Record for the first statement in `text`.
    pub fn command(text: &str) -> CommandRecord {
        let ParsedStatement { text, statement } = parse_statements(text).unwrap().remove(0);
        CommandRecord {
            statement_text: text,
            statement,
            overrides: Default::default(),
            submitted_at_ns: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use cmdq_statement::{QualifiedName, RegisterTopic};
    use serde_json::json;

    use super::*;

    #[test]
    fn record_round_trips_through_cbor() {
        let record = CommandRecord {
            statement_text: "REGISTER TOPIC orders".into(),
            statement: Statement::new(StatementKind::RegisterTopic(RegisterTopic {
                topic: QualifiedName::simple("orders").unwrap(),
                if_not_exists: false,
            })),
            overrides: BTreeMap::from([
                ("ksql.sink.replicas".to_string(), json!(2)),
                ("ksql.transient.prefix".to_string(), json!(null)),
            ]),
            submitted_at_ns: 42,
        };
        let bytes = record.encode().unwrap();
        let back = CommandRecord::decode(&bytes).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.kind(), Some(LogKind::RegisterTopic));
    }

    #[test]
    fn local_statements_have_no_log_kind() {
        assert_eq!(LogKind::for_statement(&StatementKind::ListTopics), None);
    }
}
