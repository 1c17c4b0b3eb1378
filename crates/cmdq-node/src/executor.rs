//! Statement execution against node-local state.
//!
//! Distributed statements reach the executor only through the apply loop, in
//! log order. Local statements are answered directly from the same state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cmdq_log::{CommandRecord, LogSeq};
use cmdq_protocol::{
    CoercedValue, Entity, FunctionNameList, FunctionType, PrintTopicEntity, PropertyError,
    PropertyList, PropertySchema, PropertyValue, SimpleFunctionInfo, TopicList,
};
use cmdq_statement::{ParsedStatement, StatementKind};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("topic '{0}' already exists")]
    TopicExists(String),
    #[error("topic '{0}' does not exist")]
    TopicNotFound(String),
    #[error(transparent)]
    Property(#[from] PropertyError),
    #[error("{0} statements must be submitted through the command log")]
    NotLocal(&'static str),
    #[error("{0} statements are answered locally and never enter the command log")]
    NotACommand(&'static str),
}

pub trait StatementExecutor: Send + Sync {
    /// Checks a distributed statement against current state before it is
    /// appended. A statement that passes can still fail at apply time if
    /// another node's command lands first.
    fn validate(&self, statement: &StatementKind) -> Result<(), ExecError>;

    /// Applies the command at `seq`. Called from the apply loop only, once
    /// per offset, in offset order.
    fn apply(&self, seq: LogSeq, record: &CommandRecord) -> Result<(), ExecError>;

    /// Answers a local statement from node state.
    fn query(&self, parsed: &ParsedStatement) -> Result<Entity, ExecError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub topics: Vec<String>,
    pub properties: BTreeMap<String, Value>,
    pub applied_commands: u64,
}

#[derive(Debug, Default)]
struct SessionState {
    topics: BTreeSet<String>,
    properties: BTreeMap<String, PropertyValue>,
    applied_commands: u64,
}

enum Change {
    AddTopic(String),
    RemoveTopic(String),
    SetProperty(String, PropertyValue),
    ResetProperty(String),
    Nothing,
}

/// Default executor: a topic catalog and session properties.
#[derive(Debug)]
pub struct SessionExecutor {
    schema: PropertySchema,
    functions: Vec<SimpleFunctionInfo>,
    state: RwLock<SessionState>,
}

impl Default for SessionExecutor {
    fn default() -> Self {
        Self::new(PropertySchema::standard().clone())
    }
}

impl SessionExecutor {
    pub fn new(schema: PropertySchema) -> Self {
        Self {
            schema,
            functions: builtin_functions(),
            state: RwLock::new(SessionState::default()),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.read();
        SessionSnapshot {
            topics: state.topics.iter().cloned().collect(),
            properties: state
                .properties
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
            applied_commands: state.applied_commands,
        }
    }

    /// Resolves a distributed statement into the change it makes to `state`.
    fn plan(&self, state: &SessionState, kind: &StatementKind) -> Result<Change, ExecError> {
        let change = match kind {
            StatementKind::RegisterTopic(register) => {
                let topic = register.topic.to_string();
                if !state.topics.contains(&topic) {
                    Change::AddTopic(topic)
                } else if register.if_not_exists {
                    Change::Nothing
                } else {
                    return Err(ExecError::TopicExists(topic));
                }
            }
            StatementKind::DropTopic(drop) => {
                let topic = drop.topic.to_string();
                if state.topics.contains(&topic) {
                    Change::RemoveTopic(topic)
                } else if drop.if_exists {
                    Change::Nothing
                } else {
                    return Err(ExecError::TopicNotFound(topic));
                }
            }
            StatementKind::SetProperty(set) => {
                let raw = Value::String(set.value.clone());
                match self.schema.coerce_value(&set.name, &raw)? {
                    CoercedValue::Value(value) => Change::SetProperty(set.name.clone(), value),
                    CoercedValue::Reset => Change::ResetProperty(set.name.clone()),
                }
            }
            StatementKind::UnsetProperty(unset) => Change::ResetProperty(unset.name.clone()),
            local => return Err(ExecError::NotACommand(local.name())),
        };
        Ok(change)
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatementExecutor for SessionExecutor {
    fn validate(&self, statement: &StatementKind) -> Result<(), ExecError> {
        self.plan(&self.read(), statement).map(|_| ())
    }

    fn apply(&self, seq: LogSeq, record: &CommandRecord) -> Result<(), ExecError> {
        let kind = record.statement.kind();
        let mut state = self.write();
        match self.plan(&state, kind)? {
            Change::AddTopic(topic) => {
                state.topics.insert(topic);
            }
            Change::RemoveTopic(topic) => {
                state.topics.remove(&topic);
            }
            Change::SetProperty(name, value) => {
                state.properties.insert(name, value);
            }
            Change::ResetProperty(name) => {
                state.properties.remove(&name);
            }
            Change::Nothing => {}
        }
        state.applied_commands += 1;
        tracing::trace!(seq, statement = kind.name(), "session state updated");
        Ok(())
    }

    fn query(&self, parsed: &ParsedStatement) -> Result<Entity, ExecError> {
        let statement_text = parsed.text.clone();
        let state = self.read();
        let entity = match parsed.statement.kind() {
            StatementKind::PrintTopic(print) => {
                let topic = print.topic().to_string();
                if !state.topics.contains(&topic) {
                    return Err(ExecError::TopicNotFound(topic));
                }
                Entity::PrintTopic(PrintTopicEntity {
                    statement_text,
                    topic,
                    from_beginning: print.from_beginning(),
                    interval: print.interval(),
                    limit: print.limit(),
                })
            }
            StatementKind::ListTopics => Entity::TopicList(TopicList {
                statement_text,
                topics: state.topics.iter().cloned().collect(),
            }),
            StatementKind::ListProperties => Entity::PropertyList(PropertyList {
                statement_text,
                properties: state
                    .properties
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            }),
            StatementKind::ListFunctions => Entity::FunctionNameList(FunctionNameList {
                statement_text,
                functions: self.functions.clone(),
            }),
            distributed => return Err(ExecError::NotLocal(distributed.name())),
        };
        Ok(entity)
    }
}

fn builtin_functions() -> Vec<SimpleFunctionInfo> {
    use FunctionType::{Aggregate, Scalar, Table};

    [
        ("ABS", Scalar),
        ("CEIL", Scalar),
        ("CONCAT", Scalar),
        ("EXTRACTJSONFIELD", Scalar),
        ("FLOOR", Scalar),
        ("LCASE", Scalar),
        ("LEN", Scalar),
        ("ROUND", Scalar),
        ("SUBSTRING", Scalar),
        ("TIMESTAMPTOSTRING", Scalar),
        ("TRIM", Scalar),
        ("UCASE", Scalar),
        ("COLLECT_LIST", Aggregate),
        ("COUNT", Aggregate),
        ("MAX", Aggregate),
        ("MIN", Aggregate),
        ("SUM", Aggregate),
        ("TOPK", Aggregate),
        ("EXPLODE", Table),
    ]
    .into_iter()
    .map(|(name, function_type)| SimpleFunctionInfo {
        name: name.to_string(),
        function_type,
    })
    .collect()
}
