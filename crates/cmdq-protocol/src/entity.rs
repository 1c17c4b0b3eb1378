use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Successful response body: one entity per submitted statement, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type", rename_all = "snake_case")]
pub enum Entity {
    CommandStatus(CommandStatusEntity),
    PrintTopic(PrintTopicEntity),
    TopicList(TopicList),
    PropertyList(PropertyList),
    FunctionNameList(FunctionNameList),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    /// Accepted into the log but not yet applied on the answering node.
    Queued,
    Success,
    Error,
}

/// Outcome of a distributed statement. `command_sequence_number` is the log
/// offset the client can pass back as its next consistency bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandStatusEntity {
    pub statement_text: String,
    pub command_sequence_number: u64,
    pub status: CommandState,
    pub message: String,
}

/// Acknowledges a print request; the row stream itself is produced elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintTopicEntity {
    pub statement_text: String,
    pub topic: String,
    pub from_beginning: bool,
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicList {
    pub statement_text: String,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyList {
    pub statement_text: String,
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionType {
    Scalar,
    Aggregate,
    Table,
}

impl FunctionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionType::Scalar => "scalar",
            FunctionType::Aggregate => "aggregate",
            FunctionType::Table => "table",
        }
    }
}

/// Ordered by name, then type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimpleFunctionInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub function_type: FunctionType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionNameList {
    pub statement_text: String,
    pub functions: Vec<SimpleFunctionInfo>,
}

impl FunctionNameList {
    /// `(name, TYPE)` rows sorted by function name, ready for tabular display.
    pub fn sorted_rows(&self) -> Vec<[String; 2]> {
        let mut functions: Vec<&SimpleFunctionInfo> = self.functions.iter().collect();
        functions.sort();
        functions
            .into_iter()
            .map(|f| [f.name.clone(), f.function_type.as_str().to_uppercase()])
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MalformedRequest,
    StatementError,
    PropertyError,
    ConsistencyTimeout,
    LogError,
    ApplyHalted,
    Internal,
}

/// Body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error_code: ErrorCode,
    pub message: String,
    /// Requested bound of a consistency timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<u64>,
    /// Applied offset observed when a consistency wait gave up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    /// Results of the statements that completed before a batch failed. A
    /// command listed here was appended and keeps its offset.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
}

impl ErrorBody {
    pub fn new(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code,
            message: message.into(),
            requested: None,
            current: None,
            entities: Vec::new(),
        }
    }
}
