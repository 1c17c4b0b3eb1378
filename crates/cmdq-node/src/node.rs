use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cmdq_log::{CommandRecord, FsLog, LogSeq, MemLog, SharedLog};
use cmdq_protocol::{
    CommandState, CommandStatusEntity, Entity, FunctionNameList, PropertyError, PropertySchema,
    RequestEnvelope, ResponseEnvelope,
};
use cmdq_statement::{ParsedStatement, StatementKind, parse_statements};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;

use crate::apply::ApplyLoop;
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::executor::{ExecError, SessionExecutor, StatementExecutor};
use crate::gate::{AppliedOffset, ApplyHalt, ApplyState, SequenceGate};

/// Health and progress of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub applied_offset: Option<LogSeq>,
    /// Offset the next accepted command will receive.
    pub next_offset: LogSeq,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted: Option<ApplyHalt>,
}

/// A cluster member: accepts requests, appends commands to the shared log and
/// applies the log to its own state.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    config: NodeConfig,
    schema: PropertySchema,
    log: SharedLog,
    executor: Arc<dyn StatementExecutor>,
    offset: AppliedOffset,
    gate: SequenceGate,
    wake: Arc<Notify>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Node {
    pub fn new(config: NodeConfig, log: SharedLog, executor: Arc<dyn StatementExecutor>) -> Self {
        let offset = AppliedOffset::new();
        let gate = SequenceGate::new(offset.clone(), config.command_timeout);
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(NodeInner {
                schema: property_schema(&config),
                config,
                log,
                executor,
                offset,
                gate,
                wake: Arc::new(Notify::new()),
                shutdown_tx,
            }),
        }
    }

    /// Node over `log` with the default session executor.
    pub fn with_log(config: NodeConfig, log: SharedLog) -> Self {
        let executor = SessionExecutor::new(property_schema(&config));
        Self::new(config, log, Arc::new(executor))
    }

    /// Opens the log named by `config.log_dir`, or an in-memory log when unset.
    pub fn open(config: NodeConfig) -> Result<Self, NodeError> {
        let log = match &config.log_dir {
            Some(dir) => {
                let log = FsLog::open(dir)?;
                tracing::info!(path = %log.path().display(), "using filesystem command log");
                SharedLog::new(log)
            }
            None => {
                tracing::info!("using in-memory command log");
                SharedLog::new(MemLog::new())
            }
        };
        Ok(Self::with_log(config, log))
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    pub fn log(&self) -> &SharedLog {
        &self.inner.log
    }

    pub fn applied_offset(&self) -> &AppliedOffset {
        &self.inner.offset
    }

    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.inner.shutdown_tx.clone()
    }

    /// Spawns the apply loop. It runs until [`Node::shutdown`] or the first
    /// apply failure.
    pub fn start(&self) -> JoinHandle<Result<(), NodeError>> {
        let apply = ApplyLoop::new(
            self.inner.log.clone(),
            self.inner.executor.clone(),
            self.inner.offset.clone(),
            self.inner.wake.clone(),
            self.inner.config.apply_poll_interval,
            self.inner.shutdown_tx.subscribe(),
        );
        tokio::spawn(apply.run())
    }

    pub fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(());
    }

    pub fn status(&self) -> Result<NodeStatus, NodeError> {
        let ApplyState { applied, halted } = self.inner.offset.state();
        Ok(NodeStatus {
            applied_offset: applied,
            next_offset: self.inner.log.next_seq()?,
            halted,
        })
    }

    pub fn functions(&self) -> Result<FunctionNameList, NodeError> {
        let parsed = ParsedStatement {
            text: "LIST FUNCTIONS".into(),
            statement: StatementKind::ListFunctions.into(),
        };
        match self.inner.executor.query(&parsed)? {
            Entity::FunctionNameList(list) => Ok(list),
            _ => Ok(FunctionNameList {
                statement_text: parsed.text,
                functions: Vec::new(),
            }),
        }
    }

    /// Runs one client request.
    ///
    /// Nothing is appended unless the overrides coerce, every statement
    /// parses and every `SET` value coerces. After the consistency wait,
    /// statements run in order: each distributed one is checked against node
    /// state, appended and awaited locally, each local one is answered from
    /// node state. A failure after earlier statements completed comes back as
    /// [`NodeError::Batch`] carrying their results.
    pub async fn handle_request(
        &self,
        request: &RequestEnvelope,
    ) -> Result<ResponseEnvelope, NodeError> {
        let overrides = request.streams_properties()?;
        if !self.inner.config.allow_unknown_properties {
            let schema = PropertySchema::standard();
            if let Some((name, _)) = overrides
                .iter()
                .find(|(name, _)| schema.property_type(name).is_none())
            {
                return Err(PropertyError::UnknownProperty { name: name.clone() }.into());
            }
        }
        let statements = parse_statements(request.ksql())?;
        for parsed in &statements {
            if let StatementKind::SetProperty(set) = parsed.statement.kind() {
                self.inner
                    .schema
                    .coerce_value(&set.name, &Value::String(set.value.clone()))?;
            }
        }

        self.inner
            .gate
            .wait_for(request.command_sequence_number())
            .await?;

        let mut entities = Vec::with_capacity(statements.len());
        for parsed in statements {
            let result = if parsed.statement.is_distributed() {
                self.distribute(parsed, request)
                    .await
                    .map(Entity::CommandStatus)
            } else {
                self.inner
                    .executor
                    .query(&parsed)
                    .map_err(NodeError::from)
            };
            match result {
                Ok(entity) => entities.push(entity),
                Err(err) => return Err(err.after(entities)),
            }
        }
        Ok(ResponseEnvelope { entities })
    }

    async fn distribute(
        &self,
        parsed: ParsedStatement,
        request: &RequestEnvelope,
    ) -> Result<CommandStatusEntity, NodeError> {
        let ParsedStatement { text, statement } = parsed;
        self.inner
            .executor
            .validate(statement.kind())
            .map_err(|err| match err {
                ExecError::Property(err) => NodeError::Property(err),
                other => NodeError::Statement(other),
            })?;
        let record = CommandRecord {
            statement_text: text.clone(),
            statement,
            overrides: request.raw_properties().clone(),
            submitted_at_ns: now_ns(),
        };
        let seq = self.inner.log.append_record(&record)?;
        self.inner.wake.notify_one();
        tracing::info!(seq, statement = %text, "command accepted");

        let (status, message) = self.await_local_apply(seq, self.inner.config.command_timeout).await;
        Ok(CommandStatusEntity {
            statement_text: text,
            command_sequence_number: seq,
            status,
            message,
        })
    }

    async fn await_local_apply(&self, seq: LogSeq, timeout: Duration) -> (CommandState, String) {
        let halted_before = |state: &ApplyState| {
            state
                .halted
                .as_ref()
                .is_some_and(|halt| halt.seq <= seq)
        };
        let settled = self
            .inner
            .offset
            .wait_until(timeout, |state| state.reached(seq) || halted_before(state))
            .await;
        match settled {
            Some(state) if state.reached(seq) => {
                (CommandState::Success, format!("applied at offset {seq}"))
            }
            Some(ApplyState {
                halted: Some(halt), ..
            }) => (
                CommandState::Error,
                format!("apply halted at offset {}: {}", halt.seq, halt.reason),
            ),
            _ => {
                tracing::debug!(seq, "command not yet applied locally");
                (
                    CommandState::Queued,
                    format!("accepted at offset {seq}; not yet applied on this node"),
                )
            }
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("applied", &self.inner.offset.applied())
            .finish_non_exhaustive()
    }
}

fn property_schema(config: &NodeConfig) -> PropertySchema {
    PropertySchema::standard()
        .clone()
        .allow_unknown(config.allow_unknown_properties)
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}
