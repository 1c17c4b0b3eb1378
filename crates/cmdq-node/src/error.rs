use cmdq_log::{LogError, LogSeq};
use cmdq_protocol::{Entity, ErrorBody, ErrorCode, PropertyError, ProtocolError};
use cmdq_statement::ParseError;
use thiserror::Error;

use crate::executor::ExecError;
use crate::gate::ConsistencyTimeout;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error(transparent)]
    Property(#[from] PropertyError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    ConsistencyTimeout(#[from] ConsistencyTimeout),
    #[error(transparent)]
    Statement(#[from] ExecError),
    #[error("command log error: {0}")]
    Log(#[from] LogError),
    #[error("apply halted at offset {seq}: {reason}")]
    ApplyHalted { seq: LogSeq, reason: String },
    #[error("configuration error: {0}")]
    Config(String),
    /// A statement failed after earlier statements of the same request had
    /// completed. `completed` holds their results.
    #[error("{source}")]
    Batch {
        completed: Vec<Entity>,
        source: Box<NodeError>,
    },
}

impl From<ProtocolError> for NodeError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MalformedRequest(msg) => NodeError::MalformedRequest(msg),
            ProtocolError::Property(err) => NodeError::Property(err),
        }
    }
}

impl NodeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            NodeError::MalformedRequest(_) => ErrorCode::MalformedRequest,
            NodeError::Property(_) => ErrorCode::PropertyError,
            NodeError::Parse(_) | NodeError::Statement(_) => ErrorCode::StatementError,
            NodeError::ConsistencyTimeout(_) => ErrorCode::ConsistencyTimeout,
            NodeError::Log(_) => ErrorCode::LogError,
            NodeError::ApplyHalted { .. } => ErrorCode::ApplyHalted,
            NodeError::Config(_) => ErrorCode::Internal,
            NodeError::Batch { source, .. } => source.code(),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        match self {
            NodeError::Batch { completed, source } => {
                let mut body = source.to_body();
                body.entities = completed.clone();
                body
            }
            NodeError::ConsistencyTimeout(timeout) => {
                let mut body = ErrorBody::new(self.code(), self.to_string());
                body.requested = Some(timeout.requested);
                body.current = timeout.current;
                body
            }
            _ => ErrorBody::new(self.code(), self.to_string()),
        }
    }

    /// Attaches the results of already completed statements. A failure on the
    /// first statement stays as is.
    pub(crate) fn after(self, completed: Vec<Entity>) -> Self {
        if completed.is_empty() {
            self
        } else {
            NodeError::Batch {
                completed,
                source: Box::new(self),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_body_carries_offsets() {
        let err = NodeError::from(ConsistencyTimeout {
            requested: 7,
            current: Some(4),
        });
        let body = err.to_body();
        assert_eq!(body.error_code, ErrorCode::ConsistencyTimeout);
        assert_eq!(body.requested, Some(7));
        assert_eq!(body.current, Some(4));
    }

    #[test]
    fn protocol_errors_keep_their_kind() {
        let err = NodeError::from(ProtocolError::MalformedRequest("eof".into()));
        assert_eq!(err.code(), ErrorCode::MalformedRequest);
        let err = NodeError::from(ProtocolError::Property(PropertyError::UnknownProperty {
            name: "x".into(),
        }));
        assert_eq!(err.code(), ErrorCode::PropertyError);
        assert_eq!(err.to_body().message, "unknown property 'x'");
    }

    #[test]
    fn batch_failure_keeps_inner_code_and_completed_results() {
        let completed = vec![Entity::CommandStatus(cmdq_protocol::CommandStatusEntity {
            statement_text: "REGISTER TOPIC t".into(),
            command_sequence_number: 4,
            status: cmdq_protocol::CommandState::Success,
            message: "applied at offset 4".into(),
        })];
        let err = NodeError::from(ExecError::TopicNotFound("nope".into())).after(completed.clone());
        assert_eq!(err.code(), ErrorCode::StatementError);
        let body = err.to_body();
        assert_eq!(body.message, "topic 'nope' does not exist");
        assert_eq!(body.entities, completed);

        let first = NodeError::from(ExecError::TopicNotFound("nope".into())).after(Vec::new());
        assert!(matches!(first, NodeError::Statement(_)));
        assert!(first.to_body().entities.is_empty());
    }
}
