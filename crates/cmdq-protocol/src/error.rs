use thiserror::Error;

use crate::properties::PropertyError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error(transparent)]
    Property(#[from] PropertyError),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::MalformedRequest(err.to_string())
    }
}
