//! Node runtime: accepts client requests, appends distributed commands to the
//! shared log, applies the log locally and gates reads on the applied offset.

pub mod apply;
pub mod config;
pub mod error;
pub mod executor;
pub mod gate;
pub mod http;
pub mod node;

pub use config::{HttpServerConfig, NodeConfig};
pub use error::NodeError;
pub use executor::{ExecError, SessionExecutor, StatementExecutor};
pub use gate::{AppliedOffset, ApplyHalt, ApplyState, ConsistencyTimeout, SequenceGate};
pub use node::{Node, NodeStatus};
