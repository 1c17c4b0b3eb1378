//! Global client options.

use clap::Args;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8088";

/// Options shared by the commands that talk to a running node.
#[derive(Args, Debug, Clone)]
pub struct ClientOpts {
    /// Node base URL (env: CMDQ_SERVER)
    #[arg(long, global = true, env = "CMDQ_SERVER", default_value = DEFAULT_SERVER)]
    pub server: String,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output (implies --json)
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Client-side request timeout in milliseconds (env: CMDQ_TIMEOUT_MS)
    #[arg(long, global = true, env = "CMDQ_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,
}

impl ClientOpts {
    pub fn wants_json(&self) -> bool {
        self.json || self.pretty
    }
}
