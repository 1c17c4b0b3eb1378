//! `cmdq head` command.

use anyhow::Result;
use serde_json::Value;

use crate::client::ApiClient;
use crate::opts::ClientOpts;
use crate::output::print_json;

pub async fn cmd_head(opts: &ClientOpts) -> Result<()> {
    let client = ApiClient::new(opts)?;
    let head: Value = client.get("log/head").await?;
    if opts.wants_json() {
        return print_json(opts, &head);
    }
    let applied = match &head["applied_offset"] {
        Value::Null => "none".to_string(),
        other => other.to_string(),
    };
    println!("next offset:    {}", head["next_offset"]);
    println!("applied offset: {applied}");
    Ok(())
}
