//! `cmdq submit` command.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use clap::Args;
use cmdq_protocol::RequestEnvelope;
use serde_json::Value;

use crate::client::ApiClient;
use crate::opts::ClientOpts;
use crate::output::{print_entity, print_json};

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Statement text; several statements may be separated by ';'
    pub sql: String,

    /// Property override as KEY=VALUE (repeatable). VALUE is read as JSON
    /// when it parses, otherwise as a string; `KEY=null` resets the key.
    #[arg(short = 'p', long = "property", value_name = "KEY=VALUE")]
    pub properties: Vec<String>,

    /// Wait until the node has applied this offset before running
    #[arg(short = 's', long = "sequence", value_name = "OFFSET")]
    pub sequence: Option<u64>,
}

pub async fn cmd_submit(opts: &ClientOpts, args: &SubmitArgs) -> Result<()> {
    let properties = parse_properties(&args.properties)?;
    let request = RequestEnvelope::new(args.sql.clone(), properties, args.sequence);

    let client = ApiClient::new(opts)?;
    let response = client
        .submit(&request)
        .await
        .context("submit statements")?;
    if opts.wants_json() {
        return print_json(opts, &response);
    }
    for entity in &response.entities {
        print_entity(entity);
    }
    Ok(())
}

fn parse_properties(raw: &[String]) -> Result<BTreeMap<String, Value>> {
    let mut properties = BTreeMap::new();
    for item in raw {
        let Some((key, value)) = item.split_once('=') else {
            bail!("invalid property '{item}': expected KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("invalid property '{item}': empty key");
        }
        let value = serde_json::from_str(value.trim())
            .unwrap_or_else(|_| Value::String(value.to_string()));
        properties.insert(key.to_string(), value);
    }
    Ok(properties)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn values_parse_as_json_then_string() {
        let props = parse_properties(&[
            "ksql.sink.replicas=2".into(),
            "auto.offset.reset=earliest".into(),
            "ksql.query.pull.enable=true".into(),
            "ksql.transient.prefix=null".into(),
        ])
        .unwrap();
        assert_eq!(props["ksql.sink.replicas"], json!(2));
        assert_eq!(props["auto.offset.reset"], json!("earliest"));
        assert_eq!(props["ksql.query.pull.enable"], json!(true));
        assert_eq!(props["ksql.transient.prefix"], Value::Null);
    }

    #[test]
    fn rejects_items_without_key() {
        assert!(parse_properties(&["novalue".into()]).is_err());
        assert!(parse_properties(&["=1".into()]).is_err());
    }
}
