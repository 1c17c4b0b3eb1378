//! `cmdq functions` command.

use anyhow::Result;
use cmdq_protocol::{Entity, FunctionNameList};

use crate::client::ApiClient;
use crate::opts::ClientOpts;
use crate::output::{print_entity, print_json};

pub async fn cmd_functions(opts: &ClientOpts) -> Result<()> {
    let client = ApiClient::new(opts)?;
    let list: FunctionNameList = client.get("functions").await?;
    if opts.wants_json() {
        return print_json(opts, &list);
    }
    print_entity(&Entity::FunctionNameList(list));
    Ok(())
}
