mod client;
mod commands;
mod opts;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::serve::ServeArgs;
use commands::submit::SubmitArgs;
use opts::ClientOpts;

#[derive(Parser, Debug)]
#[command(name = "cmdq", version, about = "Distributed command log CLI")]
struct Cli {
    #[command(flatten)]
    opts: ClientOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a node: HTTP API plus the apply loop
    Serve(ServeArgs),

    /// Submit statements to a node
    Submit(SubmitArgs),

    /// Show the log head and the node's applied offset
    Head,

    /// List available functions
    Functions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let opts = &cli.opts;

    match cli.command {
        Command::Serve(args) => commands::serve::cmd_serve(&args).await,
        Command::Submit(args) => commands::submit::cmd_submit(opts, &args).await,
        Command::Head => commands::head::cmd_head(opts).await,
        Command::Functions => commands::functions::cmd_functions(opts).await,
    }
}
