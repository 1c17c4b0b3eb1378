//! `cmdq serve` command.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use cmdq_node::config::{ENV_COMMAND_TIMEOUT_MS, ENV_HTTP_BIND, ENV_LOG_DIR};
use cmdq_node::{Node, NodeConfig};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address for the HTTP API
    #[arg(long, env = ENV_HTTP_BIND)]
    pub bind: Option<SocketAddr>,

    /// Directory for the command log; in-memory when omitted
    #[arg(long, env = ENV_LOG_DIR)]
    pub log_dir: Option<PathBuf>,

    /// How long to wait for consistency bounds and local apply, in milliseconds
    #[arg(long, env = ENV_COMMAND_TIMEOUT_MS)]
    pub command_timeout_ms: Option<u64>,
}

pub async fn cmd_serve(args: &ServeArgs) -> Result<()> {
    setup_logging();

    let mut config = NodeConfig::from_env().context("load node configuration")?;
    if let Some(bind) = args.bind {
        config.http.bind = bind;
    }
    if let Some(dir) = &args.log_dir {
        config.log_dir = Some(dir.clone());
    }
    if let Some(ms) = args.command_timeout_ms {
        config.command_timeout = Duration::from_millis(ms);
    }

    let node = Node::open(config.clone()).context("open node")?;
    let shutdown_tx = node.shutdown_sender();
    let mut shutdown_rx = shutdown_tx.subscribe();
    spawn_signal_handler(shutdown_tx.clone());

    let apply = node.start();
    let http = cmdq_node::http::spawn_http_server(config.http.clone(), node.clone(), shutdown_tx);

    let _ = shutdown_rx.recv().await;
    match apply.await.context("join apply loop")? {
        Ok(()) => {}
        // a halted node keeps serving until shutdown
        Err(err) => tracing::warn!("apply loop ended early: {err}"),
    }
    if let Some(handle) = http {
        let _ = handle.await;
    }
    tracing::info!("node stopped");
    Ok(())
}

fn spawn_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        let mut term =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, shutting down...");
            }
            _ = async {
                if let Some(ref mut t) = term { t.recv().await; }
            } => {
                tracing::info!("SIGTERM received, shutting down...");
            }
        }
        let _ = shutdown_tx.send(());
    });
}

/// Set up tracing subscriber; `RUST_LOG` overrides the default `info` level.
fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();
}
