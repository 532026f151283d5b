//! raftkv - run one replica of the replicated key-value store.

mod logging;
mod shutdown;

use anyhow::{Context, Result, bail};
use clap::Parser;
use logging::LogFormat;
use shutdown::ShutdownSignal;
use raftkv_cluster::{KvNode, NodeConfig, request_join};
use std::path::PathBuf;

/// raftkv - a Raft-replicated key-value store node.
#[derive(Parser, Debug)]
#[command(name = "raftkv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Raft address; also this node's identity in the cluster
    #[arg(long, default_value = "127.0.0.1:5000")]
    raft_address: String,

    /// Client port = raft port + this offset (same on every node)
    #[arg(long, default_value_t = 3000)]
    api_port_offset: u16,

    /// Directory for the raft log and snapshots
    #[arg(long, default_value = "./raft-data")]
    data_dir: PathBuf,

    /// Start a new single-member cluster made of this node
    #[arg(long)]
    bootstrap: bool,

    /// Keep all raft state in memory
    #[arg(long)]
    inmem: bool,

    /// Client address of an existing member to join through
    #[arg(long, value_name = "ADDR", conflicts_with = "bootstrap")]
    join: Option<String>,

    /// Increase verbosity beyond info (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn node_config(&self) -> Result<NodeConfig> {
        NodeConfig::builder()
            .raft_addr(&self.raft_address)
            .api_port_offset(self.api_port_offset)
            .data_dir(&self.data_dir)
            .in_memory(self.inmem)
            .build()
            .context("Invalid node configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format)?;

    let mut stop = ShutdownSignal::install()?;
    let config = cli.node_config()?;
    let join_timeout = config.timeouts.join();

    let node = KvNode::start(config)
        .await
        .with_context(|| format!("Failed to start node {}", cli.raft_address))?;
    tracing::info!(
        raft_addr = %node.raft_addr(),
        api_addr = %node.api_addr(),
        "node started"
    );

    if cli.bootstrap {
        node.bootstrap()
            .await
            .context("Failed to bootstrap cluster")?;
        tracing::info!("bootstrapped single-member cluster");
    }

    if let Some(member) = &cli.join {
        request_join(member, node.raft_addr(), join_timeout)
            .await
            .with_context(|| format!("Failed to join cluster through {}", member))?;
    }

    let fatal = tokio::select! {
        signal = stop.recv() => {
            tracing::info!(signal = signal?, "shutdown signal received");
            None
        }
        reason = node.wait_fatal() => Some(reason),
    };

    if let Err(e) = node.shutdown().await {
        tracing::warn!(error = %e, "shutdown did not complete cleanly");
    }

    if let Some(reason) = fatal {
        bail!("replica stopped after a fatal apply: {}", reason);
    }
    Ok(())
}
