//! One gossip agent. Normally started by `gossip-coordinator`, which passes the whole cluster
//! configuration on the command line.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use gossip_monitor::cluster::{ClusterArgs, GossipAgent};
use gossip_monitor::core::PeerId;
use gossip_monitor::testkit::{init_logging, LogLevel};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gossip-node", version, about = "Runs one gossip agent")]
struct Args {
  /// This agent's id, between 1 and the node count
  #[arg(long)]
  id: u32,

  #[command(flatten)]
  cluster: ClusterArgs,

  /// Write the log to <DIR>/node<ID>.txt instead of stderr
  #[arg(long, value_name = "DIR")]
  log_dir: Option<PathBuf>,

  #[arg(long, value_enum, default_value = "info")]
  log_level: LogLevel,
}

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let log_file = args.log_dir.as_ref().map(|dir| dir.join(format!("node{}.txt", args.id)));
  init_logging(args.log_level, log_file.as_deref()).context("could not open the log file")?;

  let id = PeerId(args.id);
  let config = args
    .cluster
    .to_config()
    .unwrap_or_else(|err| err.format(&mut Args::command()).exit());
  let agent = GossipAgent::start(id, config)
    .await
    .with_context(|| format!("could not start {}", id))?;

  tokio::signal::ctrl_c().await.context("could not listen for ctrl-c")?;
  info!(%id, "interrupted");
  agent.shutdown().await;
  Ok(())
}
