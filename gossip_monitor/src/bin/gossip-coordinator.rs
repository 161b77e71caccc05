//! The main node. Starts every agent, then takes commands from stdin until `shutdown`.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use gossip_monitor::cluster::ClusterArgs;
use gossip_monitor::coordinator::{Command, ControlError, Coordinator, ProcessLauncher, Reply};
use gossip_monitor::testkit::{init_logging, LogLevel};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "gossip-coordinator", version, about = "Starts and supervises a gossip cluster")]
struct Args {
  #[command(flatten)]
  cluster: ClusterArgs,

  /// The agent binary to run, instead of the gossip-node next to this executable
  #[arg(long, value_name = "PATH")]
  node_bin: Option<PathBuf>,

  /// Write logs to <DIR>/main.txt and <DIR>/node<ID>.txt instead of stderr
  #[arg(long, value_name = "DIR")]
  log_dir: Option<PathBuf>,

  #[arg(long, value_enum, default_value = "info")]
  log_level: LogLevel,
}

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let log_file = args.log_dir.as_ref().map(|dir| dir.join("main.txt"));
  init_logging(args.log_level, log_file.as_deref()).context("could not open the log file")?;

  let mut launcher = match &args.node_bin {
    Some(path) => ProcessLauncher::new(path),
    None => ProcessLauncher::beside_current_exe().context("could not locate the agent binary")?,
  };
  if let Some(dir) = &args.log_dir {
    launcher = launcher.with_log_dir(dir);
  }
  let config = args
    .cluster
    .to_config()
    .unwrap_or_else(|err| err.format(&mut Args::command()).exit());
  info!(?config, program = %launcher.program().display(), "coordinator starting");

  let coordinator = Coordinator::bind(config, launcher)
    .await
    .context("could not listen on the coordinator port")?;
  if let Err(err) = coordinator.start_all().await {
    error!(%err, "initial setup failed");
    coordinator.shutdown().await?;
    return Err(err).context("could not start the cluster");
  }

  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  loop {
    println!("{}", Command::MENU);
    let line = match lines.next_line().await.context("could not read stdin")? {
      Some(line) => line,
      // stdin closed: behave as if asked to shut down
      None => "shutdown".to_string(),
    };
    if line.trim().is_empty() {
      continue;
    }
    let outcome = match line.parse::<Command>() {
      Ok(cmd) => coordinator.execute(cmd).await,
      Err(err) => Err(err),
    };
    match outcome {
      Ok(Reply::ShutDown) => {
        println!("All nodes have been stopped. Shutting down Main Node");
        break;
      }
      Ok(reply) => println!("{}", reply),
      Err(err) if err.is_fatal() => {
        error!(%err, "fatal error, shutting down");
        println!("{}\nShutting down all nodes.", err);
        coordinator.shutdown().await?;
        return Err(err.into());
      }
      Err(ControlError::ShuttingDown) => break,
      Err(err) => println!("{}", err),
    }
  }
  info!("coordinator stopped");
  Ok(())
}
