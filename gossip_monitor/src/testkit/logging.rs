use clap::ValueEnum;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
  Trace,
  Debug,
  Info,
  Warn,
  Error,
  Off,
}
impl From<LogLevel> for LevelFilter {
  fn from(level: LogLevel) -> Self {
    match level {
      LogLevel::Trace => LevelFilter::TRACE,
      LogLevel::Debug => LevelFilter::DEBUG,
      LogLevel::Info => LevelFilter::INFO,
      LogLevel::Warn => LevelFilter::WARN,
      LogLevel::Error => LevelFilter::ERROR,
      LogLevel::Off => LevelFilter::OFF,
    }
  }
}

/// Installs the global subscriber. `RUST_LOG` overrides `level` when set. With a `file`, output
/// goes there (truncated first, parent directories created) instead of stderr.
///
/// Only the first call in a process has any effect.
pub fn init_logging(level: LogLevel, file: Option<&Path>) -> io::Result<()> {
  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::from(level).into())
    .from_env_lossy();
  let builder = tracing_subscriber::fmt().with_env_filter(filter).with_thread_names(true);
  let result = match file {
    Some(path) => {
      if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
      }
      let file = File::create(path)?;
      builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
    }
    None => builder.with_writer(io::stderr).try_init(),
  };
  // Already installed, keep the first one.
  drop(result);
  Ok(())
}

#[test]
fn test_level_order() {
  assert!(LogLevel::Trace < LogLevel::Warn);
  assert!(LogLevel::Error < LogLevel::Off);
  assert_eq!(LevelFilter::from(LogLevel::Info), LevelFilter::INFO);
}
