//! Process-wide log sink.

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Installs a `tracing` fmt subscriber for the process.
///
/// `RUST_LOG` takes precedence over `config.level`. Only the first call
/// installs anything; later calls, or a subscriber installed by the host,
/// are left alone.
pub fn init(config: &LogConfig) {
   let Some(directive) = config.level.directive() else {
      return;
   };

   let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

   tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_ansi(config.ansi)
      .with_thread_names(true)
      .compact()
      .try_init()
      .ok();
}
