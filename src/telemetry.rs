use tracing_subscriber::EnvFilter;

use crate::config::{LogCfg, LogFormat};

/// Installs the global subscriber. `RUST_LOG` wins over `log.level`.
///
/// Logs go to stderr; stdout carries only the `listening on` line.
pub fn init(cfg: &LogCfg) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match cfg.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
