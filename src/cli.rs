use std::net::SocketAddr;

use clap::Parser;

use crate::config::RelayCfg;

#[derive(Debug, Parser)]
#[command(name = "beacon-relay", version, about)]
pub struct Cli {
    /// Extra config file, layered over `relay.toml` and under `RELAY__*` env vars.
    #[arg(long)]
    pub config: Option<String>,

    /// Overrides `http.bind`.
    #[arg(long)]
    pub http_bind: Option<SocketAddr>,

    /// Print the effective bind address and exit.
    #[arg(long)]
    pub print_bind: bool,

    /// Run a single relay pass and exit.
    #[arg(long)]
    pub once: bool,
}

impl Cli {
    pub fn apply(&self, cfg: &mut RelayCfg) {
        if let Some(bind) = self.http_bind {
            cfg.http.bind = bind;
        }
    }
}
