use std::sync::Arc;

use beacon_relay::{
    app::{build_relay, AppState},
    cli::Cli,
    config::RelayCfg,
    domain,
    http,
    live::LiveHub,
    readiness::{start_broker_probe, Readiness},
    telemetry,
};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

fn main() -> anyhow::Result<()> {
    domain::init_local_offset();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(Cli::parse()))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = RelayCfg::load(cli.config.clone())?;
    cli.apply(&mut cfg);

    if cli.print_bind {
        println!("{}", cfg.http.bind);
        return Ok(());
    }

    cfg.validate()?;
    telemetry::init(&cfg.log)?;
    info!("starting beacon-relay {}", env!("CARGO_PKG_VERSION"));

    let cfg = Arc::new(cfg);
    let ready = Arc::new(Readiness::new());
    let live = Arc::new(LiveHub::new(&cfg.live));
    let relay = Arc::new(build_relay(&cfg, ready.clone(), live.clone())?);

    if cli.once {
        // Failures are logged by the pass; a single run always exits cleanly.
        let _ = relay.run_once().instrument(info_span!("relay_pass")).await;
        return Ok(());
    }

    let signals = ShutdownSignal::install()?;
    let shutdown = CancellationToken::new();
    start_broker_probe(&cfg.mqtt, &cfg.health, ready.clone(), shutdown.clone())?;

    let listener = TcpListener::bind(cfg.http.bind).await?;
    println!("listening on {}", listener.local_addr()?);

    let state = AppState {
        cfg: cfg.clone(),
        ready: ready.clone(),
        live,
        shutdown: shutdown.clone(),
    };
    let server = tokio::spawn(http::serve(listener, state, shutdown.clone()));
    let poller = tokio::spawn(relay.run(cfg.poll.interval(), shutdown.clone()));

    signals.wait().await;
    info!("shutdown signal received, draining");
    ready.begin_drain();
    tokio::time::sleep(std::time::Duration::from_millis(cfg.health.shutdown_grace_ms)).await;
    shutdown.cancel();

    poller.await?;
    server.await??;
    info!("stopped");
    Ok(())
}

/// SIGTERM/SIGINT listener. Installed before the server starts so a signal
/// that arrives early is not lost to the default handler.
struct ShutdownSignal {
    #[cfg(unix)]
    term: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            term: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    #[cfg(unix)]
    async fn wait(mut self) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = self.term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    async fn wait(self) {
        let _ = tokio::signal::ctrl_c().await;
    }
}
