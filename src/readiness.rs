use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{HealthCfg, MqttCfg};

#[derive(Default)]
pub struct Readiness {
    pub mqtt_ok: AtomicBool,
    pub source_ok: AtomicBool,
    pub draining: AtomicBool,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self, health: &HealthCfg) -> bool {
        if self.draining.load(Ordering::Relaxed) {
            return false;
        }
        let mqtt = !health.require_mqtt || self.mqtt_ok.load(Ordering::Relaxed);
        let source = !health.require_source || self.source_ok.load(Ordering::Relaxed);
        mqtt && source
    }

    pub fn set_source_ok(&self, ok: bool) {
        self.source_ok.store(ok, Ordering::Relaxed);
    }

    pub fn begin_drain(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }
}

/// Periodically checks that the broker accepts TCP connections.
pub fn start_broker_probe(
    mqtt: &MqttCfg,
    health: &HealthCfg,
    ready: Arc<Readiness>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let (host, port) = mqtt.host_port()?;
    let interval = Duration::from_millis(health.probe_interval_ms.max(100));

    tokio::spawn(async move {
        use tokio::net::TcpStream;
        loop {
            let ok = matches!(
                tokio::time::timeout(interval, TcpStream::connect((host.as_str(), port))).await,
                Ok(Ok(_))
            );
            if ready.mqtt_ok.swap(ok, Ordering::Relaxed) != ok {
                debug!(broker = %host, port, reachable = ok, "broker reachability changed");
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    });
    Ok(())
}
