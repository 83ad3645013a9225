use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::collector::Collector;
use crate::config::RelayCfg;
use crate::fanout::FanOut;
use crate::live::LiveHub;
use crate::mqtt::MqttSink;
use crate::persistence::PersistenceSink;
use crate::readiness::Readiness;
use crate::relay::Relay;
use crate::sink::BatchSink;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<RelayCfg>,
    pub ready: Arc<Readiness>,
    pub live: Arc<LiveHub>,
    pub shutdown: CancellationToken,
}

/// Wires the collector and the three sinks, in delivery order
/// MQTT, persistence, live subscribers.
pub fn build_relay(
    cfg: &RelayCfg,
    ready: Arc<Readiness>,
    live: Arc<LiveHub>,
) -> anyhow::Result<Relay> {
    let collector = Collector::new(cfg.source.clone())?;
    let sinks: Vec<Arc<dyn BatchSink>> = vec![
        Arc::new(MqttSink::new(cfg.mqtt.clone())?),
        Arc::new(PersistenceSink::new(&cfg.persistence)?),
        live,
    ];
    let fanout = FanOut::new(sinks, cfg.fanout.on_sink_error);
    Ok(Relay::new(Arc::new(collector), fanout, ready))
}
