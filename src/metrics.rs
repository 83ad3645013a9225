use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn register<C>(collector: C) -> C
where
    C: prometheus::core::Collector + Clone + 'static,
{
    REGISTRY
        .register(Box::new(collector.clone()))
        .expect("relay metric registered twice");
    collector
}

pub static PASSES: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new("relay_passes_total", "Number of relay passes started").unwrap(),
    )
});

pub static PASS_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new(
            "relay_pass_failures_total",
            "Number of relay passes abandoned because collection failed",
        )
        .unwrap(),
    )
});

pub static RECORDS_COLLECTED: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new(
            "relay_records_collected_total",
            "Number of beacon records extracted from the positioning source",
        )
        .unwrap(),
    )
});

pub static SINK_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register(
        IntCounterVec::new(
            Opts::new("relay_sink_failures_total", "Number of failed sink deliveries"),
            &["sink"],
        )
        .unwrap(),
    )
});

pub static MQTT_MESSAGES: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new(
            "relay_mqtt_messages_total",
            "Number of beacon messages handed to the MQTT client",
        )
        .unwrap(),
    )
});

pub static PERSISTENCE_APPENDS: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new(
            "relay_persistence_appends_total",
            "Number of temperature events accepted by the persistence API",
        )
        .unwrap(),
    )
});

/// Renders the relay registry in the prometheus text format.
pub fn render() -> String {
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buf) {
        tracing::warn!(error = %e, "failed to encode relay metrics");
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}
