//! MQTT sink: one short-lived session per pass.
//!
//! The session connects, waits for the broker's CONNACK, queues one QoS 0
//! publish per routable record plus a DISCONNECT, and drives the event loop
//! until the DISCONNECT has been written. Delivery is not acknowledged.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::MqttCfg;
use crate::domain::{local_timestamp, NormalizedRecord};
use crate::metrics;
use crate::sink::{BatchSink, SinkError, SinkReport};

/// JSON body published for one beacon.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BeaconMessage<'a> {
    pub beacon_id: &'a str,
    pub gateway_mac: &'a str,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub sap_location: Option<&'a str>,
    pub temp_condition_low: Option<f64>,
    pub temp_condition_high: Option<f64>,
    pub timestamp: &'a str,
    pub temperature: f64,
}

impl<'a> BeaconMessage<'a> {
    /// Returns `None` for records without a gateway, which have no topic.
    pub fn from_record(record: &'a NormalizedRecord, timestamp: &'a str) -> Option<Self> {
        let gateway_mac = record.gateway_mac.as_deref()?;
        Some(Self {
            beacon_id: &record.beacon_id,
            gateway_mac,
            latitude: record.latitude,
            longitude: record.longitude,
            sap_location: record.sap_location.as_deref(),
            temp_condition_low: record.temp_condition_low,
            temp_condition_high: record.temp_condition_high,
            timestamp,
            temperature: record.temperature_or_zero(),
        })
    }
}

pub struct MqttSink {
    cfg: MqttCfg,
    host: String,
    port: u16,
}

impl MqttSink {
    pub fn new(cfg: MqttCfg) -> anyhow::Result<Self> {
        let (host, port) = cfg.host_port()?;
        Ok(Self { cfg, host, port })
    }

    pub fn topic(&self, gateway_mac: &str) -> String {
        format!("{}/{}", self.cfg.topic_prefix.trim_end_matches('/'), gateway_mac)
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.cfg.client_id, &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(self.cfg.keep_alive_secs.max(5)));
        options.set_clean_session(true);
        if let Some(username) = &self.cfg.username {
            options.set_credentials(username, self.cfg.password.clone().unwrap_or_default());
        }
        options
    }

    /// Builds `(topic, payload)` pairs, returning them with the number of
    /// records skipped for lack of a gateway.
    fn prepare(
        &self,
        records: &[NormalizedRecord],
    ) -> Result<(Vec<(String, Vec<u8>)>, usize), SinkError> {
        let timestamp = local_timestamp();
        let mut messages = Vec::with_capacity(records.len());
        let mut skipped = 0;
        for record in records {
            match BeaconMessage::from_record(record, &timestamp) {
                Some(msg) => {
                    messages.push((self.topic(msg.gateway_mac), serde_json::to_vec(&msg)?));
                }
                None => {
                    warn!(beacon_id = %record.beacon_id, "beacon has no gateway, not publishing");
                    skipped += 1;
                }
            }
        }
        Ok((messages, skipped))
    }

    async fn session(&self, messages: Vec<(String, Vec<u8>)>) -> Result<usize, SinkError> {
        let (client, mut eventloop) = AsyncClient::new(self.options(), messages.len() + 1);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(SinkError::Connect(format!("{:?}", ack.code)));
                    }
                    debug!(broker = %self.cfg.broker_url, "connected to MQTT broker");
                    break;
                }
                Ok(_) => {}
                Err(e) => return Err(SinkError::Connect(e.to_string())),
            }
        }

        let count = messages.len();
        for (topic, payload) in messages {
            client
                .try_publish(topic, QoS::AtMostOnce, false, payload)
                .map_err(|e| SinkError::Publish(e.to_string()))?;
            metrics::MQTT_MESSAGES.inc();
        }
        client
            .try_disconnect()
            .map_err(|e| SinkError::Publish(e.to_string()))?;

        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(_) => {}
                Err(e) => return Err(SinkError::Publish(e.to_string())),
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl BatchSink for MqttSink {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    #[instrument(name = "mqtt_sink", skip_all, fields(records = records.len()))]
    async fn deliver(&self, records: &[NormalizedRecord]) -> Result<SinkReport, SinkError> {
        let (messages, skipped) = self.prepare(records)?;
        if messages.is_empty() {
            return Ok(SinkReport {
                delivered: 0,
                skipped,
            });
        }

        let timeout = self.cfg.session_timeout();
        let delivered = tokio::time::timeout(timeout, self.session(messages))
            .await
            .map_err(|_| SinkError::Timeout(timeout))??;

        info!(delivered, skipped, "published beacon messages");
        Ok(SinkReport { delivered, skipped })
    }
}
