use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ErrorPolicy, PersistenceCfg};
use crate::domain::{local_timestamp, NormalizedRecord};
use crate::metrics;
use crate::sink::{BatchSink, SinkError, SinkReport};

/// Body of one "add temperature event" call.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureEventRequest<'a> {
    pub beacon_id: &'a str,
    pub gateway_mac: Option<&'a str>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub temp_condition_low: Option<f64>,
    pub temp_condition_high: Option<f64>,
    pub sap_location: Option<&'a str>,
    pub events: [PersistedEvent<'a>; 1],
}

#[derive(Debug, Serialize, PartialEq)]
pub struct PersistedEvent<'a> {
    pub timestamp: &'a str,
    pub temperature: f64,
}

impl<'a> TemperatureEventRequest<'a> {
    pub fn from_record(record: &'a NormalizedRecord, timestamp: &'a str) -> Self {
        Self {
            beacon_id: &record.beacon_id,
            gateway_mac: record.gateway_mac.as_deref(),
            latitude: record.latitude,
            longitude: record.longitude,
            temp_condition_low: record.temp_condition_low,
            temp_condition_high: record.temp_condition_high,
            sap_location: record.sap_location.as_deref(),
            events: [PersistedEvent {
                timestamp,
                temperature: record.temperature_or_zero(),
            }],
        }
    }
}

/// Appends one temperature event per record, one request at a time.
pub struct PersistenceSink {
    client: reqwest::Client,
    url: String,
    on_error: ErrorPolicy,
}

impl PersistenceSink {
    pub fn new(cfg: &PersistenceCfg) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()?;
        Ok(Self {
            client,
            url: cfg.add_event_url(),
            on_error: cfg.on_error,
        })
    }

    async fn append(&self, body: &TemperatureEventRequest<'_>) -> Result<(), SinkError> {
        let resp = self.client.post(&self.url).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SinkError::Status {
                beacon_id: body.beacon_id.to_string(),
                status,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BatchSink for PersistenceSink {
    fn name(&self) -> &'static str {
        "persistence"
    }

    #[instrument(name = "persistence_sink", skip_all, fields(records = records.len()))]
    async fn deliver(&self, records: &[NormalizedRecord]) -> Result<SinkReport, SinkError> {
        let timestamp = local_timestamp();
        let mut delivered = 0;
        let mut failed = 0;

        for record in records {
            let body = TemperatureEventRequest::from_record(record, &timestamp);
            match self.append(&body).await {
                Ok(()) => {
                    debug!(beacon_id = %record.beacon_id, "temperature event appended");
                    metrics::PERSISTENCE_APPENDS.inc();
                    delivered += 1;
                }
                Err(e) if self.on_error == ErrorPolicy::Abort => {
                    error!(beacon_id = %record.beacon_id, error = %e, "append failed, aborting batch");
                    return Err(e);
                }
                Err(e) => {
                    warn!(beacon_id = %record.beacon_id, error = %e, "append failed, continuing");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(SinkError::Partial {
                failed,
                total: records.len(),
            });
        }
        info!(delivered, "temperature events appended");
        Ok(SinkReport::delivered(delivered))
    }
}
