//! Fetches the beacon snapshot from the positioning API and flattens it into
//! [`NormalizedRecord`]s.

pub mod types;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::config::SourceCfg;
use crate::domain::{format_uptime, NormalizedRecord};
use crate::metrics;
use types::BeaconDetail;

#[derive(thiserror::Error, Debug)]
pub enum CollectError {
    #[error("request to positioning source failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("positioning source answered {0}")]
    Status(StatusCode),
    #[error("positioning source body is not json: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("malformed response: {0}")]
    Malformed(&'static str),
    #[error("malformed beacon entry #{index}: {reason}")]
    MalformedEntry { index: usize, reason: String },
}

pub struct Collector {
    client: reqwest::Client,
    cfg: SourceCfg,
}

impl Collector {
    pub fn new(cfg: SourceCfg) -> Result<Self, CollectError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()?;
        Ok(Self { client, cfg })
    }

    /// Runs one collection. A response without a `data.beacons` sequence is
    /// reported as [`CollectError::Malformed`] so callers can tell it apart
    /// from an empty snapshot.
    pub async fn collect(&self) -> Result<Vec<NormalizedRecord>, CollectError> {
        let body = self.fetch().await?;
        let records = extract_records(&body)?;
        debug!(records = records.len(), "collected beacon snapshot");
        metrics::RECORDS_COLLECTED.inc_by(records.len() as u64);
        Ok(records)
    }

    async fn fetch(&self) -> Result<Value, CollectError> {
        let mut req = self.client.get(&self.cfg.url);
        if let Some(token) = &self.cfg.auth_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CollectError::Status(status));
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(CollectError::Decode)
    }
}

/// Validates the upstream body and turns every beacon entry into a record.
pub fn extract_records(body: &Value) -> Result<Vec<NormalizedRecord>, CollectError> {
    let beacons = body
        .pointer("/data/beacons")
        .ok_or(CollectError::Malformed("missing data.beacons"))?
        .as_array()
        .ok_or(CollectError::Malformed("data.beacons is not a sequence"))?;

    beacons
        .iter()
        .enumerate()
        .map(|(index, entry)| normalize_entry(index, entry))
        .collect()
}

fn normalize_entry(index: usize, entry: &Value) -> Result<NormalizedRecord, CollectError> {
    let malformed = |reason: String| CollectError::MalformedEntry { index, reason };

    let map = entry
        .as_object()
        .ok_or_else(|| malformed("entry is not an object".into()))?;
    let mut keys = map.iter();
    let (beacon_id, detail) = match (keys.next(), keys.next()) {
        (Some(single), None) => single,
        (None, _) => return Err(malformed("entry has no beacon id".into())),
        (Some(_), Some(_)) => {
            return Err(malformed(format!("entry has {} keys, expected 1", map.len())))
        }
    };
    let detail: BeaconDetail =
        serde_json::from_value(detail.clone()).map_err(|e| malformed(e.to_string()))?;

    let mut record = NormalizedRecord::new(beacon_id);
    record.gateway_mac = detail.nearest_gateway.and_then(|g| g.device);
    if let Some(loc) = detail.location {
        record.latitude = loc.latitude;
        record.longitude = loc.longitude;
        record.sap_location = loc.sap_location;
        record.temp_condition_low = loc.temp_condition_low;
        record.temp_condition_high = loc.temp_condition_high;
    }
    if let Some(dynamb) = detail.dynamb {
        record.temperature = dynamb.temperature;
        record.uptime = dynamb
            .uptime
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| format_uptime(secs as u64));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str, with_dynamb: bool) -> Value {
        let mut detail = json!({
            "nearestGatewayData": { "device": "AC233FC0A1B2" },
            "location": {
                "latitude": 52.52,
                "longitude": 13.405,
                "sapLocation": "KL-04",
                "tempCondition_Low": 2.0,
                "tempCondition_High": 8.0
            }
        });
        if with_dynamb {
            detail["dynamb"] = json!({ "temperature": 5.5, "uptime": 90061 });
        }
        json!({ id: detail })
    }

    #[test]
    fn one_record_per_entry_with_uppercased_key() {
        let body = json!({
            "data": { "beacons": [entry("c300000a1b2c", true), entry("c300000a1b2d", false), entry("Mixed01", true)] }
        });

        let records = extract_records(&body).unwrap();

        assert_eq!(records.len(), 3);
        let ids: Vec<_> = records.iter().map(|r| r.beacon_id.as_str()).collect();
        assert_eq!(ids, ["C300000A1B2C", "C300000A1B2D", "MIXED01"]);
    }

    #[test]
    fn copies_gateway_location_and_telemetry() {
        let body = json!({ "data": { "beacons": [entry("abc", true)] } });

        let rec = &extract_records(&body).unwrap()[0];

        assert_eq!(rec.gateway_mac.as_deref(), Some("AC233FC0A1B2"));
        assert_eq!(rec.latitude, Some(52.52));
        assert_eq!(rec.longitude, Some(13.405));
        assert_eq!(rec.sap_location.as_deref(), Some("KL-04"));
        assert_eq!(rec.temp_condition_low, Some(2.0));
        assert_eq!(rec.temp_condition_high, Some(8.0));
        assert_eq!(rec.temperature, Some(5.5));
        assert_eq!(
            rec.uptime.as_deref(),
            Some("1 Tage, 1 Stunden, 1 Minuten, 1 Sekunden")
        );
    }

    #[test]
    fn entry_without_dynamb_has_no_telemetry() {
        let body = json!({ "data": { "beacons": [entry("abc", false)] } });

        let rec = &extract_records(&body).unwrap()[0];

        assert_eq!(rec.temperature, None);
        assert_eq!(rec.uptime, None);
        assert_eq!(rec.temperature_or_zero(), 0.0);
    }

    #[test]
    fn sparse_entry_only_carries_the_id() {
        let body = json!({ "data": { "beacons": [{ "ff01": {} }] } });

        let rec = &extract_records(&body).unwrap()[0];

        assert_eq!(rec, &NormalizedRecord::new("FF01"));
    }

    #[test]
    fn missing_or_non_sequence_beacons_is_malformed() {
        for body in [
            json!({}),
            json!({ "data": {} }),
            json!({ "data": { "beacons": {} } }),
            json!({ "data": { "beacons": "none" } }),
            json!(null),
        ] {
            assert!(
                matches!(extract_records(&body), Err(CollectError::Malformed(_))),
                "expected malformed for {body}"
            );
        }
    }

    #[test]
    fn empty_beacon_list_yields_no_records() {
        let body = json!({ "data": { "beacons": [] } });
        assert!(extract_records(&body).unwrap().is_empty());
    }

    #[test]
    fn entry_with_several_keys_is_rejected() {
        let body = json!({ "data": { "beacons": [entry("a", false), { "b": {}, "c": {} }] } });

        match extract_records(&body) {
            Err(CollectError::MalformedEntry { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn non_object_entry_is_rejected() {
        let body = json!({ "data": { "beacons": [42] } });
        assert!(matches!(
            extract_records(&body),
            Err(CollectError::MalformedEntry { index: 0, .. })
        ));
    }

    #[test]
    fn negative_uptime_is_dropped() {
        let body = json!({ "data": { "beacons": [{ "x": { "dynamb": { "temperature": 1.0, "uptime": -5 } } }] } });

        let rec = &extract_records(&body).unwrap()[0];

        assert_eq!(rec.temperature, Some(1.0));
        assert_eq!(rec.uptime, None);
    }

    #[test]
    fn numeric_gateway_and_location_ids_are_kept_as_text() {
        let body = json!({ "data": { "beacons": [{ "n1": {
            "nearestGatewayData": { "device": 4711 },
            "location": { "sapLocation": 12, "latitude": 1.0 }
        } }] } });

        let rec = &extract_records(&body).unwrap()[0];

        assert_eq!(rec.gateway_mac.as_deref(), Some("4711"));
        assert_eq!(rec.sap_location.as_deref(), Some("12"));
    }

    #[test]
    fn gateway_of_the_wrong_shape_is_rejected() {
        let body = json!({ "data": { "beacons": [{ "n1": {
            "nearestGatewayData": { "device": ["AC23"] }
        } }] } });

        assert!(matches!(
            extract_records(&body),
            Err(CollectError::MalformedEntry { index: 0, .. })
        ));
    }
}
