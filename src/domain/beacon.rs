use once_cell::sync::OnceCell;
use serde::Serialize;
use time::{macros::format_description, OffsetDateTime, UtcOffset};

static LOCAL_OFFSET: OnceCell<UtcOffset> = OnceCell::new();

/// Flattened beacon reading shared by every sink.
///
/// `gateway_mac` is the single gateway identity: it is filled from the
/// upstream `nearestGatewayData.device` and used for the MQTT topic and all
/// outgoing payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub beacon_id: String,
    pub gateway_mac: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub sap_location: Option<String>,
    pub temp_condition_low: Option<f64>,
    pub temp_condition_high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
}

impl NormalizedRecord {
    pub fn new(beacon_id: &str) -> Self {
        Self {
            beacon_id: beacon_id.to_uppercase(),
            gateway_mac: None,
            latitude: None,
            longitude: None,
            sap_location: None,
            temp_condition_low: None,
            temp_condition_high: None,
            temperature: None,
            uptime: None,
        }
    }

    /// Temperature as sent downstream; missing readings are reported as zero.
    pub fn temperature_or_zero(&self) -> f64 {
        self.temperature.unwrap_or(0.0)
    }
}

/// Formats an uptime in seconds as `D Tage, H Stunden, M Minuten, S Sekunden`.
pub fn format_uptime(total_secs: u64) -> String {
    let days = total_secs / 86_400;
    let rem = total_secs % 86_400;
    let hours = rem / 3_600;
    let rem = rem % 3_600;
    let minutes = rem / 60;
    let seconds = rem % 60;
    format!("{days} Tage, {hours} Stunden, {minutes} Minuten, {seconds} Sekunden")
}

/// Captures the local UTC offset. Must run while the process is still
/// single-threaded; afterwards the offset can no longer be queried soundly.
pub fn init_local_offset() {
    if let Ok(offset) = UtcOffset::current_local_offset() {
        let _ = LOCAL_OFFSET.set(offset);
    }
}

/// Current wall-clock time as `YYYY-MM-DD HH:MM:SS` in the local zone.
///
/// Falls back to UTC when the local offset is unknown.
pub fn local_timestamp() -> String {
    let now = match LOCAL_OFFSET.get() {
        Some(offset) => OffsetDateTime::now_utc().to_offset(*offset),
        None => OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
    };
    format_timestamp(now)
}

pub fn format_timestamp(at: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    at.format(format)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}
