use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

/// Body of one beacon entry, i.e. the value under the entry's single key.
#[derive(Debug, Deserialize, Default)]
pub struct BeaconDetail {
    #[serde(rename = "nearestGatewayData", default)]
    pub nearest_gateway: Option<NearestGateway>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub dynamb: Option<Dynamb>,
}

#[derive(Debug, Deserialize, Default)]
pub struct NearestGateway {
    #[serde(default, deserialize_with = "string_or_number")]
    pub device: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Location {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(rename = "sapLocation", default, deserialize_with = "string_or_number")]
    pub sap_location: Option<String>,
    #[serde(rename = "tempCondition_Low", default)]
    pub temp_condition_low: Option<f64>,
    #[serde(rename = "tempCondition_High", default)]
    pub temp_condition_high: Option<f64>,
}

/// Live ambient telemetry; uptime is in seconds.
#[derive(Debug, Deserialize, Default)]
pub struct Dynamb {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub uptime: Option<f64>,
}

/// Identifiers upstream are sometimes sent as bare numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(de::Error::invalid_type(
            de::Unexpected::Other(&other.to_string()),
            &"a string or a number",
        )),
    }
}
