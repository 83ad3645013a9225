use serde::Deserialize;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RelayCfg {
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub source: SourceCfg,
    #[serde(default)]
    pub mqtt: MqttCfg,
    #[serde(default)]
    pub persistence: PersistenceCfg,
    #[serde(default)]
    pub fanout: FanOutCfg,
    #[serde(default)]
    pub poll: PollCfg,
    #[serde(default)]
    pub live: LiveCfg,
    #[serde(default)]
    pub health: HealthCfg,
    #[serde(default)]
    pub log: LogCfg,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct HttpCfg {
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}
impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Positioning API the collector polls.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct SourceCfg {
    pub url: String,
    pub auth_token: Option<String>,
    pub request_timeout_ms: u64,
}
impl Default for SourceCfg {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/api/beacons".into(),
            auth_token: None,
            request_timeout_ms: 10_000,
        }
    }
}
impl SourceCfg {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct MqttCfg {
    pub broker_url: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
    pub session_timeout_ms: u64,
}
impl Default for MqttCfg {
    fn default() -> Self {
        Self {
            broker_url: "mqtt://localhost:1883".into(),
            client_id: "beacon-relay".into(),
            username: None,
            password: None,
            topic_prefix: "beacon".into(),
            keep_alive_secs: 30,
            session_timeout_ms: 10_000,
        }
    }
}
impl MqttCfg {
    /// Splits `broker_url` (`mqtt://host:port`, `tcp://host:port` or `host[:port]`)
    /// into host and port. The port defaults to 1883.
    pub fn host_port(&self) -> anyhow::Result<(String, u16)> {
        let url = self.broker_url.trim();
        let url = url.trim_start_matches("mqtt://");
        let url = url.trim_start_matches("tcp://");
        let url = url.trim_end_matches('/');

        let parts: Vec<&str> = url.split(':').collect();
        match parts.as_slice() {
            [host] if !host.is_empty() => Ok((host.to_string(), 1883)),
            [host, port] if !host.is_empty() => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| anyhow::anyhow!("invalid port in broker url: {port}"))?;
                Ok((host.to_string(), port))
            }
            _ => anyhow::bail!("invalid broker url: {}", self.broker_url),
        }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct PersistenceCfg {
    pub base_url: String,
    pub add_event_path: String,
    pub request_timeout_ms: u64,
    pub on_error: ErrorPolicy,
}
impl Default for PersistenceCfg {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".into(),
            add_event_path: "/addTemperatureEvent".into(),
            request_timeout_ms: 10_000,
            on_error: ErrorPolicy::Continue,
        }
    }
}
impl PersistenceCfg {
    pub fn add_event_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.add_event_path.trim_start_matches('/')
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields, default)]
pub struct FanOutCfg {
    pub on_sink_error: ErrorPolicy,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct PollCfg {
    pub interval_ms: u64,
}
impl Default for PollCfg {
    fn default() -> Self {
        Self { interval_ms: 10_000 }
    }
}
impl PollCfg {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct LiveCfg {
    pub channel_capacity: usize,
    pub event_name: String,
}
impl Default for LiveCfg {
    fn default() -> Self {
        Self {
            channel_capacity: 16,
            event_name: "beaconData".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct HealthCfg {
    pub require_mqtt: bool,
    pub require_source: bool,
    pub probe_interval_ms: u64,
    pub shutdown_grace_ms: u64,
}
impl Default for HealthCfg {
    fn default() -> Self {
        Self {
            require_mqtt: false,
            require_source: false,
            probe_interval_ms: 5_000,
            shutdown_grace_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct LogCfg {
    pub level: String,
    pub format: LogFormat,
}
impl Default for LogCfg {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// What to do with the remaining work once one step has failed.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    #[default]
    Continue,
    Abort,
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080)
}

impl RelayCfg {
    pub fn load(path: Option<String>) -> anyhow::Result<Self> {
        Self::from_builder(build_config(path)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.source.url.is_empty(), "source.url cannot be empty");
        anyhow::ensure!(
            !self.mqtt.broker_url.is_empty(),
            "mqtt.broker_url cannot be empty"
        );
        anyhow::ensure!(
            !self.mqtt.client_id.is_empty(),
            "mqtt.client_id cannot be empty"
        );
        self.mqtt.host_port()?;
        anyhow::ensure!(
            !self.persistence.base_url.is_empty(),
            "persistence.base_url cannot be empty"
        );
        anyhow::ensure!(self.poll.interval_ms > 0, "poll.interval_ms must be > 0");
        anyhow::ensure!(
            self.live.channel_capacity > 0,
            "live.channel_capacity must be > 0"
        );
        Ok(())
    }

    fn from_builder(cfg: config::Config) -> anyhow::Result<Self> {
        Ok(cfg.try_deserialize()?)
    }
}

fn build_config(path: Option<String>) -> anyhow::Result<config::Config> {
    use config::{Config, Environment, File};
    let mut builder = Config::builder().add_source(File::with_name("relay").required(false));
    if let Some(path) = path {
        builder = builder.add_source(File::with_name(&path));
    }
    builder = builder.add_source(Environment::with_prefix("RELAY").separator("__"));
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn loads_from_explicit_config_file() {
        let dir = tempdir().expect("failed to create temp dir for test");
        let path = dir.path().join("custom.toml");
        let toml = r#"
            [http]
            bind = "127.0.0.1:9999"

            [mqtt]
            broker_url = "mqtt://broker.local:1884"
            client_id = "relay-test"
            username = "relay"
            password = "secret"

            [persistence]
            base_url = "http://store.local/"
            on_error = "abort"
        "#;
        fs::write(&path, toml).unwrap();

        let cfg = RelayCfg::load(Some(path.to_string_lossy().into_owned()))
            .expect("config file should load");

        assert_eq!(
            cfg.http.bind,
            "127.0.0.1:9999".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(cfg.mqtt.client_id, "relay-test");
        assert_eq!(cfg.mqtt.username.as_deref(), Some("relay"));
        assert_eq!(cfg.persistence.on_error, ErrorPolicy::Abort);
        assert_eq!(cfg.fanout.on_sink_error, ErrorPolicy::Continue);
        assert_eq!(
            cfg.persistence.add_event_url(),
            "http://store.local/addTemperatureEvent"
        );
        cfg.validate().expect("loaded config should validate");
    }

    #[test]
    fn rejects_unknown_keys_in_a_section() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[mqtt]\nbrokr_url = \"mqtt://x\"\n").unwrap();

        assert!(RelayCfg::load(Some(path.to_string_lossy().into_owned())).is_err());
    }

    #[test]
    fn parses_broker_urls() {
        let mut mqtt = MqttCfg::default();
        assert_eq!(mqtt.host_port().unwrap(), ("localhost".to_string(), 1883));

        mqtt.broker_url = "tcp://emqx.example.com:8883".into();
        assert_eq!(
            mqtt.host_port().unwrap(),
            ("emqx.example.com".to_string(), 8883)
        );

        mqtt.broker_url = "broker.local".into();
        assert_eq!(mqtt.host_port().unwrap(), ("broker.local".to_string(), 1883));

        mqtt.broker_url = "mqtt://host:notaport".into();
        assert!(mqtt.host_port().is_err());

        mqtt.broker_url = "mqtt://".into();
        assert!(mqtt.host_port().is_err());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut cfg = RelayCfg::default();
        cfg.validate().expect("defaults are valid");
        cfg.poll.interval_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
