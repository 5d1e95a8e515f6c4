//! Scheduler configuration.
//!
//! The scheduler section of the provider's configuration file deserializes
//! into [`Config`]. Every field has a default so an empty section yields a
//! working local setup.

use std::time::Duration;

use serde::Deserialize;

/// Configuration of the framework scheduler.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Master scheduler-API endpoint.
    pub mesos_url: String,
    /// Principal used to authenticate against the master; attached to the
    /// framework info only when non-empty.
    pub principal: String,
    /// Framework display name.
    pub name: String,
    /// Framework role; `*` means no static reservation is applied when
    /// carving offer resources.
    pub role: String,
    /// Wire codec for the scheduler API.
    pub codec: Codec,
    /// Per-call HTTP timeout.
    #[serde(with = "duration")]
    pub timeout: Duration,
    /// How long the master keeps this framework's state across a
    /// disconnect; attached only when positive.
    #[serde(with = "duration")]
    pub failover_timeout: Duration,
    /// Framework task checkpointing.
    pub checkpoint: bool,
    /// Enables per-event and per-offer diagnostics.
    pub verbose: bool,
    /// Number of revive calls that may be sent in a burst within the
    /// revive-wait period.
    pub revive_burst: usize,
    /// Time to fully recharge the revive-burst quota.
    #[serde(with = "duration")]
    pub revive_wait: Duration,
    /// Metrics HTTP endpoint.
    pub metrics: MetricsConfig,
    /// Upper bound of the jittered refuse-seconds sent with declines and
    /// accepts.
    #[serde(with = "duration")]
    pub max_refuse_seconds: Duration,
    /// Delay between internal job restarts after a failure.
    #[serde(with = "duration")]
    pub job_restart_delay: Duration,
    /// User the framework's tasks run as.
    pub user: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mesos_url: "http://:5050/api/v1/scheduler".to_string(),
            principal: String::new(),
            name: "vk_mesos".to_string(),
            role: "*".to_string(),
            codec: Codec::Json,
            timeout: Duration::from_secs(20),
            failover_timeout: Duration::from_secs(1000 * 3600),
            checkpoint: true,
            verbose: true,
            revive_burst: 3,
            revive_wait: Duration::from_secs(1),
            metrics: MetricsConfig::default(),
            max_refuse_seconds: Duration::from_secs(5),
            job_restart_delay: Duration::from_secs(5),
            user: "root".to_string(),
        }
    }
}

/// Serialization used when talking to the master.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Json,
}

impl Codec {
    pub fn content_type(&self) -> &'static str {
        match self {
            Codec::Json => "application/json",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub address: String,
    pub port: u16,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            address: "localhost".to_string(),
            port: 64009,
            path: "/metrics".to_string(),
        }
    }
}

/// Deserializes durations written the way the configuration file writes
/// them: a number followed by `ms`, `s`, `m` or `h`.
mod duration {
    use std::time::Duration;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(D::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<Duration, String> {
        let raw = raw.trim();
        let unit_at = raw
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("duration {:?} is missing a unit", raw))?;
        let (number, unit) = raw.split_at(unit_at);
        let value: u64 = number
            .parse()
            .map_err(|_| format!("invalid duration {:?}", raw))?;
        match unit {
            "ms" => Ok(Duration::from_millis(value)),
            "s" => Ok(Duration::from_secs(value)),
            "m" => Ok(Duration::from_secs(value * 60)),
            "h" => Ok(Duration::from_secs(value * 3600)),
            _ => Err(format!("unknown duration unit {:?}", unit)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_describe_a_local_master() {
        let config = Config::default();
        assert_eq!(config.mesos_url, "http://:5050/api/v1/scheduler");
        assert_eq!(config.name, "vk_mesos");
        assert_eq!(config.role, "*");
        assert_eq!(config.user, "root");
        assert_eq!(config.timeout, Duration::from_secs(20));
        assert_eq!(config.failover_timeout, Duration::from_secs(3_600_000));
        assert_eq!(config.revive_burst, 3);
        assert_eq!(config.revive_wait, Duration::from_secs(1));
        assert_eq!(config.max_refuse_seconds, Duration::from_secs(5));
        assert_eq!(config.job_restart_delay, Duration::from_secs(5));
        assert!(config.checkpoint);
        assert!(config.verbose);
        assert_eq!(config.metrics.address, "localhost");
        assert_eq!(config.metrics.port, 64009);
        assert_eq!(config.metrics.path, "/metrics");
    }

    #[test]
    fn durations_parse_with_units() {
        assert_eq!(duration::parse("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(duration::parse("20s").unwrap(), Duration::from_secs(20));
        assert_eq!(duration::parse("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(duration::parse("1000h").unwrap(), Duration::from_secs(3_600_000));
        duration::parse("20").unwrap_err();
        duration::parse("s").unwrap_err();
        duration::parse("20d").unwrap_err();
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"mesosUrl":"http://master:5050/api/v1/scheduler","role":"batch","reviveBurst":5,"timeout":"5s"}"#,
        )
        .unwrap();
        assert_eq!(config.mesos_url, "http://master:5050/api/v1/scheduler");
        assert_eq!(config.role, "batch");
        assert_eq!(config.revive_burst, 5);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.name, "vk_mesos");
        assert_eq!(config.codec, Codec::Json);
    }
}
