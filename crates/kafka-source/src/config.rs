//! Scrape configuration for Kafka targets.
//!
//! ```yaml
//! job_name: kafka
//! kafka:
//!   brokers: [localhost:9092]
//!   topics: [app-logs, "^team-.+"]
//!   labels:
//!     job: kafka
//! relabel_configs:
//!   - source_labels: [__meta_kafka_topic]
//!     target_label: topic
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use pipeline::StageConfig;
use rdkafka::ClientConfig;
use relabel::{LabelSet, RelabelConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_VERSION: &str = "2.1.1";
pub const DEFAULT_GROUP_ID: &str = "promtail";
pub const DEFAULT_TOPIC_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrapeConfig {
    pub job_name: String,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub relabel_configs: Vec<RelabelConfig>,
    /// Stages are written as single-key maps, `- regex: {...}`.
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub pipeline_stages: Vec<StageConfig>,
}

impl ScrapeConfig {
    /// Checks the configuration and fills in defaults.
    ///
    /// No network I/O happens here; a config that passes can still fail to
    /// reach its brokers later.
    pub fn validate(&mut self) -> Result<&KafkaConfig> {
        for relabel in &self.relabel_configs {
            relabel.validate()?;
        }
        let kafka = self
            .kafka
            .as_mut()
            .ok_or_else(|| Error::InvalidConfig("Kafka configuration is empty".to_string()))?;
        kafka.validate()?;
        Ok(&*kafka)
    }

    /// The Kafka section, once `validate` has succeeded.
    pub fn kafka(&self) -> Result<&KafkaConfig> {
        self.kafka
            .as_ref()
            .ok_or_else(|| Error::InvalidConfig("Kafka configuration is empty".to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KafkaConfig {
    /// Bootstrap brokers, `host:port`.
    #[serde(default)]
    pub brokers: Vec<String>,
    /// Exact topic names, or regular expressions when prefixed with `^`.
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub group_id: String,
    /// Broker protocol version, e.g. `2.1.1` or `0.10.2.0`.
    #[serde(default)]
    pub version: String,
    /// `range` (default), `roundrobin` or `sticky`.
    #[serde(default)]
    pub assignor: String,
    #[serde(default)]
    pub authentication: Authentication,
    /// Static labels attached to every target.
    #[serde(default)]
    pub labels: LabelSet,
    /// Use the broker-supplied record timestamp instead of the read time.
    #[serde(default)]
    pub use_incoming_timestamp: bool,
    #[serde(
        default = "default_topic_poll_interval",
        with = "crate::duration"
    )]
    pub topic_poll_interval: Duration,
}

fn default_topic_poll_interval() -> Duration {
    DEFAULT_TOPIC_POLL_INTERVAL
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            topics: Vec::new(),
            group_id: String::new(),
            version: String::new(),
            assignor: String::new(),
            authentication: Authentication::default(),
            labels: LabelSet::new(),
            use_incoming_timestamp: false,
            topic_poll_interval: DEFAULT_TOPIC_POLL_INTERVAL,
        }
    }
}

impl KafkaConfig {
    pub fn validate(&mut self) -> Result<()> {
        if self.version.is_empty() {
            self.version = DEFAULT_VERSION.to_string();
        }
        if self.brokers.is_empty() {
            return Err(Error::InvalidConfig(
                "no Kafka bootstrap brokers defined".to_string(),
            ));
        }
        if self.topics.is_empty() {
            return Err(Error::InvalidConfig(
                "no topics given to be consumed".to_string(),
            ));
        }
        if self.group_id.is_empty() {
            self.group_id = DEFAULT_GROUP_ID.to_string();
        }
        if self.topic_poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "topic_poll_interval must be greater than zero".to_string(),
            ));
        }
        for name in self.labels.names() {
            if !relabel::is_valid_label_name(name) {
                return Err(Error::InvalidConfig(format!("invalid label name '{name}'")));
            }
        }
        self.version.parse::<KafkaVersion>()?;
        self.assignor.parse::<Assignor>()?;
        self.authentication.validate()?;
        Ok(())
    }

    pub fn parsed_version(&self) -> Result<KafkaVersion> {
        self.version.parse()
    }

    pub fn parsed_assignor(&self) -> Result<Assignor> {
        self.assignor.parse()
    }

    /// Client properties shared by the metadata client and the consumer group.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let version = self.parsed_version()?;
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.brokers.join(","))
            .set("broker.version.fallback", version.to_string());
        crate::auth::apply(&self.authentication, &mut config)?;
        Ok(config)
    }
}

/// A broker protocol version: `x.y.z` from 1.0 on, `0.x.y.z` before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaVersion(Vec<u32>);

impl FromStr for KafkaVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidVersion(s.to_string());
        let parts = s
            .split('.')
            .map(|p| p.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>>>()?;
        let expected = if parts.first() == Some(&0) { 4 } else { 3 };
        if parts.len() != expected {
            return Err(invalid());
        }
        Ok(Self(parts))
    }
}

impl fmt::Display for KafkaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Consumer group partition assignment strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Assignor {
    #[default]
    Range,
    RoundRobin,
    Sticky,
}

impl Assignor {
    /// The `partition.assignment.strategy` value for librdkafka.
    pub fn strategy(&self) -> &'static str {
        match self {
            Assignor::Range => "range",
            Assignor::RoundRobin => "roundrobin",
            Assignor::Sticky => "cooperative-sticky",
        }
    }
}

impl FromStr for Assignor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "range" => Ok(Assignor::Range),
            "roundrobin" => Ok(Assignor::RoundRobin),
            "sticky" => Ok(Assignor::Sticky),
            other => Err(Error::UnsupportedAssignor(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Authentication {
    /// `none` (or empty), `ssl` or `sasl`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub tls_config: TlsConfig,
    #[serde(default)]
    pub sasl_config: SaslConfig,
}

impl Authentication {
    pub fn validate(&self) -> Result<()> {
        match self.kind.as_str() {
            "" | "none" | "ssl" => Ok(()),
            "sasl" => self.sasl_config.mechanism().map(|_| ()),
            other => Err(Error::UnsupportedAuthentication(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaslConfig {
    /// `PLAIN` (default), `SCRAM-SHA-256` or `SCRAM-SHA-512`.
    #[serde(default)]
    pub mechanism: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub tls_config: TlsConfig,
}

impl fmt::Debug for SaslConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslConfig")
            .field("mechanism", &self.mechanism)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("use_tls", &self.use_tls)
            .field("tls_config", &self.tls_config)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

impl SaslMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

impl SaslConfig {
    pub fn mechanism(&self) -> Result<SaslMechanism> {
        match self.mechanism.as_str() {
            "" | "PLAIN" => Ok(SaslMechanism::Plain),
            "SCRAM-SHA-256" => Ok(SaslMechanism::ScramSha256),
            "SCRAM-SHA-512" => Ok(SaslMechanism::ScramSha512),
            other => Err(Error::UnsupportedSaslMechanism(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> ScrapeConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults_are_filled_in() {
        let mut config = parse(
            r#"
job_name: kafka
kafka:
  brokers: [localhost:9092]
  topics: [logs]
"#,
        );
        let kafka = config.validate().unwrap();
        assert_eq!(kafka.version, "2.1.1");
        assert_eq!(kafka.group_id, "promtail");
        assert_eq!(kafka.parsed_assignor().unwrap(), Assignor::Range);
        assert_eq!(kafka.topic_poll_interval, Duration::from_secs(30));
        assert!(!kafka.use_incoming_timestamp);
    }

    #[test]
    fn test_missing_sections_are_rejected() {
        let mut config = parse("job_name: kafka\n");
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = parse("job_name: kafka\nkafka:\n  topics: [logs]\n");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no Kafka bootstrap brokers defined"));

        let mut config = parse("job_name: kafka\nkafka:\n  brokers: [b:9092]\n");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no topics given to be consumed"));
    }

    #[test]
    fn test_assignor_values() {
        assert_eq!("".parse::<Assignor>().unwrap(), Assignor::Range);
        assert_eq!("range".parse::<Assignor>().unwrap(), Assignor::Range);
        assert_eq!("roundrobin".parse::<Assignor>().unwrap(), Assignor::RoundRobin);
        assert_eq!("sticky".parse::<Assignor>().unwrap().strategy(), "cooperative-sticky");
        assert!(matches!(
            "fair".parse::<Assignor>(),
            Err(Error::UnsupportedAssignor(name)) if name == "fair"
        ));
    }

    #[test]
    fn test_versions() {
        assert!("2.1.1".parse::<KafkaVersion>().is_ok());
        assert!("0.10.2.0".parse::<KafkaVersion>().is_ok());
        assert_eq!("3.6.0".parse::<KafkaVersion>().unwrap().to_string(), "3.6.0");
        assert!("0.10.2".parse::<KafkaVersion>().is_err());
        assert!("2.1".parse::<KafkaVersion>().is_err());
        assert!("latest".parse::<KafkaVersion>().is_err());
    }

    #[test]
    fn test_authentication_validation() {
        let mut config = parse(
            r#"
job_name: kafka
kafka:
  brokers: [localhost:9092]
  topics: [logs]
  authentication:
    type: sasl
    sasl_config:
      mechanism: SCRAM-SHA-512
      user: alice
      password: secret
"#,
        );
        config.validate().unwrap();
        let kafka = config.kafka().unwrap();
        assert_eq!(
            kafka.authentication.sasl_config.mechanism().unwrap(),
            SaslMechanism::ScramSha512
        );
        assert!(!format!("{:?}", kafka.authentication).contains("secret"));

        let mut kafka = config.kafka.clone().unwrap();
        kafka.authentication.sasl_config.mechanism = "GSSAPI".to_string();
        assert!(matches!(
            kafka.validate(),
            Err(Error::UnsupportedSaslMechanism(_))
        ));

        kafka.authentication.kind = "kerberos".to_string();
        assert!(matches!(
            kafka.validate(),
            Err(Error::UnsupportedAuthentication(_))
        ));
    }

    #[test]
    fn test_client_config() {
        let mut config = parse(
            r#"
job_name: kafka
kafka:
  brokers: [b1:9092, b2:9092]
  topics: [logs]
  version: 0.10.2.0
  authentication:
    type: ssl
"#,
        );
        let client = config.validate().unwrap().client_config().unwrap();
        assert_eq!(client.get("bootstrap.servers"), Some("b1:9092,b2:9092"));
        assert_eq!(client.get("broker.version.fallback"), Some("0.10.2.0"));
        assert_eq!(client.get("security.protocol"), Some("ssl"));
    }

    #[test]
    fn test_poll_interval_and_labels() {
        let mut config = parse(
            r#"
job_name: kafka
kafka:
  brokers: [localhost:9092]
  topics: [logs]
  topic_poll_interval: 5m
  labels:
    job: kafka
"#,
        );
        let kafka = config.validate().unwrap();
        assert_eq!(kafka.topic_poll_interval, Duration::from_secs(300));
        assert_eq!(kafka.labels.get("job"), Some("kafka"));

        let mut kafka = kafka.clone();
        kafka.labels.insert("bad-name", "x");
        assert!(kafka.validate().is_err());
    }

    #[test]
    fn test_pipeline_stages_are_single_key_maps() {
        let config = parse(
            r#"
job_name: kafka
kafka:
  brokers: [localhost:9092]
  topics: [logs]
pipeline_stages:
  - regex:
      expression: "level=(?P<level>\\w+)"
  - labels:
      level:
  - drop: {}
"#,
        );
        assert_eq!(config.pipeline_stages.len(), 3);
        assert!(matches!(config.pipeline_stages[0], StageConfig::Regex(_)));
        assert!(matches!(config.pipeline_stages[1], StageConfig::Labels(_)));
        assert!(matches!(config.pipeline_stages[2], StageConfig::Drop(_)));

        let mut written = Vec::new();
        serde_yaml::with::singleton_map_recursive::serialize(
            &config.pipeline_stages,
            &mut serde_yaml::Serializer::new(&mut written),
        )
        .unwrap();
        let written = String::from_utf8(written).unwrap();
        assert!(written.contains("- regex:"), "{written}");
    }
}
