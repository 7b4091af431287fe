//! Agent configuration file.
//!
//! ```yaml
//! scrape_configs:
//!   - job_name: kafka
//!     kafka:
//!       brokers: [localhost:9092]
//!       topics: ["^app-.*"]
//!       labels:
//!         job: kafka
//!     relabel_configs:
//!       - source_labels: [__meta_kafka_topic]
//!         target_label: topic
//! ```

use std::path::Path;

use anyhow::Context;
use kafka_tail_source::ScrapeConfig;
use pipeline::Pipeline;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default)]
    pub scrape_configs: Vec<ScrapeConfig>,
}

impl AgentConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&raw)
            .with_context(|| format!("Failed to load config file {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(raw).context("Invalid YAML")?;
        Ok(config)
    }

    /// Scrape configs with a `kafka` section; the others are ignored.
    pub fn kafka_scrape_configs(&self) -> Vec<ScrapeConfig> {
        self.scrape_configs
            .iter()
            .filter(|c| c.kafka.is_some())
            .cloned()
            .collect()
    }

    /// Validates every Kafka scrape config, including its pipeline stages.
    pub fn check(&self) -> anyhow::Result<Vec<ScrapeConfig>> {
        let configs = self.kafka_scrape_configs();
        if configs.is_empty() {
            anyhow::bail!("No scrape config with a kafka section");
        }
        configs
            .into_iter()
            .map(|mut config| {
                let job_name = config.job_name.clone();
                config
                    .validate()
                    .with_context(|| format!("Invalid scrape config '{job_name}'"))?;
                Pipeline::new(&config.pipeline_stages, Some(&job_name))
                    .with_context(|| format!("Invalid pipeline stages in '{job_name}'"))?;
                Ok(config)
            })
            .collect()
    }
}
