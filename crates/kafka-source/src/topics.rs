//! Topic discovery.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::ClientConfig;
use regex::Regex;

use crate::error::{Error, Result};

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of the topic set the syncer should consume.
#[async_trait]
pub trait TopicManager: Send + Sync {
    /// Returns the topics currently matching the filter.
    async fn topics(&self) -> Result<Vec<String>>;

    /// Releases the metadata client.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Exact topic names plus `^`-prefixed regular expressions.
#[derive(Debug, Clone)]
pub struct TopicFilter {
    names: Vec<String>,
    patterns: Vec<Regex>,
}

impl TopicFilter {
    pub fn new(topics: &[String]) -> Result<Self> {
        let mut names = Vec::new();
        let mut patterns = Vec::new();
        for topic in topics {
            if topic.is_empty() {
                return Err(Error::InvalidTopic {
                    topic: topic.clone(),
                    reason: "empty topic name".to_string(),
                });
            }
            if topic.starts_with('^') {
                let regex = Regex::new(topic).map_err(|e| Error::InvalidTopic {
                    topic: topic.clone(),
                    reason: e.to_string(),
                })?;
                patterns.push(regex);
            } else {
                names.push(topic.clone());
            }
        }
        Ok(Self { names, patterns })
    }

    pub fn matches(&self, topic: &str) -> bool {
        self.names.iter().any(|name| name == topic) || self.patterns.iter().any(|p| p.is_match(topic))
    }

    /// Keeps the matching topics, sorted and de-duplicated.
    pub fn filter<I, S>(&self, topics: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matched: Vec<String> = topics
            .into_iter()
            .filter(|t| self.matches(t.as_ref()))
            .map(|t| t.as_ref().to_string())
            .collect();
        matched.sort();
        matched.dedup();
        matched
    }
}

/// Discovers topics from cluster metadata.
pub struct KafkaTopicManager {
    client: Arc<BaseConsumer>,
    filter: TopicFilter,
}

impl KafkaTopicManager {
    pub fn new(config: &ClientConfig, topics: &[String]) -> Result<Self> {
        let filter = TopicFilter::new(topics)?;
        let client: BaseConsumer = config.create()?;
        Ok(Self {
            client: Arc::new(client),
            filter,
        })
    }
}

#[async_trait]
impl TopicManager for KafkaTopicManager {
    async fn topics(&self) -> Result<Vec<String>> {
        let client = Arc::clone(&self.client);
        let names = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let metadata = client.fetch_metadata(None, METADATA_TIMEOUT)?;
            Ok(metadata
                .topics()
                .iter()
                .filter(|t| t.error().is_none())
                .map(|t| t.name().to_string())
                .collect())
        })
        .await??;
        let topics = self.filter.filter(names);
        tracing::debug!("discovered topics: {:?}", topics);
        Ok(topics)
    }
}
