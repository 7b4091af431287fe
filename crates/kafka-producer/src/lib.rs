//! Kafka producer library for testing kafka-tail
//!
//! Publishes plain-text log lines to Kafka topics and creates the topics the
//! tests need.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kafka_tail_producer::{publish_test_lines, KafkaTestProducer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let producer = KafkaTestProducer::new("localhost:9092").await?;
//!     producer.create_topic_if_not_exists("app-logs", 3).await?;
//!     producer.publish_line("app-logs", Some("web-1"), "level=info msg=started").await?;
//!     publish_test_lines(&producer, "app-logs", 10).await?;
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use std::time::Duration;

pub mod testdata;

pub use testdata::{publish_test_lines, test_line};

/// Kafka producer wrapper for testing
pub struct KafkaTestProducer {
    producer: FutureProducer,
    broker: String,
}

impl KafkaTestProducer {
    /// Create a new Kafka test producer
    pub async fn new(broker: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", broker)
            .set("message.timeout.ms", "5000")
            .create()
            .context("Failed to create Kafka producer")?;

        Ok(Self {
            producer,
            broker: broker.to_string(),
        })
    }

    fn admin_client(&self) -> Result<AdminClient<DefaultClientContext>> {
        ClientConfig::new()
            .set("bootstrap.servers", &self.broker)
            .create()
            .context("Failed to create admin client")
    }

    /// Create Kafka topic if it doesn't exist
    pub async fn create_topic_if_not_exists(&self, topic: &str, partitions: i32) -> Result<()> {
        let admin_client = self.admin_client()?;
        let new_topic = NewTopic::new(topic, partitions, TopicReplication::Fixed(1));
        let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(5)));

        match admin_client.create_topics(&[new_topic], &opts).await {
            Ok(results) => {
                for result in results {
                    match result {
                        Ok(topic_name) => {
                            tracing::info!("Topic '{topic_name}' created successfully");
                        }
                        Err((topic_name, err)) => {
                            if err.to_string().contains("already exists") {
                                tracing::info!("Topic '{topic_name}' already exists");
                            } else {
                                return Err(anyhow::anyhow!("Failed to create topic: {err}"));
                            }
                        }
                    }
                }
            }
            Err(e) => return Err(anyhow::anyhow!("Failed to create topics: {e}")),
        }

        Ok(())
    }

    /// Delete a topic; a missing topic is not an error.
    pub async fn delete_topic(&self, topic: &str) -> Result<()> {
        let admin_client = self.admin_client()?;
        let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(5)));
        let results = admin_client
            .delete_topics(&[topic], &opts)
            .await
            .context("Failed to delete topics")?;
        for result in results {
            if let Err((topic_name, err)) = result {
                tracing::warn!("Could not delete topic '{topic_name}': {err}");
            }
        }
        Ok(())
    }

    /// Publish one log line, optionally keyed
    pub async fn publish_line(&self, topic: &str, key: Option<&str>, line: &str) -> Result<()> {
        let mut record: FutureRecord<'_, str, str> = FutureRecord::to(topic).payload(line);
        if let Some(key) = key {
            record = record.key(key);
        }

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(err, _)| err)
            .context("Failed to send log line to Kafka")?;

        tracing::debug!("Published line to {}: {}", topic, line);
        Ok(())
    }
}
