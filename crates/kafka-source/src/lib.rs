//! Kafka source for kafka-tail.
//!
//! The [`TargetSyncer`] periodically discovers the topics matching the
//! configured filter and keeps exactly one consumer-group session running
//! for the current topic set, restarting it whenever the set changes. Every
//! partition claimed by the session becomes a target that labels the
//! claim's records, runs them through the configured pipeline stages and
//! hands them to the downstream [`pipeline::EntryHandler`].
//!
//! Discovery and group membership sit behind the [`TopicManager`] and
//! [`ConsumerGroup`] traits; [`KafkaTopicManager`] and
//! [`KafkaConsumerGroup`] implement them with librdkafka.

mod auth;
pub mod config;
mod consumer;
pub mod duration;
pub mod error;
pub mod group;
mod syncer;
pub mod target;
pub mod topics;

pub use config::{Assignor, Authentication, KafkaConfig, SaslConfig, ScrapeConfig, TlsConfig};
pub use error::{Error, Result};
pub use group::{
    Claim, ConsumerGroup, GroupHandler, GroupSession, KafkaConsumerGroup, KafkaMessage,
};
pub use syncer::{SyncerState, TargetSyncer};
pub use target::{ConsumerDetails, TargetInfo};
pub use topics::{KafkaTopicManager, TopicFilter, TopicManager};
