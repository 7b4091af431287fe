//! Consumer group abstraction.
//!
//! A [`ConsumerGroup`] joins the group for a set of topics and drives a
//! [`GroupHandler`] through one consume cycle: `setup` once, then
//! `consume_claim` for every partition assigned to this member, then
//! `cleanup` when the assignment ends. Callers loop over `consume` to
//! follow rebalances.

mod kafka;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub use kafka::KafkaConsumerGroup;

/// An owned copy of a consumed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
    /// Broker-supplied timestamp, when the record carries one.
    pub timestamp: Option<DateTime<Utc>>,
}

/// The current group membership, shared by every claim of a cycle.
pub trait GroupSession: Send + Sync {
    fn member_id(&self) -> &str;

    fn generation_id(&self) -> i32;

    /// Marks `message` as consumed so its offset is committed.
    fn mark_message(&self, message: &KafkaMessage);
}

/// One partition assigned to this member.
///
/// `token` is cancelled when the partition is revoked or the cycle ends;
/// `messages` may stay open after that.
pub struct Claim {
    pub topic: String,
    pub partition: i32,
    /// Offset of the first message the claim will deliver, or -1 when unknown.
    pub initial_offset: i64,
    pub messages: mpsc::Receiver<KafkaMessage>,
    pub token: CancellationToken,
}

#[async_trait]
pub trait GroupHandler: Send + Sync {
    async fn setup(&self, session: Arc<dyn GroupSession>) -> Result<()>;

    async fn cleanup(&self, session: Arc<dyn GroupSession>) -> Result<()>;

    /// Runs until the claim is cancelled or its message channel is closed.
    async fn consume_claim(&self, session: Arc<dyn GroupSession>, claim: Claim) -> Result<()>;
}

#[async_trait]
pub trait ConsumerGroup: Send + Sync {
    /// Runs one consume cycle for `topics`.
    ///
    /// Returns `Ok` when the cycle ends because of a rebalance or because
    /// `token` was cancelled, and `Err` when joining the group or handling
    /// a claim failed.
    async fn consume(
        &self,
        token: &CancellationToken,
        topics: &[String],
        handler: Arc<dyn GroupHandler>,
    ) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
