//! Targets: one per partition claim.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use pipeline::{Entry, EntryHandler, Pipeline, StageConfig};
use relabel::{LabelSet, RelabelConfig};
use serde::Serialize;

use crate::config::ScrapeConfig;
use crate::error::Result;
use crate::group::{Claim, GroupSession, KafkaMessage};

pub const META_TOPIC: &str = "__meta_kafka_topic";
pub const META_PARTITION: &str = "__meta_kafka_partition";
pub const META_MEMBER_ID: &str = "__meta_kafka_member_id";
pub const META_GROUP_ID: &str = "__meta_kafka_group_id";
pub const META_MESSAGE_KEY: &str = "__meta_kafka_message_key";

/// Identifies the claim a target was created for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumerDetails {
    pub member_id: String,
    pub generation_id: i32,
    pub topic: String,
    pub partition: i32,
    pub initial_offset: i64,
}

impl ConsumerDetails {
    fn new(session: &dyn GroupSession, claim: &Claim) -> Self {
        Self {
            member_id: session.member_id().to_string(),
            generation_id: session.generation_id(),
            topic: claim.topic.clone(),
            partition: claim.partition,
            initial_offset: claim.initial_offset,
        }
    }
}

impl fmt::Display for ConsumerDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "member_id={} generation_id={} topic={} partition={} initial_offset={}",
            self.member_id, self.generation_id, self.topic, self.partition, self.initial_offset
        )
    }
}

/// A read-only view of a target for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetInfo {
    pub details: ConsumerDetails,
    pub discovered_labels: LabelSet,
    /// Labels attached to every entry; empty for dropped targets.
    pub labels: LabelSet,
    /// Why the target was dropped, if it was.
    pub dropped_reason: Option<String>,
}

impl TargetInfo {
    pub fn is_dropped(&self) -> bool {
        self.dropped_reason.is_some()
    }
}

/// Reads a claim and forwards its messages as labeled entries.
pub struct Target {
    session: Arc<dyn GroupSession>,
    claim: Claim,
    details: ConsumerDetails,
    discovered_labels: LabelSet,
    labels: LabelSet,
    relabel_configs: Arc<[RelabelConfig]>,
    handler: Arc<dyn EntryHandler>,
    use_incoming_timestamp: bool,
}

impl Target {
    pub fn info(&self) -> TargetInfo {
        TargetInfo {
            details: self.details.clone(),
            discovered_labels: self.discovered_labels.clone(),
            labels: self.labels.clone(),
            dropped_reason: None,
        }
    }

    fn entry(&self, message: &KafkaMessage) -> Entry {
        let timestamp = match message.timestamp {
            Some(ts) if self.use_incoming_timestamp => ts,
            _ => Utc::now(),
        };
        let line = String::from_utf8_lossy(message.payload.as_deref().unwrap_or_default());
        Entry::new(self.message_labels(message), timestamp, line)
    }

    fn message_labels(&self, message: &KafkaMessage) -> LabelSet {
        if self.relabel_configs.is_empty() {
            return self.labels.clone();
        }
        let key = match message.key.as_deref() {
            Some(key) if !key.is_empty() => String::from_utf8_lossy(key).into_owned(),
            _ => "none".to_string(),
        };
        let input = LabelSet::from_iter([(META_MESSAGE_KEY, key)]);
        match relabel::process(&input, &self.relabel_configs) {
            Some(out) => self.labels.merge(&out.without_reserved()),
            None => self.labels.clone(),
        }
    }

    /// Unmarked messages are redelivered to the next owner of the partition.
    pub async fn run(mut self) -> Result<()> {
        let token = self.claim.token.clone();
        loop {
            let message = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                message = self.claim.messages.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            let entry = self.entry(&message);
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                handled = self.handler.handle(entry) => handled?,
            }
            self.session.mark_message(&message);
        }
        Ok(())
    }
}

/// Target whose labels were all removed by relabeling; its messages are discarded.
pub struct DroppedTarget {
    claim: Claim,
    details: ConsumerDetails,
    discovered_labels: LabelSet,
    reason: String,
}

impl DroppedTarget {
    pub fn info(&self) -> TargetInfo {
        TargetInfo {
            details: self.details.clone(),
            discovered_labels: self.discovered_labels.clone(),
            labels: LabelSet::new(),
            dropped_reason: Some(self.reason.clone()),
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let token = self.claim.token.clone();
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                message = self.claim.messages.recv() => if message.is_none() { break },
            }
        }
        Ok(())
    }
}

pub enum RunnableTarget {
    Active(Target),
    Dropped(DroppedTarget),
}

impl RunnableTarget {
    pub fn info(&self) -> TargetInfo {
        match self {
            RunnableTarget::Active(target) => target.info(),
            RunnableTarget::Dropped(target) => target.info(),
        }
    }

    /// Consumes the claim until it is cancelled or its message channel closes.
    pub async fn run(self) -> Result<()> {
        match self {
            RunnableTarget::Active(target) => target.run().await,
            RunnableTarget::Dropped(target) => target.run().await,
        }
    }
}

/// Builds a target for every claim from the scrape configuration.
pub struct TargetFactory {
    job_name: String,
    group_id: String,
    static_labels: LabelSet,
    relabel_configs: Arc<[RelabelConfig]>,
    pipeline_stages: Vec<StageConfig>,
    use_incoming_timestamp: bool,
    sink: Arc<dyn EntryHandler>,
}

impl TargetFactory {
    /// `config` must have been validated.
    pub fn new(config: &ScrapeConfig, sink: Arc<dyn EntryHandler>) -> Result<Self> {
        let kafka = config.kafka()?;
        Ok(Self {
            job_name: config.job_name.clone(),
            group_id: kafka.group_id.clone(),
            static_labels: kafka.labels.clone(),
            relabel_configs: config.relabel_configs.clone().into(),
            pipeline_stages: config.pipeline_stages.clone(),
            use_incoming_timestamp: kafka.use_incoming_timestamp,
            sink,
        })
    }

    pub fn new_target(&self, session: Arc<dyn GroupSession>, claim: Claim) -> Result<RunnableTarget> {
        let discovered_labels = LabelSet::from_iter([
            (META_TOPIC, claim.topic.clone()),
            (META_PARTITION, claim.partition.to_string()),
            (META_MEMBER_ID, session.member_id().to_string()),
            (META_GROUP_ID, self.group_id.clone()),
        ]);
        let details = ConsumerDetails::new(session.as_ref(), &claim);

        let labels = relabel::process(
            &discovered_labels.merge(&self.static_labels),
            &self.relabel_configs,
        )
        .map(|out| out.without_reserved())
        .unwrap_or_default();

        if labels.is_empty() {
            tracing::warn!(
                reason = "no labels",
                details = %details,
                discovered_labels = %discovered_labels,
                "dropping target"
            );
            return Ok(RunnableTarget::Dropped(DroppedTarget {
                claim,
                details,
                discovered_labels,
                reason: "dropping target, no labels".to_string(),
            }));
        }

        let pipeline = Pipeline::new(&self.pipeline_stages, Some(&self.job_name))?;
        Ok(RunnableTarget::Active(Target {
            session,
            claim,
            details,
            discovered_labels,
            labels,
            relabel_configs: Arc::clone(&self.relabel_configs),
            handler: pipeline.wrap(Arc::clone(&self.sink)),
            use_incoming_timestamp: self.use_incoming_timestamp,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct RecordingSession {
        marked: Mutex<Vec<i64>>,
    }

    impl GroupSession for RecordingSession {
        fn member_id(&self) -> &str {
            "promtail-1"
        }

        fn generation_id(&self) -> i32 {
            3
        }

        fn mark_message(&self, message: &KafkaMessage) {
            self.marked.lock().unwrap().push(message.offset);
        }
    }

    fn config(yaml: &str) -> ScrapeConfig {
        let mut config: ScrapeConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        config
    }

    fn claim(topic: &str, partition: i32) -> (mpsc::Sender<KafkaMessage>, Claim) {
        let (tx, rx) = mpsc::channel(16);
        let claim = Claim {
            topic: topic.to_string(),
            partition,
            initial_offset: 42,
            messages: rx,
            token: CancellationToken::new(),
        };
        (tx, claim)
    }

    fn message(offset: i64, key: Option<&str>, payload: &str) -> KafkaMessage {
        KafkaMessage {
            topic: "logs".to_string(),
            partition: 0,
            offset,
            key: key.map(|k| k.as_bytes().to_vec()),
            payload: Some(payload.as_bytes().to_vec()),
            timestamp: Some(Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap()),
        }
    }

    const BASE: &str = r#"
job_name: kafka
kafka:
  brokers: [localhost:9092]
  topics: [logs]
  group_id: workers
  use_incoming_timestamp: true
  labels:
    job: kafka
relabel_configs:
  - source_labels: [__meta_kafka_topic]
    target_label: topic
  - source_labels: [__meta_kafka_message_key]
    target_label: key
"#;

    #[tokio::test]
    async fn test_target_labels_and_entries() {
        let (sink, mut entries) = mpsc::channel(16);
        let factory = TargetFactory::new(&config(BASE), Arc::new(sink)).unwrap();
        let session = Arc::new(RecordingSession::default());
        let (tx, claim) = claim("logs", 0);

        let target = factory.new_target(session.clone(), claim).unwrap();
        let info = target.info();
        assert!(!info.is_dropped());
        assert_eq!(
            info.labels,
            LabelSet::from_iter([("job", "kafka"), ("topic", "logs")])
        );
        assert_eq!(info.discovered_labels.get(META_GROUP_ID), Some("workers"));
        assert_eq!(info.discovered_labels.get(META_MEMBER_ID), Some("promtail-1"));
        assert_eq!(info.discovered_labels.get(META_PARTITION), Some("0"));
        assert_eq!(info.details.generation_id, 3);
        assert_eq!(info.details.initial_offset, 42);

        tx.send(message(7, Some("user-1"), "hello")).await.unwrap();
        tx.send(message(8, None, "world")).await.unwrap();
        drop(tx);
        target.run().await.unwrap();

        let first = entries.recv().await.unwrap();
        assert_eq!(first.line, "hello");
        assert_eq!(first.labels.get("key"), Some("user-1"));
        assert_eq!(first.labels.get("topic"), Some("logs"));
        assert_eq!(first.timestamp, Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap());

        let second = entries.recv().await.unwrap();
        assert_eq!(second.labels.get("key"), Some("none"));

        assert_eq!(*session.marked.lock().unwrap(), vec![7, 8]);
    }

    #[tokio::test]
    async fn test_read_time_is_used_without_incoming_timestamp() {
        let yaml = BASE.replace("use_incoming_timestamp: true", "use_incoming_timestamp: false");
        let (sink, mut entries) = mpsc::channel(4);
        let factory = TargetFactory::new(&config(&yaml), Arc::new(sink)).unwrap();
        let (tx, claim) = claim("logs", 0);
        let target = factory
            .new_target(Arc::new(RecordingSession::default()), claim)
            .unwrap();

        let before = Utc::now();
        tx.send(message(1, None, "x")).await.unwrap();
        drop(tx);
        target.run().await.unwrap();

        assert!(entries.recv().await.unwrap().timestamp >= before);
    }

    #[tokio::test]
    async fn test_target_without_labels_is_dropped_and_drained() {
        let yaml = r#"
job_name: kafka
kafka:
  brokers: [localhost:9092]
  topics: [logs]
relabel_configs:
  - source_labels: [__meta_kafka_topic]
    regex: audit
    action: keep
"#;
        let (sink, mut entries) = mpsc::channel(4);
        let factory = TargetFactory::new(&config(yaml), Arc::new(sink)).unwrap();
        let session = Arc::new(RecordingSession::default());
        let (tx, claim) = claim("logs", 1);

        let target = factory.new_target(session.clone(), claim).unwrap();
        let info = target.info();
        assert!(info.is_dropped());
        assert!(info.labels.is_empty());
        assert_eq!(info.discovered_labels.get(META_TOPIC), Some("logs"));

        tx.send(message(1, None, "ignored")).await.unwrap();
        tx.send(message(2, None, "ignored")).await.unwrap();
        drop(tx);
        target.run().await.unwrap();

        assert!(entries.try_recv().is_err());
        assert!(session.marked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reserved_static_labels_never_leave_the_target() {
        let yaml = r#"
job_name: kafka
kafka:
  brokers: [localhost:9092]
  topics: [logs]
  labels:
    __tenant: a
"#;
        let (sink, _entries) = mpsc::channel(4);
        let factory = TargetFactory::new(&config(yaml), Arc::new(sink)).unwrap();
        let (_tx, claim) = claim("logs", 0);
        let target = factory
            .new_target(Arc::new(RecordingSession::default()), claim)
            .unwrap();
        assert!(target.info().is_dropped());
    }

    #[tokio::test]
    async fn test_invalid_pipeline_fails_target_creation() {
        let yaml = format!("{BASE}pipeline_stages:\n  - drop: {{}}\n");
        let (sink, _entries) = mpsc::channel(4);
        let factory = TargetFactory::new(&config(&yaml), Arc::new(sink)).unwrap();
        let (_tx, claim) = claim("logs", 0);
        assert!(factory
            .new_target(Arc::new(RecordingSession::default()), claim)
            .is_err());
    }

    #[tokio::test]
    async fn test_pipeline_stages_apply_to_entries() {
        let yaml = format!(
            "{BASE}pipeline_stages:\n  - regex:\n      expression: \"level=(?P<level>\\\\w+)\"\n  - labels:\n      level:\n"
        );
        let (sink, mut entries) = mpsc::channel(4);
        let factory = TargetFactory::new(&config(&yaml), Arc::new(sink)).unwrap();
        let (tx, claim) = claim("logs", 0);
        let target = factory
            .new_target(Arc::new(RecordingSession::default()), claim)
            .unwrap();

        tx.send(message(1, None, "level=error boom")).await.unwrap();
        drop(tx);
        target.run().await.unwrap();

        let entry = entries.recv().await.unwrap();
        assert_eq!(entry.labels.get("level"), Some("error"));
        assert_eq!(entry.labels.get("job"), Some("kafka"));
    }

    #[tokio::test]
    async fn test_cancelled_target_stops_while_the_channel_is_open() {
        let (sink, mut entries) = mpsc::channel(4);
        let factory = TargetFactory::new(&config(BASE), Arc::new(sink)).unwrap();
        let session = Arc::new(RecordingSession::default());
        let (tx, claim) = claim("logs", 0);
        let token = claim.token.clone();
        let target = factory.new_target(session.clone(), claim).unwrap();
        let running = tokio::spawn(target.run());

        tx.send(message(1, None, "first")).await.unwrap();
        assert_eq!(entries.recv().await.unwrap().line, "first");
        token.cancel();

        running.await.unwrap().unwrap();
        assert_eq!(*session.marked.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_a_blocked_sink() {
        // A full sink that is never read.
        let (sink, _entries) = mpsc::channel(1);
        let factory = TargetFactory::new(&config(BASE), Arc::new(sink)).unwrap();
        let session = Arc::new(RecordingSession::default());
        let (tx, claim) = claim("logs", 0);
        let token = claim.token.clone();
        let target = factory.new_target(session.clone(), claim).unwrap();
        let running = tokio::spawn(target.run());

        tx.send(message(1, None, "fits")).await.unwrap();
        tx.send(message(2, None, "blocks")).await.unwrap();
        while session.marked.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        token.cancel();

        running.await.unwrap().unwrap();
        assert_eq!(*session.marked.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_cancelled_dropped_target_stops_while_the_channel_is_open() {
        let yaml = r#"
job_name: kafka
kafka:
  brokers: [localhost:9092]
  topics: [logs]
"#;
        let (sink, _entries) = mpsc::channel(4);
        let factory = TargetFactory::new(&config(yaml), Arc::new(sink)).unwrap();
        let (tx, claim) = claim("logs", 0);
        let token = claim.token.clone();
        let target = factory
            .new_target(Arc::new(RecordingSession::default()), claim)
            .unwrap();
        assert!(target.info().is_dropped());

        tx.send(message(1, None, "ignored")).await.unwrap();
        token.cancel();
        target.run().await.unwrap();
    }
}
