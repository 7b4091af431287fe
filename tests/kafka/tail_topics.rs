//! Tails topics created while the syncer is running.
//!
//! Test flow:
//! 1. Start a syncer whose filter matches `e2e-<id>-.*`
//! 2. Create the first topic and publish lines; they reach the sink
//! 3. Create a second matching topic; the session restarts and covers both
//! 4. Stop the syncer

use std::sync::Arc;
use std::time::Duration;

use kafka_tail_producer::{publish_test_lines, test_line, KafkaTestProducer};
use kafka_tail_source::{ScrapeConfig, SyncerState, TargetSyncer};
use pipeline::Entry;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn broker() -> String {
    std::env::var("KAFKA_BROKER").unwrap_or_else(|_| "kafka:9092".to_string())
}

async fn receive(entries: &mut mpsc::Receiver<Entry>, count: usize) -> Vec<Entry> {
    let mut received = Vec::with_capacity(count);
    while received.len() < count {
        match timeout(Duration::from_secs(30), entries.recv()).await {
            Ok(Some(entry)) => received.push(entry),
            Ok(None) => panic!("sink closed after {} entries", received.len()),
            Err(_) => panic!("timed out after {} of {count} entries", received.len()),
        }
    }
    received
}

#[tokio::test]
#[ignore = "requires a Kafka broker"]
async fn test_tail_dynamically_discovered_topics() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("kafka_tail_source=debug")
        .try_init()
        .ok();

    let id = chrono::Utc::now().timestamp_millis();
    let first = format!("e2e-{id}-a");
    let second = format!("e2e-{id}-b");

    let producer = KafkaTestProducer::new(&broker()).await?;
    producer.create_topic_if_not_exists(&first, 2).await?;
    publish_test_lines(&producer, &first, 5).await?;

    let config: ScrapeConfig = serde_yaml::from_str(&format!(
        r#"
job_name: e2e
kafka:
  brokers: ["{broker}"]
  topics: ["^e2e-{id}-.*"]
  group_id: e2e-{id}
  topic_poll_interval: 1s
  labels:
    job: e2e
relabel_configs:
  - source_labels: [__meta_kafka_topic]
    target_label: topic
"#,
        broker = broker(),
    ))?;

    let (sink, mut entries) = mpsc::channel(100);
    let syncer = TargetSyncer::new(config, Arc::new(sink))?;

    let received = receive(&mut entries, 5).await;
    assert!(received.iter().all(|e| e.labels.get("topic") == Some(first.as_str())));
    assert!(received.iter().all(|e| e.labels.get("job") == Some("e2e")));
    let mut lines: Vec<String> = received.into_iter().map(|e| e.line).collect();
    lines.sort();
    let mut expected: Vec<String> = (0..5).map(test_line).collect();
    expected.sort();
    assert_eq!(lines, expected);

    producer.create_topic_if_not_exists(&second, 1).await?;
    let mut states = syncer.subscribe();
    timeout(
        Duration::from_secs(30),
        states.wait_for(|s| matches!(s, SyncerState::Active(t) if t.len() == 2)),
    )
    .await??;

    producer.publish_line(&second, None, "from the second topic").await?;
    // Delivery is at-least-once, so the restart may replay lines of the first topic.
    let entry = loop {
        let entry = receive(&mut entries, 1).await.remove(0);
        if entry.labels.get("topic") == Some(second.as_str()) {
            break entry;
        }
    };
    assert_eq!(entry.line, "from the second topic");

    syncer.stop().await?;
    assert_eq!(syncer.state(), SyncerState::Stopped);

    producer.delete_topic(&first).await?;
    producer.delete_topic(&second).await?;
    Ok(())
}
