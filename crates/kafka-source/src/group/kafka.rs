use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::consumer::stream_consumer::StreamPartitionQueue;
use rdkafka::consumer::{
    BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{ClientConfig, ClientContext, Offset, TopicPartitionList};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Claim, ConsumerGroup, GroupHandler, GroupSession, KafkaMessage};
use crate::config::Assignor;
use crate::error::{Error, Result};

/// Messages buffered per claim between the partition queue and the handler.
const CLAIM_BUFFER: usize = 256;
const COMMITTED_OFFSETS_TIMEOUT: Duration = Duration::from_secs(10);
/// Initial offset reported when the group has no committed offset yet.
const OFFSET_OLDEST: i64 = -2;
const OFFSET_NEWEST: i64 = -1;

type TopicPartition = (String, i32);

enum RebalanceEvent {
    Assigned(Vec<TopicPartition>, SyncSender<()>),
    Revoked(Vec<TopicPartition>, SyncSender<()>),
}

struct GroupContext {
    events: mpsc::UnboundedSender<RebalanceEvent>,
}

impl GroupContext {
    /// Hands the partitions to the consume cycle and blocks the rebalance
    /// until the cycle drops the rendezvous sender.
    fn notify(
        &self,
        tpl: &TopicPartitionList,
        event: fn(Vec<TopicPartition>, SyncSender<()>) -> RebalanceEvent,
    ) {
        if tpl.count() == 0 {
            return;
        }
        let partitions = tpl
            .elements()
            .iter()
            .map(|tp| (tp.topic().to_string(), tp.partition()))
            .collect();
        let (done, rendezvous) = sync_channel(0);
        if self.events.send(event(partitions, done)).is_ok() {
            while rendezvous.recv().is_ok() {}
        }
    }
}

/// Commits stored offsets; having nothing to commit is not an error.
fn commit_stored_offsets(consumer: &impl Consumer<GroupContext>, during: &str) {
    match consumer.commit_consumer_state(CommitMode::Sync) {
        Ok(()) | Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {}
        Err(e) => tracing::warn!("failed to commit offsets {}: {}", during, e),
    }
}

impl ClientContext for GroupContext {}

impl ConsumerContext for GroupContext {
    fn pre_rebalance(&self, base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(tpl) => self.notify(tpl, RebalanceEvent::Assigned),
            Rebalance::Revoke(tpl) => {
                self.notify(tpl, RebalanceEvent::Revoked);
                commit_stored_offsets(base_consumer, "during rebalance");
            }
            Rebalance::Error(e) => tracing::error!("consumer group rebalance failed: {}", e),
        }
    }
}

type GroupConsumer = StreamConsumer<GroupContext>;

struct KafkaSession {
    member_id: String,
    generation_id: i32,
    consumer: Arc<GroupConsumer>,
}

impl GroupSession for KafkaSession {
    fn member_id(&self) -> &str {
        &self.member_id
    }

    fn generation_id(&self) -> i32 {
        self.generation_id
    }

    fn mark_message(&self, message: &KafkaMessage) {
        if let Err(e) = self
            .consumer
            .store_offset(&message.topic, message.partition, message.offset + 1)
        {
            tracing::debug!(
                topic = %message.topic,
                partition = message.partition,
                "failed to store offset {}: {}",
                message.offset,
                e
            );
        }
    }
}

fn to_owned_message(message: &BorrowedMessage<'_>) -> KafkaMessage {
    KafkaMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(<[u8]>::to_vec),
        payload: message.payload().map(<[u8]>::to_vec),
        timestamp: message
            .timestamp()
            .to_millis()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
    }
}

/// Moves messages from a split partition queue into the claim channel.
async fn forward_partition(
    queue: StreamPartitionQueue<GroupContext>,
    messages: mpsc::Sender<KafkaMessage>,
    token: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            message = queue.recv() => message.map(|m| to_owned_message(&m)),
        };
        match received {
            Ok(message) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    sent = messages.send(message) => if sent.is_err() { break },
                }
            }
            Err(e) => tracing::warn!("error reading from partition queue: {}", e),
        }
    }
}

struct ClaimTask {
    token: CancellationToken,
    forwarder: JoinHandle<()>,
    task: JoinHandle<()>,
}

impl ClaimTask {
    async fn finish(self) {
        self.token.cancel();
        if let Err(e) = self.forwarder.await {
            tracing::warn!("partition forwarder failed: {}", e);
        }
        if let Err(e) = self.task.await {
            tracing::warn!("claim task failed: {}", e);
        }
    }
}

type ClaimResult = (TopicPartition, Result<()>);

/// A subscribed consumer with its poll thread, kept across consume cycles
/// for the same topic set.
struct Subscription {
    topics: Vec<String>,
    consumer: Arc<GroupConsumer>,
    events: mpsc::UnboundedReceiver<RebalanceEvent>,
    poll_token: CancellationToken,
    poll_task: JoinHandle<()>,
}

impl Subscription {
    fn new(config: &ClientConfig, topics: &[String]) -> Result<Self> {
        let (events_tx, events) = mpsc::unbounded_channel();
        let context = GroupContext { events: events_tx };
        let consumer: GroupConsumer = config.create_with_context(context)?;
        let consumer = Arc::new(consumer);

        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer.subscribe(&names)?;

        let poll_token = CancellationToken::new();
        let poll_task = {
            let consumer = Arc::clone(&consumer);
            let token = poll_token.clone();
            tokio::task::spawn_blocking(move || poll_consumer(consumer, token))
        };

        Ok(Self {
            topics: topics.to_vec(),
            consumer,
            events,
            poll_token,
            poll_task,
        })
    }

    async fn initial_offsets(&self, partitions: &[TopicPartition]) -> HashMap<TopicPartition, i64> {
        let mut tpl = TopicPartitionList::new();
        for (topic, partition) in partitions {
            tpl.add_partition(topic, *partition);
        }
        let consumer = Arc::clone(&self.consumer);
        let committed = tokio::task::spawn_blocking(move || {
            consumer.committed_offsets(tpl, COMMITTED_OFFSETS_TIMEOUT)
        })
        .await;
        let tpl = match committed {
            Ok(Ok(tpl)) => tpl,
            Ok(Err(e)) => {
                tracing::warn!("failed to fetch committed offsets: {}", e);
                return HashMap::new();
            }
            Err(e) => {
                tracing::warn!("failed to fetch committed offsets: {}", e);
                return HashMap::new();
            }
        };
        tpl.elements()
            .iter()
            .map(|el| {
                let offset = match el.offset() {
                    Offset::Offset(n) => n,
                    Offset::End => OFFSET_NEWEST,
                    _ => OFFSET_OLDEST,
                };
                ((el.topic().to_string(), el.partition()), offset)
            })
            .collect()
    }

    /// Runs one consume cycle: from the first assignment until every claim
    /// has been revoked, `token` is cancelled, or a claim fails.
    async fn run_cycle(
        &mut self,
        token: &CancellationToken,
        handler: Arc<dyn GroupHandler>,
        session: Arc<KafkaSession>,
    ) -> Result<()> {
        let cycle_token = token.child_token();
        let (finished_tx, mut finished) = mpsc::unbounded_channel::<ClaimResult>();
        let mut claims: HashMap<TopicPartition, ClaimTask> = HashMap::new();
        let mut started = false;

        let mut result = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break Ok(()),
                Some((tp, claim_result)) = finished.recv() => {
                    if let Err(e) = claim_result {
                        break Err(e);
                    }
                    if let Some(claim) = claims.remove(&tp) {
                        claim.finish().await;
                    }
                }
                event = self.events.recv() => match event {
                    None => break Err(Error::Group("consumer poll loop stopped".to_string())),
                    Some(RebalanceEvent::Assigned(partitions, done)) => {
                        tracing::info!("partitions assigned: {:?}", partitions);
                        if !started {
                            if let Err(e) = handler.setup(Arc::clone(&session) as Arc<dyn GroupSession>).await {
                                break Err(e);
                            }
                            started = true;
                        }
                        let offsets = self.initial_offsets(&partitions).await;
                        for (topic, partition) in partitions {
                            let Some(queue) = self.consumer.split_partition_queue(&topic, partition) else {
                                tracing::warn!("failed to get queue for assigned partition {}:{}", topic, partition);
                                continue;
                            };
                            let tp = (topic.clone(), partition);
                            let claim_token = cycle_token.child_token();
                            let (tx, rx) = mpsc::channel(CLAIM_BUFFER);
                            let forwarder = tokio::spawn(forward_partition(queue, tx, claim_token.clone()));
                            let claim = Claim {
                                topic,
                                partition,
                                initial_offset: offsets.get(&tp).copied().unwrap_or(OFFSET_OLDEST),
                                messages: rx,
                                token: claim_token.clone(),
                            };
                            let task = {
                                let handler = Arc::clone(&handler);
                                let session = Arc::clone(&session) as Arc<dyn GroupSession>;
                                let finished = finished_tx.clone();
                                let tp = tp.clone();
                                tokio::spawn(async move {
                                    let result = handler.consume_claim(session, claim).await;
                                    let _ = finished.send((tp, result));
                                })
                            };
                            claims.insert(tp, ClaimTask { token: claim_token, forwarder, task });
                        }
                        drop(done);
                    }
                    Some(RebalanceEvent::Revoked(partitions, done)) => {
                        tracing::info!("partitions revoked: {:?}", partitions);
                        for tp in &partitions {
                            if let Some(claim) = claims.remove(tp) {
                                claim.finish().await;
                            }
                        }
                        drop(done);
                        if claims.is_empty() {
                            break Ok(());
                        }
                    }
                }
            }
        };

        cycle_token.cancel();
        for (_, claim) in claims.drain() {
            claim.finish().await;
        }
        drop(finished_tx);
        while let Ok((_, claim_result)) = finished.try_recv() {
            if let (Ok(()), Err(e)) = (&result, claim_result) {
                result = Err(e);
            }
        }
        if started {
            if let Err(e) = handler.cleanup(session).await {
                tracing::warn!("consumer group cleanup failed: {}", e);
            }
        }
        result
    }

    async fn shutdown(self) {
        // Rebalance callbacks fired while closing must not wait for a cycle.
        drop(self.events);
        self.poll_token.cancel();
        if let Err(e) = self.poll_task.await {
            tracing::warn!("consumer poll thread failed: {}", e);
        }
        let consumer = self.consumer;
        let closed = tokio::task::spawn_blocking(move || {
            commit_stored_offsets(consumer.as_ref(), "on close");
            drop(consumer);
        })
        .await;
        if let Err(e) = closed {
            tracing::warn!("failed to close consumer: {}", e);
        }
        tracing::debug!("unsubscribed from topics {:?}", self.topics);
    }
}

/// Serves rebalance callbacks. Messages are read from split partition
/// queues, never from this thread.
fn poll_consumer(consumer: Arc<GroupConsumer>, token: CancellationToken) {
    Handle::current().block_on(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                message = consumer.recv() => match message {
                    Err(e) => tracing::warn!("error polling consumer group: {}", e),
                    Ok(m) => tracing::debug!(
                        topic = m.topic(),
                        partition = m.partition(),
                        "message received outside of a claim"
                    ),
                },
            }
        }
    });
}

/// librdkafka-backed consumer group.
///
/// The consumer stays subscribed between consume cycles for the same topic
/// set and is closed when a cycle ends through cancellation or an error.
pub struct KafkaConsumerGroup {
    config: ClientConfig,
    member_id: String,
    generation: AtomicI32,
    closed: AtomicBool,
    subscription: Mutex<Option<Subscription>>,
}

impl KafkaConsumerGroup {
    pub fn new(base: &ClientConfig, group_id: &str, assignor: Assignor) -> Self {
        let member_id = format!("{group_id}-{}", uuid::Uuid::new_v4());
        let mut config = base.clone();
        config
            .set("group.id", group_id)
            .set("client.id", &member_id)
            .set("partition.assignment.strategy", assignor.strategy())
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false");
        Self {
            config,
            member_id,
            generation: AtomicI32::new(0),
            closed: AtomicBool::new(false),
            subscription: Mutex::new(None),
        }
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }
}

#[async_trait]
impl ConsumerGroup for KafkaConsumerGroup {
    async fn consume(
        &self,
        token: &CancellationToken,
        topics: &[String],
        handler: Arc<dyn GroupHandler>,
    ) -> Result<()> {
        let mut slot = self.subscription.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Group("consumer group is closed".to_string()));
        }
        let mut subscription = match slot.take() {
            Some(current) if current.topics == topics => current,
            Some(stale) => {
                stale.shutdown().await;
                Subscription::new(&self.config, topics)?
            }
            None => Subscription::new(&self.config, topics)?,
        };

        let session = Arc::new(KafkaSession {
            member_id: self.member_id.clone(),
            generation_id: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            consumer: Arc::clone(&subscription.consumer),
        });
        let result = subscription.run_cycle(token, handler, session).await;

        if result.is_err() || token.is_cancelled() {
            subscription.shutdown().await;
        } else {
            *slot = Some(subscription);
        }
        result
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.shutdown().await;
        }
        Ok(())
    }
}
