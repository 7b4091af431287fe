//! Keeps one consume session running for the currently discovered topics.
//!
//! Two tasks cooperate:
//!
//! - the poller asks the [`TopicManager`] for topics on every tick and sends
//!   the new set whenever it differs from the previous one;
//! - the driver stops the running session and, when the new set is not
//!   empty, starts a fresh one.
//!
//! A session is always stopped and awaited before the next one starts.

use std::sync::Arc;
use std::time::Duration;

use pipeline::EntryHandler;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::ScrapeConfig;
use crate::consumer::{ClaimHandler, Consumer};
use crate::error::Result;
use crate::group::{ConsumerGroup, KafkaConsumerGroup};
use crate::target::{TargetFactory, TargetInfo};
use crate::topics::{KafkaTopicManager, TopicManager};

/// Lifecycle of a [`TargetSyncer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncerState {
    /// No session is consuming: either no topics matched or the last
    /// session failed and waits for the topic set to change.
    Idle,
    /// A session is consuming these topics.
    Active(Vec<String>),
    /// The previous session is being stopped.
    Restarting,
    Stopped,
}

pub struct TargetSyncer {
    token: CancellationToken,
    tasks: Mutex<Option<Vec<JoinHandle<()>>>>,
    topic_manager: Arc<dyn TopicManager>,
    group: Arc<dyn ConsumerGroup>,
    handler: Arc<ClaimHandler>,
    state: Arc<watch::Sender<SyncerState>>,
}

impl TargetSyncer {
    /// Validates `config`, connects the Kafka clients and starts syncing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(mut config: ScrapeConfig, sink: Arc<dyn EntryHandler>) -> Result<Self> {
        let kafka = config.validate()?;
        let client_config = kafka.client_config()?;
        let topic_manager = KafkaTopicManager::new(&client_config, &kafka.topics)?;
        let group = KafkaConsumerGroup::new(
            &client_config,
            &kafka.group_id,
            kafka.parsed_assignor()?,
        );
        tracing::info!(
            "connecting to Kafka brokers {:?} as member {}",
            kafka.brokers,
            group.member_id()
        );
        Self::with_collaborators(config, sink, Arc::new(topic_manager), Arc::new(group))
    }

    /// Starts syncing with the given discovery service and consumer group.
    pub fn with_collaborators(
        mut config: ScrapeConfig,
        sink: Arc<dyn EntryHandler>,
        topic_manager: Arc<dyn TopicManager>,
        group: Arc<dyn ConsumerGroup>,
    ) -> Result<Self> {
        let poll_interval = config.validate()?.topic_poll_interval;
        let handler = Arc::new(ClaimHandler::new(TargetFactory::new(&config, sink)?));
        let token = CancellationToken::new();
        let (state, _) = watch::channel(SyncerState::Idle);
        let state = Arc::new(state);

        // Capacity one: the poller waits for the driver to pick up each change.
        let (changes_tx, changes_rx) = mpsc::channel(1);
        let poller = tokio::spawn(poll_topics(
            token.clone(),
            Arc::clone(&topic_manager),
            poll_interval,
            changes_tx,
        ));
        let driver = tokio::spawn(drive_sessions(
            token.clone(),
            changes_rx,
            Consumer::new(Arc::clone(&group), Arc::clone(&handler), Arc::clone(&state)),
            Arc::clone(&state),
        ));

        Ok(Self {
            token,
            tasks: Mutex::new(Some(vec![poller, driver])),
            topic_manager,
            group,
            handler,
            state,
        })
    }

    pub fn state(&self) -> SyncerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncerState> {
        self.state.subscribe()
    }

    /// Targets created for the claims of the current consume cycle.
    pub fn active_targets(&self) -> Vec<TargetInfo> {
        self.handler.active_targets()
    }

    /// Claims whose labels were all removed by relabeling.
    pub fn dropped_targets(&self) -> Vec<TargetInfo> {
        self.handler.dropped_targets()
    }

    pub fn ready(&self) -> bool {
        !self.handler.active_targets().is_empty()
    }

    /// Stops polling and consuming, then closes the Kafka clients.
    ///
    /// Safe to call more than once; later calls wait for the first to finish.
    pub async fn stop(&self) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        let Some(handles) = tasks.take() else {
            return Ok(());
        };
        self.token.cancel();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("syncer task failed: {}", e);
            }
        }
        if let Err(e) = self.group.close().await {
            tracing::warn!("error while closing consumer group: {}", e);
        }
        if let Err(e) = self.topic_manager.close().await {
            tracing::warn!("error while closing Kafka client: {}", e);
        }
        self.handler.reset_targets();
        self.state.send_replace(SyncerState::Stopped);
        Ok(())
    }
}

/// Order-sensitive comparison of two topic sets.
pub(crate) fn topics_changed(previous: &[String], new: &[String]) -> bool {
    previous.len() != new.len() || previous.iter().zip(new).any(|(p, n)| p != n)
}

async fn poll_topics(
    token: CancellationToken,
    topic_manager: Arc<dyn TopicManager>,
    interval: Duration,
    changes: mpsc::Sender<Vec<String>>,
) {
    let mut previous_topics: Vec<String> = Vec::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let fetched = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            fetched = topic_manager.topics() => fetched,
        };
        let topics = match fetched {
            Ok(topics) => topics,
            Err(e) => {
                tracing::warn!("failed to fetch topics: {}", e);
                continue;
            }
        };
        if !topics_changed(&previous_topics, &topics) {
            continue;
        }
        previous_topics = topics.clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            sent = changes.send(topics) => if sent.is_err() { break },
        }
    }
    tracing::debug!("topic poller stopped");
}

async fn drive_sessions(
    token: CancellationToken,
    mut changes: mpsc::Receiver<Vec<String>>,
    mut consumer: Consumer,
    state: Arc<watch::Sender<SyncerState>>,
) {
    loop {
        let topics = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            topics = changes.recv() => match topics {
                Some(topics) => topics,
                None => break,
            },
        };
        tracing::info!("new topics received: {:?}", topics);
        state.send_replace(SyncerState::Restarting);
        consumer.stop().await;
        if topics.is_empty() {
            state.send_replace(SyncerState::Idle);
        } else {
            state.send_replace(SyncerState::Active(topics.clone()));
            consumer.start(&token, topics);
        }
    }
    consumer.stop().await;
    tracing::debug!("session driver stopped");
}
