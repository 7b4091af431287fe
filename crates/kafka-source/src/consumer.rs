use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::group::{Claim, ConsumerGroup, GroupHandler, GroupSession};
use crate::syncer::SyncerState;
use crate::target::{RunnableTarget, TargetFactory, TargetInfo};

#[derive(Default)]
struct Targets {
    active: Vec<TargetInfo>,
    dropped: Vec<TargetInfo>,
}

/// Turns partition claims into targets and tracks them for status reporting.
pub(crate) struct ClaimHandler {
    factory: TargetFactory,
    targets: Mutex<Targets>,
}

impl ClaimHandler {
    pub(crate) fn new(factory: TargetFactory) -> Self {
        Self {
            factory,
            targets: Mutex::new(Targets::default()),
        }
    }

    fn targets(&self) -> MutexGuard<'_, Targets> {
        self.targets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn reset_targets(&self) {
        *self.targets() = Targets::default();
    }

    pub(crate) fn active_targets(&self) -> Vec<TargetInfo> {
        self.targets().active.clone()
    }

    pub(crate) fn dropped_targets(&self) -> Vec<TargetInfo> {
        self.targets().dropped.clone()
    }
}

#[async_trait]
impl GroupHandler for ClaimHandler {
    async fn setup(&self, _session: Arc<dyn GroupSession>) -> Result<()> {
        self.reset_targets();
        Ok(())
    }

    async fn cleanup(&self, _session: Arc<dyn GroupSession>) -> Result<()> {
        self.reset_targets();
        Ok(())
    }

    async fn consume_claim(&self, session: Arc<dyn GroupSession>, claim: Claim) -> Result<()> {
        let target = self.factory.new_target(session, claim)?;
        let info = target.info();
        if matches!(target, RunnableTarget::Dropped(_)) {
            self.targets().dropped.push(info);
        } else {
            tracing::info!(details = %info.details, "consuming topic");
            self.targets().active.push(info);
        }
        target.run().await
    }
}

struct Session {
    topics: Vec<String>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Starts and stops consume sessions. At most one session runs at a time.
pub(crate) struct Consumer {
    group: Arc<dyn ConsumerGroup>,
    handler: Arc<ClaimHandler>,
    state: Arc<watch::Sender<SyncerState>>,
    session: Option<Session>,
}

impl Consumer {
    pub(crate) fn new(
        group: Arc<dyn ConsumerGroup>,
        handler: Arc<ClaimHandler>,
        state: Arc<watch::Sender<SyncerState>>,
    ) -> Self {
        Self {
            group,
            handler,
            state,
            session: None,
        }
    }

    /// Starts consuming `topics` under a child of `parent`.
    ///
    /// Any running session must have been stopped first.
    pub(crate) fn start(&mut self, parent: &CancellationToken, topics: Vec<String>) {
        debug_assert!(self.session.is_none(), "a consume session is already running");
        let token = parent.child_token();
        let task = tokio::spawn(run_session(
            Arc::clone(&self.group),
            Arc::clone(&self.handler),
            Arc::clone(&self.state),
            token.clone(),
            topics.clone(),
        ));
        self.session = Some(Session {
            topics,
            token,
            task,
        });
    }

    /// Cancels the running session, if any, and waits for it to finish.
    pub(crate) async fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        session.token.cancel();
        if let Err(e) = session.task.await {
            tracing::warn!("consume session for {:?} failed: {}", session.topics, e);
        }
    }
}

async fn run_session(
    group: Arc<dyn ConsumerGroup>,
    handler: Arc<ClaimHandler>,
    state: Arc<watch::Sender<SyncerState>>,
    token: CancellationToken,
    topics: Vec<String>,
) {
    tracing::info!("starting consumer for topics {:?}", topics);
    while !token.is_cancelled() {
        let handler = Arc::clone(&handler) as Arc<dyn GroupHandler>;
        if let Err(e) = group.consume(&token, &topics, handler).await {
            tracing::error!(
                "error from the consumer, not retrying until the topic set changes: {}",
                e
            );
            state.send_if_modified(|current| match current {
                SyncerState::Active(active) if *active == topics => {
                    *current = SyncerState::Idle;
                    true
                }
                _ => false,
            });
            break;
        }
    }
    tracing::info!("stopping consumer for topics {:?}", topics);
}
