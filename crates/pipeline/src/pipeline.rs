use std::sync::Arc;

use async_trait::async_trait;

use crate::entry::Entry;
use crate::error::Result;
use crate::handler::EntryHandler;
use crate::stages::{Extracted, Outcome, Stage, StageConfig};

/// An ordered list of stages applied to every entry.
pub struct Pipeline {
    job_name: Option<String>,
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Builds the stages described by `configs`.
    ///
    /// Fails on the first invalid stage configuration.
    pub fn new(configs: &[StageConfig], job_name: Option<&str>) -> Result<Self> {
        let stages = configs
            .iter()
            .map(StageConfig::build)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            job_name: job_name.map(str::to_string),
            stages,
        })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs `entry` through every stage. `None` means a stage dropped it.
    pub fn process(&self, mut entry: Entry) -> Option<Entry> {
        let mut extracted = Extracted::new();
        for stage in &self.stages {
            if stage.process(&mut entry, &mut extracted) == Outcome::Drop {
                tracing::debug!(
                    job = self.job_name.as_deref().unwrap_or_default(),
                    "entry dropped by {} stage",
                    stage.name()
                );
                return None;
            }
        }
        Some(entry)
    }

    /// Returns a handler that processes entries before passing them to `next`.
    pub fn wrap(self, next: Arc<dyn EntryHandler>) -> Arc<dyn EntryHandler> {
        Arc::new(PipelineHandler {
            pipeline: self,
            next,
        })
    }
}

struct PipelineHandler {
    pipeline: Pipeline,
    next: Arc<dyn EntryHandler>,
}

#[async_trait]
impl EntryHandler for PipelineHandler {
    async fn handle(&self, entry: Entry) -> Result<()> {
        match self.pipeline.process(entry) {
            Some(entry) => self.next.handle(entry).await,
            None => Ok(()),
        }
    }
}
