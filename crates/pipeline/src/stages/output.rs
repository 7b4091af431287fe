use serde::{Deserialize, Serialize};

use super::{Extracted, Outcome, Stage};
use crate::entry::Entry;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub source: String,
}

/// Replaces the line with an extracted value.
pub struct OutputStage {
    source: String,
}

impl OutputStage {
    pub fn new(config: &OutputConfig) -> Result<Self> {
        if config.source.is_empty() {
            return Err(PipelineError::InvalidStage {
                stage: "output",
                reason: "source is required".to_string(),
            });
        }
        Ok(Self {
            source: config.source.clone(),
        })
    }
}

impl Stage for OutputStage {
    fn name(&self) -> &'static str {
        "output"
    }

    fn process(&self, entry: &mut Entry, extracted: &mut Extracted) -> Outcome {
        if let Some(value) = extracted.get(&self.source) {
            entry.line = value.clone();
        }
        Outcome::Keep
    }
}
