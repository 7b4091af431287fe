use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{source_value, Extracted, Outcome, Stage};
use crate::entry::Entry;
use crate::error::{PipelineError, Result};

/// Drops entries matching every configured condition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropConfig {
    #[serde(default)]
    pub source: Option<String>,
    /// Drop when the source (or line) matches.
    #[serde(default)]
    pub expression: Option<String>,
    /// Drop when the line is longer than this many bytes.
    #[serde(default)]
    pub longer_than: Option<usize>,
}

pub struct DropStage {
    source: Option<String>,
    expression: Option<Regex>,
    longer_than: Option<usize>,
}

impl DropStage {
    pub fn new(config: &DropConfig) -> Result<Self> {
        if config.expression.is_none() && config.longer_than.is_none() {
            return Err(PipelineError::InvalidStage {
                stage: "drop",
                reason: "one of expression or longer_than is required".to_string(),
            });
        }
        let expression = config
            .expression
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| PipelineError::InvalidRegex {
                stage: "drop",
                source: e,
            })?;
        Ok(Self {
            source: config.source.clone(),
            expression,
            longer_than: config.longer_than,
        })
    }
}

impl Stage for DropStage {
    fn name(&self) -> &'static str {
        "drop"
    }

    fn process(&self, entry: &mut Entry, extracted: &mut Extracted) -> Outcome {
        if let Some(limit) = self.longer_than {
            if entry.line.len() <= limit {
                return Outcome::Keep;
            }
        }
        if let Some(regex) = &self.expression {
            match source_value(self.source.as_deref(), entry, extracted) {
                Some(input) if regex.is_match(input) => {}
                _ => return Outcome::Keep,
            }
        }
        Outcome::Drop
    }
}
