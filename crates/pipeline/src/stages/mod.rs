//! Pipeline stages.
//!
//! Each stage sees the entry being processed plus the values extracted by
//! earlier stages. Extraction stages (`regex`, `json`) only fill the extracted
//! map; `labels` and `output` move extracted values onto the entry.

mod drop;
mod extract;
mod labels;
mod output;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::error::Result;

pub use drop::{DropConfig, DropStage};
pub use extract::{JsonConfig, JsonStage, RegexConfig, RegexStage};
pub use labels::{LabelAllowStage, LabelDropStage, LabelsStage, StaticLabelsStage};
pub use output::{OutputConfig, OutputStage};

/// Values extracted from the current entry, keyed by name.
pub type Extracted = HashMap<String, String>;

/// Whether an entry continues down the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Keep,
    Drop,
}

pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(&self, entry: &mut Entry, extracted: &mut Extracted) -> Outcome;
}

/// Stage configuration as written in the scrape config.
///
/// ```yaml
/// pipeline_stages:
///   - json:
///       expressions:
///         level: log.level
///   - labels:
///       level:
///   - static_labels:
///       source: kafka
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageConfig {
    StaticLabels(BTreeMap<String, String>),
    #[serde(rename = "labeldrop")]
    LabelDrop(Vec<String>),
    #[serde(rename = "labelallow")]
    LabelAllow(Vec<String>),
    /// Label name to extracted key; a missing key means "same as the label".
    Labels(BTreeMap<String, Option<String>>),
    Regex(RegexConfig),
    Json(JsonConfig),
    Output(OutputConfig),
    Drop(DropConfig),
}

impl StageConfig {
    pub fn build(&self) -> Result<Box<dyn Stage>> {
        let stage: Box<dyn Stage> = match self {
            StageConfig::StaticLabels(labels) => Box::new(StaticLabelsStage::new(labels)?),
            StageConfig::LabelDrop(names) => Box::new(LabelDropStage::new(names)?),
            StageConfig::LabelAllow(names) => Box::new(LabelAllowStage::new(names)?),
            StageConfig::Labels(mapping) => Box::new(LabelsStage::new(mapping)?),
            StageConfig::Regex(config) => Box::new(RegexStage::new(config)?),
            StageConfig::Json(config) => Box::new(JsonStage::new(config)?),
            StageConfig::Output(config) => Box::new(OutputStage::new(config)?),
            StageConfig::Drop(config) => Box::new(DropStage::new(config)?),
        };
        Ok(stage)
    }
}

/// Picks the input of an extraction stage: an extracted value or the line.
fn source_value<'a>(
    source: Option<&str>,
    entry: &'a Entry,
    extracted: &'a Extracted,
) -> Option<&'a str> {
    match source {
        Some(key) => extracted.get(key).map(String::as_str),
        None => Some(entry.line.as_str()),
    }
}
