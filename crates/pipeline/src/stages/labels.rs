use std::collections::{BTreeMap, HashSet};

use relabel::{is_valid_label_name, LabelSet};

use super::{Extracted, Outcome, Stage};
use crate::entry::Entry;
use crate::error::{PipelineError, Result};

fn check_names<'a>(stage: &'static str, names: impl IntoIterator<Item = &'a String>) -> Result<()> {
    for name in names {
        if !is_valid_label_name(name) {
            return Err(PipelineError::InvalidStage {
                stage,
                reason: format!("invalid label name '{name}'"),
            });
        }
    }
    Ok(())
}

fn check_not_empty(stage: &'static str, len: usize) -> Result<()> {
    if len == 0 {
        return Err(PipelineError::InvalidStage {
            stage,
            reason: "no labels given".to_string(),
        });
    }
    Ok(())
}

/// Adds fixed labels to every entry.
pub struct StaticLabelsStage {
    labels: LabelSet,
}

impl StaticLabelsStage {
    pub fn new(labels: &BTreeMap<String, String>) -> Result<Self> {
        check_not_empty("static_labels", labels.len())?;
        check_names("static_labels", labels.keys())?;
        Ok(Self {
            labels: LabelSet::from(labels.clone()),
        })
    }
}

impl Stage for StaticLabelsStage {
    fn name(&self) -> &'static str {
        "static_labels"
    }

    fn process(&self, entry: &mut Entry, _extracted: &mut Extracted) -> Outcome {
        entry.labels = entry.labels.merge(&self.labels);
        Outcome::Keep
    }
}

pub struct LabelDropStage {
    names: HashSet<String>,
}

impl LabelDropStage {
    pub fn new(names: &[String]) -> Result<Self> {
        check_not_empty("labeldrop", names.len())?;
        Ok(Self {
            names: names.iter().cloned().collect(),
        })
    }
}

impl Stage for LabelDropStage {
    fn name(&self) -> &'static str {
        "labeldrop"
    }

    fn process(&self, entry: &mut Entry, _extracted: &mut Extracted) -> Outcome {
        entry.labels.retain(|name, _| !self.names.contains(name));
        Outcome::Keep
    }
}

pub struct LabelAllowStage {
    names: HashSet<String>,
}

impl LabelAllowStage {
    pub fn new(names: &[String]) -> Result<Self> {
        check_not_empty("labelallow", names.len())?;
        Ok(Self {
            names: names.iter().cloned().collect(),
        })
    }
}

impl Stage for LabelAllowStage {
    fn name(&self) -> &'static str {
        "labelallow"
    }

    fn process(&self, entry: &mut Entry, _extracted: &mut Extracted) -> Outcome {
        entry.labels.retain(|name, _| self.names.contains(name));
        Outcome::Keep
    }
}

/// Promotes extracted values to labels.
pub struct LabelsStage {
    mapping: Vec<(String, String)>,
}

impl LabelsStage {
    pub fn new(mapping: &BTreeMap<String, Option<String>>) -> Result<Self> {
        check_not_empty("labels", mapping.len())?;
        check_names("labels", mapping.keys())?;
        let mapping = mapping
            .iter()
            .map(|(label, source)| {
                let source = source
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .unwrap_or(label.as_str())
                    .to_string();
                (label.clone(), source)
            })
            .collect();
        Ok(Self { mapping })
    }
}

impl Stage for LabelsStage {
    fn name(&self) -> &'static str {
        "labels"
    }

    fn process(&self, entry: &mut Entry, extracted: &mut Extracted) -> Outcome {
        for (label, source) in &self.mapping {
            match extracted.get(source) {
                Some(value) if !value.is_empty() => {
                    entry.labels.insert(label.clone(), value.clone());
                }
                _ => tracing::trace!("labels stage: no extracted value for '{}'", source),
            }
        }
        Outcome::Keep
    }
}
