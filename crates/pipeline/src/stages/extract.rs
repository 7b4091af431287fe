use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{source_value, Extracted, Outcome, Stage};
use crate::entry::Entry;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegexConfig {
    /// Expression with named capture groups; each group becomes an extracted value.
    pub expression: String,
    /// Extracted key to match against instead of the line.
    #[serde(default)]
    pub source: Option<String>,
}

pub struct RegexStage {
    regex: Regex,
    source: Option<String>,
}

impl RegexStage {
    pub fn new(config: &RegexConfig) -> Result<Self> {
        let regex = Regex::new(&config.expression).map_err(|e| PipelineError::InvalidRegex {
            stage: "regex",
            source: e,
        })?;
        if regex.capture_names().flatten().next().is_none() {
            return Err(PipelineError::InvalidStage {
                stage: "regex",
                reason: "expression has no named capture groups".to_string(),
            });
        }
        Ok(Self {
            regex,
            source: config.source.clone(),
        })
    }

    fn captures(&self, input: &str) -> Vec<(String, String)> {
        let Some(captures) = self.regex.captures(input) else {
            tracing::trace!("regex stage: no match");
            return Vec::new();
        };
        self.regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                captures
                    .name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect()
    }
}

impl Stage for RegexStage {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn process(&self, entry: &mut Entry, extracted: &mut Extracted) -> Outcome {
        let values = match source_value(self.source.as_deref(), entry, extracted) {
            Some(input) => self.captures(input),
            None => return Outcome::Keep,
        };
        extracted.extend(values);
        Outcome::Keep
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonConfig {
    /// Extracted name to dotted path (`log.level`); a missing path means "same as the name".
    pub expressions: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub source: Option<String>,
}

pub struct JsonStage {
    expressions: Vec<(String, Vec<String>)>,
    source: Option<String>,
}

impl JsonStage {
    pub fn new(config: &JsonConfig) -> Result<Self> {
        if config.expressions.is_empty() {
            return Err(PipelineError::InvalidStage {
                stage: "json",
                reason: "no expressions given".to_string(),
            });
        }
        let expressions = config
            .expressions
            .iter()
            .map(|(name, path)| {
                let path = path.as_deref().filter(|p| !p.is_empty()).unwrap_or(name.as_str());
                (name.clone(), path.split('.').map(str::to_string).collect())
            })
            .collect();
        Ok(Self {
            expressions,
            source: config.source.clone(),
        })
    }
}

fn lookup<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

impl Stage for JsonStage {
    fn name(&self) -> &'static str {
        "json"
    }

    fn process(&self, entry: &mut Entry, extracted: &mut Extracted) -> Outcome {
        let Some(input) = source_value(self.source.as_deref(), entry, extracted) else {
            return Outcome::Keep;
        };
        let document: Value = match serde_json::from_str(input) {
            Ok(document) => document,
            Err(e) => {
                tracing::debug!("json stage: input is not valid JSON: {}", e);
                return Outcome::Keep;
            }
        };
        let values: Vec<(String, String)> = self
            .expressions
            .iter()
            .filter_map(|(name, path)| {
                lookup(&document, path).map(|found| {
                    let value = match found {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (name.clone(), value)
                })
            })
            .collect();
        extracted.extend(values);
        Outcome::Keep
    }
}
