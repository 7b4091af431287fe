use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RelabelError, Result};
use crate::process::is_valid_label_name;

/// What a relabeling rule does with the labels it matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Write the expanded `replacement` into `target_label`.
    #[default]
    Replace,
    /// Drop the whole label set unless the source value matches.
    Keep,
    /// Drop the whole label set if the source value matches.
    Drop,
    /// Write `hash(source value) % modulus` into `target_label`.
    HashMod,
    /// Copy every label whose name matches, renamed via `replacement`.
    LabelMap,
    /// Remove every label whose name matches.
    LabelDrop,
    /// Remove every label whose name does not match.
    LabelKeep,
    Lowercase,
    Uppercase,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Replace => "replace",
            Action::Keep => "keep",
            Action::Drop => "drop",
            Action::HashMod => "hashmod",
            Action::LabelMap => "labelmap",
            Action::LabelDrop => "labeldrop",
            Action::LabelKeep => "labelkeep",
            Action::Lowercase => "lowercase",
            Action::Uppercase => "uppercase",
        };
        f.write_str(name)
    }
}

/// A regular expression that must match the whole input.
///
/// Keeps the expression as written so configs serialize back unchanged.
#[derive(Clone)]
pub struct AnchoredRegex {
    source: String,
    regex: Regex,
}

impl AnchoredRegex {
    pub fn new(source: &str) -> Result<Self> {
        let regex =
            Regex::new(&format!("^(?:{source})$")).map_err(|e| RelabelError::InvalidRegex {
                regex: source.to_string(),
                source: e,
            })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl Default for AnchoredRegex {
    fn default() -> Self {
        Self {
            source: "(.*)".to_string(),
            regex: Regex::new("^(?:(.*))$").expect("default relabel regex is valid"),
        }
    }
}

impl fmt::Debug for AnchoredRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.source)
    }
}

impl TryFrom<String> for AnchoredRegex {
    type Error = RelabelError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<AnchoredRegex> for String {
    fn from(value: AnchoredRegex) -> Self {
        value.source
    }
}

impl Serialize for AnchoredRegex {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for AnchoredRegex {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        AnchoredRegex::new(&source).map_err(serde::de::Error::custom)
    }
}

fn default_separator() -> String {
    ";".to_string()
}

fn default_replacement() -> String {
    "$1".to_string()
}

/// A single relabeling rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelabelConfig {
    /// Labels whose values are joined with `separator` to form the source value.
    #[serde(default)]
    pub source_labels: Vec<String>,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub target_label: Option<String>,
    #[serde(default)]
    pub regex: AnchoredRegex,
    #[serde(default)]
    pub modulus: u64,
    #[serde(default = "default_replacement")]
    pub replacement: String,
    #[serde(default)]
    pub action: Action,
}

impl Default for RelabelConfig {
    fn default() -> Self {
        Self {
            source_labels: Vec::new(),
            separator: default_separator(),
            target_label: None,
            regex: AnchoredRegex::default(),
            modulus: 0,
            replacement: default_replacement(),
            action: Action::default(),
        }
    }
}

impl RelabelConfig {
    /// Checks the field combinations each action needs.
    pub fn validate(&self) -> Result<()> {
        match self.action {
            Action::Replace | Action::HashMod | Action::Lowercase | Action::Uppercase => {
                let target = self
                    .target_label
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| RelabelError::MissingTargetLabel(self.action.to_string()))?;
                // Replace may reference capture groups in the target name.
                if self.action != Action::Replace && !is_valid_label_name(target) {
                    return Err(RelabelError::InvalidTargetLabel(target.to_string()));
                }
            }
            Action::LabelDrop | Action::LabelKeep => {
                if !self.source_labels.is_empty() || self.target_label.is_some() {
                    return Err(RelabelError::UnexpectedField(self.action.to_string()));
                }
            }
            Action::Keep | Action::Drop | Action::LabelMap => {}
        }
        if self.action == Action::HashMod && self.modulus == 0 {
            return Err(RelabelError::ZeroModulus);
        }
        Ok(())
    }
}
