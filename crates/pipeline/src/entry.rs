use chrono::{DateTime, Utc};
use relabel::LabelSet;
use serde::{Deserialize, Serialize};

/// A single log line with its labels and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub labels: LabelSet,
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

impl Entry {
    pub fn new(labels: LabelSet, timestamp: DateTime<Utc>, line: impl Into<String>) -> Self {
        Self {
            labels,
            timestamp,
            line: line.into(),
        }
    }
}
