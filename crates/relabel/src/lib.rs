//! Label sets and relabeling rules for kafka-tail.
//!
//! Every record forwarded by kafka-tail carries a [`LabelSet`]. Before a
//! partition claim starts producing records, the labels discovered for it
//! (topic, partition, consumer group, ...) are rewritten by a list of
//! [`RelabelConfig`] rules, following Prometheus relabeling semantics.
//!
//! # Example
//!
//! ```rust
//! use relabel::{process, LabelSet, RelabelConfig};
//!
//! let rules: Vec<RelabelConfig> = serde_yaml::from_str(
//!     r#"
//! - source_labels: [__meta_kafka_topic]
//!   target_label: topic
//! "#,
//! )
//! .unwrap();
//!
//! let labels = LabelSet::from_iter([("__meta_kafka_topic", "logs-a")]);
//! let out = process(&labels, &rules).unwrap();
//! assert_eq!(out.get("topic"), Some("logs-a"));
//! ```

mod config;
mod error;
mod labels;
mod process;


pub use config::{Action, AnchoredRegex, RelabelConfig};
pub use error::{RelabelError, Result};
pub use labels::{LabelSet, RESERVED_LABEL_PREFIX};
pub use process::{is_valid_label_name, process};
