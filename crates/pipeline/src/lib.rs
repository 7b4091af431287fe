//! Entry processing pipeline for kafka-tail.
//!
//! Records consumed from Kafka become [`Entry`] values. Before an entry reaches
//! its final [`EntryHandler`] it runs through a [`Pipeline`] built from the
//! configured stages, which may extract values from the line, rewrite labels,
//! replace the line, or drop the entry entirely.
//!
//! ```rust
//! use pipeline::{Pipeline, StageConfig};
//!
//! let yaml = r#"
//! - regex:
//!     expression: "level=(?P<level>\\w+)"
//! - labels:
//!     level:
//! "#;
//! let stages: Vec<StageConfig> = serde_yaml::with::singleton_map_recursive::deserialize(
//!     serde_yaml::Deserializer::from_str(yaml),
//! )
//! .unwrap();
//! let pipeline = Pipeline::new(&stages, Some("kafka")).unwrap();
//! assert_eq!(pipeline.len(), 2);
//! ```

mod entry;
mod error;
mod handler;
mod pipeline;
pub mod stages;

pub use entry::Entry;
pub use error::{PipelineError, Result};
pub use handler::EntryHandler;
pub use pipeline::Pipeline;
pub use stages::{Extracted, Outcome, Stage, StageConfig};
