//! kafka-tail
//!
//! A log agent that tails Kafka topics matching a set of names or regular
//! expressions, labels every record and prints it as a JSON line.
//!
//! # CLI Usage
//!
//! ```bash
//! # Tail every topic matched by the config until Ctrl-C
//! kafka-tail run --config kafka-tail.yaml
//!
//! # Validate the config without touching the brokers
//! kafka-tail check --config kafka-tail.yaml
//!
//! # Print the topics the filters currently match
//! kafka-tail topics --config kafka-tail.yaml
//! ```

pub mod config;
pub mod sink;

pub use config::AgentConfig;
pub use sink::{spawn_json_lines_sink, write_json_line};
