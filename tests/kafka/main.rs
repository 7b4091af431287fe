//! Kafka end-to-end tests
//!
//! These need a broker at `KAFKA_BROKER` (default `kafka:9092`) and are
//! ignored by default:
//!
//! ```bash
//! cargo test --test kafka -- --ignored
//! ```

mod tail_topics;
