use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unrecognized consumer group partition assignor: {0}")]
    UnsupportedAssignor(String),

    #[error("unsupported sasl mechanism: {0}")]
    UnsupportedSaslMechanism(String),

    #[error("unsupported authentication type: {0}")]
    UnsupportedAuthentication(String),

    #[error("invalid Kafka version '{0}'")]
    InvalidVersion(String),

    #[error("invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("Relabel error: {0}")]
    Relabel(#[from] relabel::RelabelError),

    #[error("Consumer group error: {0}")]
    Group(String),

    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
