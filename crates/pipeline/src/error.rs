use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid {stage} stage: {reason}")]
    InvalidStage { stage: &'static str, reason: String },

    #[error("Invalid regex in {stage} stage: {source}")]
    InvalidRegex {
        stage: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("Entry sink is closed")]
    SinkClosed,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
