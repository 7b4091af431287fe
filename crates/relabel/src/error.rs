use thiserror::Error;

/// Errors raised while loading relabeling rules.
#[derive(Error, Debug)]
pub enum RelabelError {
    #[error("Invalid relabel regex '{regex}': {source}")]
    InvalidRegex {
        regex: String,
        #[source]
        source: regex::Error,
    },

    #[error("Relabel action '{0}' requires a target_label")]
    MissingTargetLabel(String),

    #[error("Invalid target_label '{0}'")]
    InvalidTargetLabel(String),

    #[error("Relabel action 'hashmod' requires a non-zero modulus")]
    ZeroModulus,

    #[error("Relabel action '{0}' does not accept source_labels or target_label")]
    UnexpectedField(String),
}

pub type Result<T> = std::result::Result<T, RelabelError>;
