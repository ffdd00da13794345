use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HelmError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Domain error: {0}")]
    DomainError(String),
    #[error("Domain mismatch: {0}")]
    DomainMismatch(String),
    #[error("Unsupported piece degree {0} (only 0 and 1 are evaluable)")]
    DegreeError(u32),
    #[error("Encoding error: {0}")]
    EncodingError(String),
    #[error("Behavior {behavior} failed: {reason}")]
    BehaviorError { behavior: String, reason: String },
    #[error("Nothing to decide: no objective functions")]
    NothingToDecide,
    #[error("Objective function universes out of sync: {0}")]
    UniverseMismatch(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl HelmError {
    pub fn behavior(behavior: &str, reason: impl Into<String>) -> Self {
        HelmError::BehaviorError {
            behavior: behavior.to_string(),
            reason: reason.into(),
        }
    }
}
