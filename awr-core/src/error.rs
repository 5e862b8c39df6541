//! Errors in the library.
use std::time::Duration;
use thiserror::Error;

/// Errors in the library.
///
/// Fallible functions return [`anyhow::Result`]; the kinds below are wrapped in it and
/// can be recovered with `err.downcast_ref::<AwrError>()`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AwrError {
    /// Invalid configuration or malformed batch. Raised before any parameter update.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Non-finite values in returns, advantages or losses.
    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    /// The environment failed or its worker went away.
    #[error("Environment error: {0}")]
    Env(String),

    /// The environment did not answer in time.
    #[error("Environment did not respond within {0:?}")]
    EnvTimeout(Duration),

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKey(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueType(String),
}

impl AwrError {
    /// Returns `true` if the training pass can be skipped and training can go on.
    pub fn is_numeric_degeneracy(&self) -> bool {
        matches!(self, Self::NumericDegeneracy(_))
    }

    /// Returns `true` if the error came from the environment collaborator.
    pub fn is_env_failure(&self) -> bool {
        matches!(self, Self::Env(_) | Self::EnvTimeout(_))
    }
}

/// Returns the [`AwrError`] wrapped in an [`anyhow::Error`], if any.
pub fn kind(err: &anyhow::Error) -> Option<&AwrError> {
    err.downcast_ref::<AwrError>()
}
