//! Core error types.

use thiserror::Error;

use crate::connector::ConnectorError;
use crate::migration::MigrationError;
use crate::schema::AnalysisError;

/// Top-level engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Connector error outside of analysis or execution.
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Schema analysis failed.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// Planning, execution, or rollback failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Error::Deserialization(err.to_string())
        } else {
            Error::Serialization(err.to_string())
        }
    }
}
