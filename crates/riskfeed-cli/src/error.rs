//! Error types for the riskfeed CLI
//!
//! Wraps library errors with the process exit-code mapping. Exit codes
//! are grouped by failure family (see `riskfeed_common::exit`); success
//! is always 0, including empty result sets.

use riskfeed_common::ExitCode;
use riskfeed_ingest::IngestError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI-level error with an exit-code mapping.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Ingest(#[from] IngestError),

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// The process exit code this error terminates with.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Usage(_) => ExitCode::UsageError,
            CliError::Io(_) => ExitCode::Internal,
            CliError::Other(_) => ExitCode::Internal,
            CliError::Ingest(error) => ingest_exit_code(error),
        }
    }
}

/// Exit-code mapping for library errors.
pub fn ingest_exit_code(error: &IngestError) -> ExitCode {
    match error {
        IngestError::Config(message) => {
            if message.contains("not configured") || message.contains("missing") {
                ExitCode::ConfigMissing
            } else {
                ExitCode::ConfigInvalid
            }
        }
        IngestError::Transport(_) => ExitCode::NetworkError,
        IngestError::Unauthorized => ExitCode::ApiUnauthorized,
        IngestError::Forbidden => ExitCode::ApiForbidden,
        IngestError::NotFound(_) => ExitCode::ApiNotFound,
        IngestError::RateLimited { .. } => ExitCode::RateLimited,
        IngestError::UnexpectedResponse { .. } => ExitCode::ApiError,
        IngestError::Decode(_) | IngestError::Csv(_) => ExitCode::ApiError,
        IngestError::Database(inner) => match inner {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_) => ExitCode::DbConnectionFailed,
            _ => ExitCode::DbWriteFailed,
        },
        IngestError::Mapping { .. } => ExitCode::MappingFailed,
        IngestError::UnknownEndpoint(_)
        | IngestError::UnknownTable(_)
        | IngestError::CompanyGuidRequired(_)
        | IngestError::SinceUnsupported(_) => ExitCode::UsageError,
    }
}
