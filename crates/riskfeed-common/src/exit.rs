//! Process exit codes
//!
//! Exit codes are deterministic, stable, and machine-consumable. They are
//! grouped by decade: 0 is the only success code, each nonzero family maps
//! to one failure category. Codes never change meaning and are not reused.

/// Process exit codes emitted exactly once at termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command completed successfully (including empty result sets).
    Success = 0,

    // 10-19: configuration
    /// Required configuration value missing (API key, database URL, ...).
    ConfigMissing = 10,
    /// Configuration present but invalid.
    ConfigInvalid = 11,

    // 20-29: CLI usage
    /// Invalid argument or argument combination.
    UsageError = 20,

    // 30-39: network / transport
    /// Connection, DNS, TLS, proxy, or timeout failure.
    NetworkError = 30,
    /// API rate limit exhausted after retries.
    RateLimited = 37,

    // 40-49: API semantics
    /// HTTP 401 from the ratings API.
    ApiUnauthorized = 40,
    /// HTTP 403 from the ratings API.
    ApiForbidden = 41,
    /// HTTP 404 endpoint or resource not found.
    ApiNotFound = 42,
    /// 5xx or otherwise unexpected API response.
    ApiError = 46,

    // 50-59: database
    /// Connection or authentication failure against the database.
    DbConnectionFailed = 50,
    /// Transaction, constraint, or write failure.
    DbWriteFailed = 53,
    /// Expected schema objects missing (run `db init`).
    DbSchemaMissing = 57,

    // 60-69: ingestion
    /// One or more ingestion runs reported failure.
    IngestFailed = 60,
    /// Record mapping aborted a strict-mode run.
    MappingFailed = 61,
    /// Flush operation failed.
    FlushFailed = 62,

    // 90-99: internal
    /// Unclassified internal failure.
    Internal = 99,

    /// Operator interrupt (SIGINT).
    Interrupted = 130,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_zero() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert!(ExitCode::Success.is_success());
    }

    #[test]
    fn test_failure_families() {
        assert_eq!(ExitCode::ConfigMissing.code(), 10);
        assert_eq!(ExitCode::NetworkError.code(), 30);
        assert_eq!(ExitCode::ApiUnauthorized.code(), 40);
        assert_eq!(ExitCode::DbConnectionFailed.code(), 50);
        assert_eq!(ExitCode::IngestFailed.code(), 60);
        assert!(!ExitCode::IngestFailed.is_success());
    }
}
