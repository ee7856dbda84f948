//! Riskfeed Common Library
//!
//! Shared building blocks for the riskfeed workspace:
//!
//! - **Logging**: tracing subscriber setup (console/file, text/json)
//! - **Exit Codes**: deterministic process exit codes grouped by failure family

pub mod exit;
pub mod logging;

// Re-export commonly used types
pub use exit::ExitCode;
