use serde::Serialize;
use thiserror::Error;

/// Unified error type for issuebench.
///
/// Module errors convert into this enum at the CLI boundary. It serializes
/// to tagged JSON so failures can be logged or reported in a structured
/// form.
#[derive(Error, Debug, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unparsable verdict: {message}")]
    VerdictParse { message: String },

    #[error("Rate limited: {message}")]
    RateLimit { message: String },

    #[error("LLM error: {message}")]
    Llm { message: String },

    #[error("Corrupt ledger entry: {message}")]
    LedgerCorruption { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("IO error: {message}")]
    Io { message: String },

    #[error("Parse error: {message}")]
    Parse { message: String },
}

impl AppError {
    /// Create a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a VerdictParse error
    pub fn verdict_parse(message: impl Into<String>) -> Self {
        Self::VerdictParse {
            message: message.into(),
        }
    }

    /// Create a RateLimit error
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
        }
    }

    /// Create an Llm error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    /// Create a LedgerCorruption error
    pub fn ledger_corruption(message: impl Into<String>) -> Self {
        Self::LedgerCorruption {
            message: message.into(),
        }
    }

    /// Create a Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a Parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Whether the run can go on past this error (retry, skip or record
    /// as unresolved) instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::VerdictParse { .. }
            | Self::RateLimit { .. }
            | Self::Llm { .. }
            | Self::LedgerCorruption { .. }
            | Self::Io { .. } => true,
            // Fixed only by changing flags, files or credentials
            Self::Config { .. } | Self::Storage { .. } | Self::Parse { .. } => false,
        }
    }

    /// Process exit code for an error that ends the run.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 1,
            _ => 2,
        }
    }
}

// Convert from ConfigError
impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::config(err.to_string())
    }
}

// Convert from RuleError
impl From<crate::rules::RuleError> for AppError {
    fn from(err: crate::rules::RuleError) -> Self {
        AppError::config(err.to_string())
    }
}

// Convert from JudgeError
impl From<crate::ai::JudgeError> for AppError {
    fn from(err: crate::ai::JudgeError) -> Self {
        use crate::ai::JudgeError;
        match err {
            JudgeError::RateLimited { .. } => AppError::rate_limit(err.to_string()),
            JudgeError::ClaudeNotFound => AppError::config(err.to_string()),
            other => AppError::llm(other.to_string()),
        }
    }
}

// Convert from VerdictError
impl From<crate::verdict::VerdictError> for AppError {
    fn from(err: crate::verdict::VerdictError) -> Self {
        use crate::verdict::VerdictError;
        match err {
            VerdictError::Parse(msg) => AppError::verdict_parse(msg),
            VerdictError::Judge(e) => e.into(),
            VerdictError::Exhausted { .. } => AppError::llm(err.to_string()),
        }
    }
}

// Convert from LedgerError
impl From<crate::ledger::LedgerError> for AppError {
    fn from(err: crate::ledger::LedgerError) -> Self {
        use crate::ledger::LedgerError;
        match err {
            LedgerError::Corrupt { .. } => AppError::ledger_corruption(err.to_string()),
            LedgerError::Io(e) => AppError::storage(format!("Ledger IO: {e}")),
            LedgerError::Json(e) => AppError::storage(format!("Ledger JSON: {e}")),
        }
    }
}

// Convert from ReportError
impl From<crate::report::ReportError> for AppError {
    fn from(err: crate::report::ReportError) -> Self {
        use crate::report::ReportError;
        match err {
            ReportError::Io(e) => AppError::storage(format!("Report IO: {e}")),
            ReportError::Json(e) => AppError::parse(format!("Report JSON: {e}")),
            ReportError::Invalid(msg) => AppError::parse(msg),
        }
    }
}

// Convert from SourceError
impl From<crate::sources::SourceError> for AppError {
    fn from(err: crate::sources::SourceError) -> Self {
        use crate::sources::SourceError;
        match err {
            SourceError::MissingInput(_) => AppError::config(err.to_string()),
            SourceError::Io { .. } => AppError::io(err.to_string()),
            SourceError::Json { .. } => AppError::parse(err.to_string()),
        }
    }
}

// Convert from std::io::Error
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::JudgeError;
    use crate::verdict::VerdictError;
    use std::path::PathBuf;

    #[test]
    fn test_error_serialization() {
        let err = AppError::config("missing API key");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"Config\""));
        assert!(json.contains("\"message\":\"missing API key\""));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(AppError::rate_limit("slow down").is_recoverable());
        assert!(AppError::verdict_parse("garbage").is_recoverable());
        assert!(AppError::ledger_corruption("line 3").is_recoverable());
        assert!(!AppError::config("no input").is_recoverable());
    }

    #[test]
    fn test_module_errors_map_to_taxonomy() {
        let rate: AppError = VerdictError::Judge(JudgeError::RateLimited { retry_after: None }).into();
        assert!(matches!(rate, AppError::RateLimit { .. }));

        let parse: AppError = VerdictError::Parse("nope".to_owned()).into();
        assert!(matches!(parse, AppError::VerdictParse { .. }));

        let missing: AppError = crate::sources::SourceError::MissingInput(PathBuf::from("x")).into();
        assert!(matches!(missing, AppError::Config { .. }));
        assert_eq!(missing.exit_code(), 1);

        let corrupt: AppError = crate::ledger::LedgerError::Corrupt {
            line: 3,
            message: "eof".to_owned(),
        }
        .into();
        assert!(matches!(corrupt, AppError::LedgerCorruption { .. }));
    }
}
