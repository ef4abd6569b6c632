use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Errors raised while building the graph or mutating the repository
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Invalid commit record {sha1:?}: {reason}")]
    InvalidCommit { sha1: String, reason: String },

    #[error("Invalid input: {input} - {reason}")]
    InvalidInput { input: String, reason: String },

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Unknown ref: {0}")]
    UnknownRef(String),

    #[error("Push of {remote_branch} to {remote} rejected: non-fast-forward")]
    NonFastForward { remote: String, remote_branch: String },

    #[error("Repository rejected {operation}: {reason}")]
    MutationRejected { operation: String, reason: String },

    #[error("Conflicts while running {operation} in {}", .paths.join(", "))]
    Conflict { operation: String, paths: Vec<String> },

    #[error("Git internal error: {0}")]
    Git2(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = GraphError> = std::result::Result<T, E>;

impl GraphError {
    /// Create an invalid input error
    pub fn invalid_input(input: impl Into<String>, reason: impl Into<String>) -> Self {
        let input = input.into();
        let reason = reason.into();
        warn!("Invalid input '{}': {}", input, reason);
        GraphError::InvalidInput { input, reason }
    }

    /// Create an invalid commit error
    pub fn invalid_commit(sha1: impl Into<String>, reason: impl Into<String>) -> Self {
        GraphError::InvalidCommit {
            sha1: sha1.into(),
            reason: reason.into(),
        }
    }

    /// Create a rejected mutation error
    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        let operation = operation.into();
        let reason = reason.into();
        error!("Operation '{}' rejected: {}", operation, reason);
        GraphError::MutationRejected { operation, reason }
    }

    /// Whether this error is a push rejection that a forced push may resolve
    pub fn is_non_fast_forward(&self) -> bool {
        matches!(self, GraphError::NonFastForward { .. })
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            GraphError::InvalidCommit { .. } => true,
            GraphError::InvalidInput { .. } => false,
            GraphError::UnknownNode(_) => true,
            GraphError::UnknownRef(_) => true,
            GraphError::NonFastForward { .. } => true,
            GraphError::MutationRejected { .. } => true,
            GraphError::Conflict { .. } => false,
            GraphError::Git2(_) => true,
            GraphError::Io(_) => true,
            GraphError::Serialization(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            GraphError::InvalidCommit { .. } => ErrorSeverity::Low,
            GraphError::InvalidInput { .. } => ErrorSeverity::Medium,
            GraphError::UnknownNode(_) => ErrorSeverity::Low,
            GraphError::UnknownRef(_) => ErrorSeverity::Low,
            GraphError::NonFastForward { .. } => ErrorSeverity::Low,
            GraphError::MutationRejected { .. } => ErrorSeverity::Medium,
            GraphError::Conflict { .. } => ErrorSeverity::High,
            GraphError::Git2(_) => ErrorSeverity::Medium,
            GraphError::Io(_) => ErrorSeverity::Medium,
            GraphError::Serialization(_) => ErrorSeverity::Low,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Input validation utilities
pub struct InputValidator;

fn forbidden_ref_sequence() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\.\.|@\{|//|/\.|\.lock$|\.$|/$|^/|^-|^\.)").expect("static ref-name pattern")
    })
}

impl InputValidator {
    /// Validate a short branch or tag name against git's ref naming rules
    pub fn validate_ref_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(GraphError::invalid_input(
                name,
                "Reference name cannot be empty",
            ));
        }

        if name.len() > 255 {
            return Err(GraphError::invalid_input(
                name,
                "Reference name too long (maximum 255 characters)",
            ));
        }

        let invalid_chars = [' ', '~', '^', ':', '?', '*', '[', '\\', '\x7f'];
        if let Some(ch) = name
            .chars()
            .find(|c| invalid_chars.contains(c) || c.is_control())
        {
            return Err(GraphError::invalid_input(
                name,
                format!("Reference name contains invalid character: {:?}", ch),
            ));
        }

        if name == "HEAD" || forbidden_ref_sequence().is_match(name) {
            return Err(GraphError::invalid_input(
                name,
                "Reference name violates Git naming rules",
            ));
        }

        Ok(())
    }
}

/// Centralized error logging
pub struct ErrorReporter;

impl ErrorReporter {
    /// Log error with appropriate level based on severity
    pub fn log_error(error: &GraphError, context: &str) {
        match error.severity() {
            ErrorSeverity::Critical => {
                error!("[CRITICAL] {}: {}", context, error);
            }
            ErrorSeverity::High => {
                error!("[HIGH] {}: {}", context, error);
            }
            ErrorSeverity::Medium => {
                warn!("[MEDIUM] {}: {}", context, error);
            }
            ErrorSeverity::Low => {
                debug!("[LOW] {}: {}", context, error);
            }
        }
    }

    /// Message suitable for showing to the user
    pub fn user_friendly_message(error: &GraphError) -> String {
        match error {
            GraphError::NonFastForward { remote_branch, .. } => {
                format!("The remote branch {} can't be fast-forwarded.", remote_branch)
            }
            GraphError::Conflict { operation, paths } => format!(
                "{} stopped with conflicts in {} file(s).",
                operation,
                paths.len()
            ),
            GraphError::InvalidInput { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_validation() {
        assert!(InputValidator::validate_ref_name("feature/branch").is_ok());
        assert!(InputValidator::validate_ref_name("hotfix-1.2").is_ok());
        assert!(InputValidator::validate_ref_name("../evil").is_err());
        assert!(InputValidator::validate_ref_name("has space").is_err());
        assert!(InputValidator::validate_ref_name("ends.lock").is_err());
        assert!(InputValidator::validate_ref_name("trailing/").is_err());
        assert!(InputValidator::validate_ref_name("-dash").is_err());
        assert!(InputValidator::validate_ref_name("HEAD").is_err());
    }

    #[test]
    fn test_error_properties() {
        let nff = GraphError::NonFastForward {
            remote: "origin".into(),
            remote_branch: "master".into(),
        };
        assert!(nff.is_non_fast_forward());
        assert!(nff.is_recoverable());
        assert_eq!(nff.severity(), ErrorSeverity::Low);

        let conflict = GraphError::Conflict {
            operation: "merge".into(),
            paths: vec!["a.txt".into()],
        };
        assert!(!conflict.is_recoverable());
        assert_eq!(conflict.severity(), ErrorSeverity::High);
        assert!(ErrorReporter::user_friendly_message(&conflict).contains("1 file"));
    }
}
