//! Error types for the ERP intelligence router

use crate::engine::EngineError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("{stage} timed out after {}s", .after.as_secs_f32())]
    Timeout {
        stage: &'static str,
        after: Duration,
    },

    #[error("State error: {0}")]
    State(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse failure category reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Classification,
    Generation,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Classification => "classification_error",
            ErrorKind::Generation => "generation_error",
            ErrorKind::Timeout => "timeout_error",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl OrchestrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestrationError::Validation(_) => ErrorKind::Validation,
            OrchestrationError::Classification(_) => ErrorKind::Classification,
            OrchestrationError::Generation(_) => ErrorKind::Generation,
            OrchestrationError::Timeout { .. } => ErrorKind::Timeout,
            _ => ErrorKind::Internal,
        }
    }

    /// Sentence shown to the end user; never a bare opaque failure.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Validation => format!("Your request is invalid: {}", self.detail()),
            ErrorKind::Classification => format!(
                "We could not classify your request: {}",
                self.detail()
            ),
            ErrorKind::Generation => format!("We could not generate a reply: {}", self.detail()),
            ErrorKind::Timeout => format!("Your request timed out ({})", self),
            ErrorKind::Internal => format!("Internal error: {}", self),
        }
    }

    /// Engine failure during `stage`. Transport timeouts keep the timeout
    /// kind; everything else becomes the stage's own error.
    pub fn from_engine(stage: &'static str, budget: Duration, error: EngineError) -> Self {
        match (error, stage) {
            (EngineError::TimedOut(_), _) => OrchestrationError::Timeout {
                stage,
                after: budget,
            },
            (other, "classification") => OrchestrationError::Classification(other.to_string()),
            (other, _) => OrchestrationError::Generation(other.to_string()),
        }
    }

    fn detail(&self) -> String {
        match self {
            OrchestrationError::Validation(msg)
            | OrchestrationError::Classification(msg)
            | OrchestrationError::Generation(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_distinct() {
        let cases = vec![
            (OrchestrationError::Validation("empty".into()), "validation_error"),
            (OrchestrationError::Classification("bad label".into()), "classification_error"),
            (OrchestrationError::Generation("engine down".into()), "generation_error"),
            (
                OrchestrationError::Timeout {
                    stage: "classification",
                    after: Duration::from_secs(2),
                },
                "timeout_error",
            ),
            (OrchestrationError::Config("missing key".into()), "internal_error"),
        ];

        for (error, expected) in cases {
            assert_eq!(error.kind().as_str(), expected);
        }
    }

    #[test]
    fn test_user_messages() {
        let classify = OrchestrationError::Classification("bad label".into());
        assert!(classify.user_message().contains("could not classify"));

        let generate = OrchestrationError::Generation("engine down".into());
        assert!(generate.user_message().contains("could not generate a reply"));

        let timeout = OrchestrationError::Timeout {
            stage: "generation",
            after: Duration::from_secs(3),
        };
        assert!(timeout.user_message().contains("timed out"));
        assert!(timeout.to_string().starts_with("generation timed out"));
    }

    #[test]
    fn test_engine_errors_by_stage() {
        let budget = Duration::from_secs(30);

        let timed_out = OrchestrationError::from_engine(
            "classification",
            budget,
            EngineError::TimedOut("operation timed out".into()),
        );
        assert_eq!(timed_out.kind(), ErrorKind::Timeout);
        assert!(timed_out.to_string().starts_with("classification timed out"));

        let unreachable = OrchestrationError::from_engine(
            "classification",
            budget,
            EngineError::Unreachable("connection refused".into()),
        );
        assert_eq!(unreachable.kind(), ErrorKind::Classification);

        let api = OrchestrationError::from_engine(
            "generation",
            budget,
            EngineError::Api {
                status: 500,
                body: "boom".into(),
            },
        );
        assert_eq!(api.kind(), ErrorKind::Generation);

        let slow = OrchestrationError::from_engine(
            "generation",
            budget,
            EngineError::TimedOut("operation timed out".into()),
        );
        assert!(matches!(
            slow,
            OrchestrationError::Timeout {
                stage: "generation",
                ..
            }
        ));
    }
}
