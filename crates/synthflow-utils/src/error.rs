use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::{StageId, StageStatus};

/// Library-level error type for synthflow.
///
/// `SynthError` groups the failures of every layer in the workspace:
///
/// | Category | Description |
/// |----------|-------------|
/// | `Config` | Configuration file, environment or CLI argument errors |
/// | `Gateway` | Outbound calls to the external analysis service |
/// | `Store` | Session persistence |
/// | `Control` | Rejected client operations (word limits, stage preconditions) |
///
/// Stage execution is asynchronous, so gateway and validation failures are
/// normally persisted onto the stage record rather than returned. This type
/// surfaces at the edges: startup, CLI commands and synchronous API checks.
#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Control(#[from] ControlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Gateway,
    Validation,
    Storage,
    StateMachine,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Gateway => write!(f, "Gateway"),
            Self::Validation => write!(f, "Validation"),
            Self::Storage => write!(f, "Storage"),
            Self::StateMachine => write!(f, "State Machine"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files must be valid TOML with [server], [storage], [gateway] and [pipeline] sections."
                    .to_string(),
            ),
            Self::InvalidValue { key, .. } => Some(format!(
                "The '{key}' configuration option has specific format requirements."
            )),
            Self::NotFound { .. } => Some(
                "synthflow reads ./synthflow.toml or the file named by SYNTHFLOW_CONFIG."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax using a TOML validator".to_string(),
                "Remove unknown sections and retry".to_string(),
            ],
            Self::InvalidValue { key, .. } => match key.as_str() {
                k if k.starts_with("gateway.timeouts") => {
                    vec!["Use a timeout between 5 and 7200 seconds".to_string()]
                }
                "server.bind" => vec!["Use a socket address such as 127.0.0.1:8080".to_string()],
                _ => vec!["Use a positive value".to_string()],
            },
            Self::NotFound { path } => vec![
                format!("Create {path} or unset SYNTHFLOW_CONFIG"),
                "Run without --config to use built-in defaults".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Errors from outbound calls to the external analysis service.
///
/// Every variant renders as a human-readable sentence, because the text is
/// stored verbatim on the failed stage record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The call did not finish within its per-stage timeout.
    #[error("{call} request timed out after {duration:?}")]
    Timeout { call: String, duration: Duration },

    /// The connection dropped mid-request.
    #[error("{call}: connection interrupted - workflow may still be processing")]
    ConnectionReset { call: String },

    /// The service answered with a non-2xx status.
    #[error("{call} failed with status {status}: {body}")]
    HttpStatus {
        call: String,
        status: u16,
        body: String,
    },

    /// The request was sent but nothing usable came back.
    #[error("{call}: no response received")]
    NoResponse { call: String },

    /// Endpoint missing or client could not be built. Never retried.
    #[error("{0}")]
    Misconfiguration(String),

    /// The response arrived but its shape was not recognized.
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl GatewayError {
    /// Misconfiguration fails the triggering call immediately.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Misconfiguration(_))
    }
}

impl UserFriendlyError for GatewayError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Timeout { .. } | Self::ConnectionReset { .. } => Some(
                "The external workflow may still finish on its side; retry the stage to collect a result."
                    .to_string(),
            ),
            Self::HttpStatus { .. } | Self::NoResponse { .. } => {
                Some("The external analysis service rejected or dropped the call.".to_string())
            }
            Self::Misconfiguration(_) => Some(
                "Each stage call needs an endpoint in [gateway.endpoints] or a SYNTHFLOW_*_URL variable."
                    .to_string(),
            ),
            Self::Validation(_) => Some(
                "The service answered, but the body did not contain a recognizable result."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Misconfiguration(_) => vec![
                "Set the missing endpoint and restart the server".to_string(),
                "Run 'synthflow probe' to check every endpoint".to_string(),
            ],
            _ => vec!["Retry the stage from the client".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Misconfiguration(_) => ErrorCategory::Configuration,
            Self::Validation(_) => ErrorCategory::Validation,
            _ => ErrorCategory::Gateway,
        }
    }
}

/// Session persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Research session not found: {id}")]
    NotFound { id: String },

    #[error("Research session already exists: {id}")]
    AlreadyExists { id: String },

    #[error("Failed to persist session {id}: {reason}")]
    Io { id: String, reason: String },

    #[error("Stored session at {path} is unreadable: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Client operations rejected by the engine.
///
/// These map one-to-one onto 4xx responses in the control API.
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Research session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Problem statement must be at least {min} words. Current word count: {count}")]
    InputTooShort { count: usize, min: usize },

    #[error("Expected outcome must be {max} words or fewer. Current word count: {count}")]
    OutcomeTooLong { count: usize, max: usize },

    #[error("Expected outcome must not be empty")]
    OutcomeEmpty,

    #[error("{stage} cannot be started. Previous stage not completed.")]
    PredecessorIncomplete { stage: StageId },

    #[error("{stage} is not currently processing (status: {status})")]
    NotProcessing { stage: StageId, status: StageStatus },

    #[error("{stage} is already processing; stop it or wait for the result")]
    AlreadyProcessing { stage: StageId },

    #[error("Stage 5 must be completed before submitting expected outcome")]
    OutcomeGateClosed,

    #[error("No expected outcome is stored; submit one before retrying Stage 6")]
    OutcomeMissing,

    #[error("Stage 6 must be completed before generating report")]
    ReportUnavailable,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => Self::SessionNotFound { id },
            other => Self::Store(other),
        }
    }
}

impl UserFriendlyError for ControlError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::PredecessorIncomplete { .. } => {
                Some("Stages run strictly in order from 1 to 6.".to_string())
            }
            Self::NotProcessing { .. } => {
                Some("Only a stage that is currently processing can be stopped.".to_string())
            }
            Self::OutcomeGateClosed | Self::OutcomeMissing => Some(
                "Stage 6 needs the literature synthesis and an expected outcome.".to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InputTooShort { min, .. } => {
                vec![format!("Describe the problem in at least {min} words")]
            }
            Self::OutcomeTooLong { max, .. } => vec![format!("Shorten the outcome to {max} words")],
            Self::PredecessorIncomplete { .. } => {
                vec!["Retry the previous stage first".to_string()]
            }
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Store(_) => ErrorCategory::Storage,
            Self::InputTooShort { .. } | Self::OutcomeTooLong { .. } | Self::OutcomeEmpty => {
                ErrorCategory::Validation
            }
            _ => ErrorCategory::StateMachine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_too_short_message() {
        let err = ControlError::InputTooShort { count: 29, min: 30 };
        assert_eq!(
            err.to_string(),
            "Problem statement must be at least 30 words. Current word count: 29"
        );
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_not_processing_names_status() {
        let err = ControlError::NotProcessing {
            stage: StageId::GapFinder,
            status: StageStatus::Completed,
        };
        assert_eq!(
            err.to_string(),
            "Stage 4 is not currently processing (status: completed)"
        );
    }

    #[test]
    fn test_already_processing_names_stage() {
        let err = ControlError::AlreadyProcessing {
            stage: StageId::Solution,
        };
        assert_eq!(
            err.to_string(),
            "Stage 6 is already processing; stop it or wait for the result"
        );
        assert_eq!(err.category(), ErrorCategory::StateMachine);
    }

    #[test]
    fn test_store_not_found_maps_to_session_not_found() {
        let err: ControlError = StoreError::NotFound {
            id: "abc".to_string(),
        }
        .into();
        assert!(matches!(err, ControlError::SessionNotFound { ref id } if id == "abc"));
    }

    #[test]
    fn test_gateway_error_fatality() {
        assert!(GatewayError::Misconfiguration("x".to_string()).is_fatal());
        assert!(
            !GatewayError::NoResponse {
                call: "Stage 1 refinement".to_string()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_gateway_error_messages_are_human_readable() {
        let err = GatewayError::HttpStatus {
            call: "Stage 4 gap finder".to_string(),
            status: 502,
            body: "Bad Gateway".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Stage 4 gap finder failed with status 502: Bad Gateway"
        );
        assert!(
            GatewayError::Validation("empty array".to_string())
                .to_string()
                .starts_with("Validation failed:")
        );
    }

    #[test]
    fn test_synth_error_from_config() {
        let err: SynthError = ConfigError::InvalidValue {
            key: "server.bind".to_string(),
            value: "nope".to_string(),
        }
        .into();
        assert!(err.to_string().starts_with("Configuration error:"));
    }
}
