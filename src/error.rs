//! Error types for Appointment Desk.

use std::time::Duration;

/// Top-level error type for the service.
///
/// Each variant maps onto one class of the failure taxonomy the loop logs:
/// mailbox, calendar, agent, not-found (via [`MailboxError::NotFound`]) and
/// unexpected. Configuration errors are startup-only and stay [`ConfigError`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Calendar error: {0}")]
    Calendar(#[from] CalendarError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Short label for structured logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Mailbox(MailboxError::NotFound { .. }) => "not_found",
            Self::Mailbox(_) => "mailbox_unavailable",
            Self::Calendar(_) => "calendar_unavailable",
            Self::Agent(_) => "agent_error",
            Self::Unexpected(_) => "unexpected",
        }
    }

    /// Build the error reported when an external call exceeds its deadline.
    pub fn timed_out(operation: &str, after: Duration) -> Self {
        Self::Unexpected(format!("{operation} timed out after {after:?}"))
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox errors (listing, marking read, sending).
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Mailbox unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Message {id} not found")]
    NotFound { id: String },

    #[error("Failed to send to {to}: {reason}")]
    SendFailed { to: String, reason: String },
}

impl MailboxError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Calendar errors.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Calendar unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Invalid calendar response: {reason}")]
    InvalidResponse { reason: String },

    #[error("Invalid booking URL: {0}")]
    InvalidUrl(String),
}

impl CalendarError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Classification agent errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Classifier unavailable: {0}")]
    Unavailable(#[from] LlmError),

    #[error("Malformed classification: {reason}")]
    MalformedResponse { reason: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_distinguishes_not_found_from_unavailable() {
        let nf: Error = MailboxError::NotFound { id: "42".into() }.into();
        let down: Error = MailboxError::unavailable("connection refused").into();
        assert_eq!(nf.kind(), "not_found");
        assert_eq!(down.kind(), "mailbox_unavailable");
    }

    #[test]
    fn agent_error_wraps_llm_error() {
        let err: Error = AgentError::from(LlmError::RequestFailed {
            provider: "openai".into(),
            reason: "401 Unauthorized".into(),
        })
        .into();
        assert_eq!(err.kind(), "agent_error");
        assert!(err.to_string().contains("openai"));
    }

    #[test]
    fn timed_out_is_unexpected() {
        let err = Error::timed_out("classify", Duration::from_secs(3));
        assert_eq!(err.kind(), "unexpected");
        assert!(err.to_string().contains("classify timed out"));
    }
}
