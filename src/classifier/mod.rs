//! Appointment-request classification.
//!
//! Two implementations of [`ClassifierAgent`]:
//! - [`LlmClassifier`]: language-model decision, strictly validated
//! - [`KeywordClassifier`]: deterministic keyword rules, no model needed

pub mod keywords;
pub mod llm;

pub use keywords::KeywordClassifier;
pub use llm::LlmClassifier;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AgentError;

/// Kind of appointment being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[default]
    General,
    FollowUp,
    Consultation,
}

impl AppointmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::FollowUp => "follow_up",
            Self::Consultation => "consultation",
        }
    }
}

/// The classifier's decision for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub is_appointment_request: bool,
    pub appointment_type: AppointmentType,
    /// One-line description of the request, when the classifier offers one.
    pub summary: Option<String>,
}

impl ClassificationResult {
    pub fn not_relevant() -> Self {
        Self {
            is_appointment_request: false,
            appointment_type: AppointmentType::General,
            summary: None,
        }
    }

    pub fn appointment(kind: AppointmentType) -> Self {
        Self {
            is_appointment_request: true,
            appointment_type: kind,
            summary: None,
        }
    }
}

/// Decides whether a message is an appointment request.
#[async_trait]
pub trait ClassifierAgent: Send + Sync {
    /// Classify the message text (sender and subject lines, then the body).
    async fn classify(&self, text: &str) -> Result<ClassificationResult, AgentError>;
}
