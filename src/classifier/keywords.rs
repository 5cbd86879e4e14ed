//! Keyword classifier: deterministic, no LLM.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::classifier::{AppointmentType, ClassificationResult, ClassifierAgent};
use crate::error::AgentError;

static APPOINTMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(appointments?|book(s|ed|ing)?|schedul(e|ed|ing)|meetings?|consultations?|visits?)\b")
        .expect("appointment pattern is valid")
});

static FOLLOW_UP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(follow(ing)?[\s-]?up|followup)\b").expect("follow-up pattern is valid")
});

static CONSULTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(consult(ation|ing)?s?|discuss|advice)\b").expect("consultation pattern is valid")
});

/// Flags appointment vocabulary and picks the request type from
/// follow-up / consultation cues.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, text: &str) -> ClassificationResult {
        let text = content_of(text);
        if !APPOINTMENT.is_match(text) {
            return ClassificationResult::not_relevant();
        }
        let kind = if FOLLOW_UP.is_match(text) {
            AppointmentType::FollowUp
        } else if CONSULTATION.is_match(text) {
            AppointmentType::Consultation
        } else {
            AppointmentType::General
        };
        ClassificationResult::appointment(kind)
    }
}

/// Subject and body only. A sender address such as `deals@booking.com` is not
/// booking vocabulary.
fn content_of(text: &str) -> &str {
    match text.strip_prefix("From:") {
        Some(rest) => rest.split_once('\n').map_or("", |(_, content)| content),
        None => text,
    }
}

#[async_trait]
impl ClassifierAgent for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<ClassificationResult, AgentError> {
        Ok(self.analyze(text))
    }
}
