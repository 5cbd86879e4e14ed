//! LLM classifier: one tight completion per message, strictly parsed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::classifier::{AppointmentType, ClassificationResult, ClassifierAgent};
use crate::error::AgentError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Max tokens for the classification call (runs on every message).
const CLASSIFY_MAX_TOKENS: u32 = 256;

/// Classification should be deterministic.
const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// Message text beyond this many characters is not sent to the model.
const MAX_INPUT_CHARS: usize = 2000;

/// Classifies messages with a language model.
pub struct LlmClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ClassifierAgent for LlmClassifier {
    async fn classify(&self, text: &str) -> Result<ClassificationResult, AgentError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_system_prompt()),
            ChatMessage::user(build_user_prompt(text)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;

        let result = parse_classification(&response.content).inspect_err(|e| {
            warn!(
                model = self.llm.model_name(),
                raw_response = %response.content,
                error = %e,
                "Classifier returned malformed output"
            );
        })?;

        debug!(
            is_appointment = result.is_appointment_request,
            kind = result.appointment_type.as_str(),
            "Message classified"
        );
        Ok(result)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_system_prompt() -> String {
    "You are the intake assistant of a medical practice. Decide whether an email is \
     asking to book, schedule or arrange an appointment.\n\n\
     Respond with ONLY a JSON object:\n\
     {\"is_appointment_request\": true|false, \"appointment_type\": \"general\"|\"follow_up\"|\"consultation\", \"summary\": \"...\"}\n\n\
     Rules:\n\
     - \"follow_up\": the sender refers to an earlier visit or treatment\n\
     - \"consultation\": the sender wants to discuss a concern or get advice\n\
     - \"general\": any other appointment request\n\
     - Thanks, receipts, newsletters and questions that do not ask for a visit are not appointment requests\n\
     - summary: one short sentence, omit it when not useful\n\
     - No other fields"
        .to_string()
}

fn build_user_prompt(text: &str) -> String {
    let preview: String = text.chars().take(MAX_INPUT_CHARS).collect();
    format!("Email:\n{preview}")
}

// ── Response parsing ────────────────────────────────────────────────

/// Wire shape of the model's answer. Unknown fields are rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassificationResponse {
    is_appointment_request: bool,
    #[serde(default)]
    appointment_type: Option<AppointmentType>,
    #[serde(default)]
    summary: Option<String>,
}

/// Parse and validate the model's reply.
fn parse_classification(raw: &str) -> Result<ClassificationResult, AgentError> {
    let json = extract_json_object(raw);
    let response: ClassificationResponse =
        serde_json::from_str(&json).map_err(|e| AgentError::MalformedResponse {
            reason: format!("JSON parse error: {e}"),
        })?;

    let appointment_type = if response.is_appointment_request {
        response.appointment_type.unwrap_or_default()
    } else {
        AppointmentType::General
    };

    Ok(ClassificationResult {
        is_appointment_request: response.is_appointment_request,
        appointment_type,
        summary: response.summary.filter(|s| !s.trim().is_empty()),
    })
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::CompletionResponse;

    #[test]
    fn parse_positive_with_type() {
        let raw = r#"{"is_appointment_request": true, "appointment_type": "follow_up", "summary": "Follow-up after surgery"}"#;
        let result = parse_classification(raw).unwrap();
        assert!(result.is_appointment_request);
        assert_eq!(result.appointment_type, AppointmentType::FollowUp);
        assert_eq!(result.summary.as_deref(), Some("Follow-up after surgery"));
    }

    #[test]
    fn parse_positive_without_type_defaults_to_general() {
        let result = parse_classification(r#"{"is_appointment_request": true}"#).unwrap();
        assert_eq!(result.appointment_type, AppointmentType::General);
        assert!(result.summary.is_none());
    }

    #[test]
    fn parse_negative_ignores_type() {
        let raw = r#"{"is_appointment_request": false, "appointment_type": "consultation"}"#;
        let result = parse_classification(raw).unwrap();
        assert_eq!(result, ClassificationResult::not_relevant());
    }

    #[test]
    fn parse_markdown_wrapped() {
        let raw = "```json\n{\"is_appointment_request\": true}\n```";
        assert!(parse_classification(raw).unwrap().is_appointment_request);
    }

    #[test]
    fn parse_rejects_missing_decision() {
        let err = parse_classification(r#"{"appointment_type": "general"}"#).unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse { .. }));
    }

    #[test]
    fn parse_rejects_string_boolean() {
        let err = parse_classification(r#"{"is_appointment_request": "yes"}"#).unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse { .. }));
    }

    #[test]
    fn parse_rejects_unknown_type() {
        let raw = r#"{"is_appointment_request": true, "appointment_type": "surgery"}"#;
        assert!(parse_classification(raw).is_err());
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        let raw = r#"{"is_appointment_request": true, "action": "sent_link"}"#;
        assert!(parse_classification(raw).is_err());
    }

    #[test]
    fn parse_rejects_prose() {
        assert!(parse_classification("Yes, this looks like a booking request.").is_err());
    }

    #[test]
    fn user_prompt_truncates_long_mail() {
        let prompt = build_user_prompt(&"x".repeat(5000));
        assert!(prompt.len() < MAX_INPUT_CHARS + 20);
    }

    /// Mock LLM that returns a fixed reply and records the prompt.
    struct MockLlm {
        reply: Result<String, ()>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LlmProvider for MockLlm {
        fn model_name(&self) -> &str {
            "mock-classifier"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Ok(content) => Ok(CompletionResponse {
                    content: content.clone(),
                }),
                Err(()) => Err(LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason: "connection reset".into(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn classifier_sends_low_temperature_request() {
        let llm = Arc::new(MockLlm {
            reply: Ok(r#"{"is_appointment_request": true, "appointment_type": "consultation"}"#.into()),
            seen: Mutex::new(Vec::new()),
        });
        let classifier = LlmClassifier::new(llm.clone());

        let result = classifier
            .classify("Subject: Question\n\nCan I come in to discuss my options?")
            .await
            .unwrap();
        assert_eq!(result.appointment_type, AppointmentType::Consultation);

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].temperature, Some(CLASSIFY_TEMPERATURE));
        assert!(seen[0].messages[1].content.contains("discuss my options"));
    }

    #[tokio::test]
    async fn provider_failure_is_unavailable() {
        let llm = Arc::new(MockLlm {
            reply: Err(()),
            seen: Mutex::new(Vec::new()),
        });
        let err = LlmClassifier::new(llm).classify("hello").await.unwrap_err();
        assert!(matches!(err, AgentError::Unavailable(_)));
    }

    #[tokio::test]
    async fn malformed_output_is_agent_error() {
        let llm = Arc::new(MockLlm {
            reply: Ok("I think so".into()),
            seen: Mutex::new(Vec::new()),
        });
        let err = LlmClassifier::new(llm).classify("hello").await.unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse { .. }));
    }
}
