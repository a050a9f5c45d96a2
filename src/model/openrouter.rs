//! Live tutor-model client (OpenRouter / OpenAI-compatible chat completions)
//!
//! One outbound call per tutoring request, bounded by the configured timeout,
//! with a fixed retry budget and exponential backoff. On exhaustion or any
//! non-recoverable error the client returns the stub fragment instead of
//! failing the request.

use reqwest::Client;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::TutorModel;
use crate::config::LlmConfig;
use crate::error::{CoachError, CoachResult};
use crate::taxonomy::{skill_keys_for, ErrorKind, FindingSource};
use crate::types::{ErrorFinding, ModelReply};

const SYSTEM_PROMPT: &str = r#"You are a language tutor reviewing one learner utterance.
Respond with a single JSON object, no prose around it:
{
  "message": "short friendly feedback for the learner",
  "errors": [
    {
      "kind": "tense | article | subject-verb-agreement | word-order | preposition | verb-pattern | word-choice | spelling",
      "original": "the exact erroneous fragment",
      "corrected": "the corrected fragment",
      "explanation": "one-sentence rationale"
    }
  ],
  "micro_task": "an optional 1-line practice task, or null"
}
Only report genuine errors. An empty errors array is a good answer for a clean sentence."#;

/// Remote model client with stub degradation
pub struct OpenRouterTutorModel {
    client: Client,
    config: LlmConfig,
    api_key: String,
}

impl OpenRouterTutorModel {
    pub fn new(config: LlmConfig, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            config,
            api_key,
        }
    }

    /// One request/response cycle against the provider
    async fn request_once(&self, input: &str, context: Option<&str>) -> CoachResult<ModelReply> {
        let user_content = match context {
            Some(ctx) => format!("Context: {}\nUtterance: {}", ctx, input),
            None => format!("Utterance: {}", input),
        };

        let request = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_content },
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| CoachError::UpstreamModel(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CoachError::UpstreamModel(format!(
                "HTTP {}: {}",
                status,
                truncate(&body, 300)
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CoachError::UpstreamModel(format!("failed to read body: {}", e)))?;

        // Parse as raw Value first; strict struct deserialization breaks on
        // providers that vary field shapes.
        let raw: Value = serde_json::from_str(&body)
            .map_err(|e| CoachError::UpstreamModel(format!("bad response JSON: {}", e)))?;

        let content = raw
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| CoachError::UpstreamModel("no content in response".to_string()))?;

        Ok(parse_reply(content))
    }
}

#[async_trait::async_trait]
impl TutorModel for OpenRouterTutorModel {
    async fn call_tutor(&self, input: &str, context: Option<&str>) -> ModelReply {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            match self.request_once(input, context).await {
                Ok(reply) => {
                    if self.config.log_model_calls {
                        info!(
                            latency_ms = started.elapsed().as_millis() as u64,
                            findings = reply.findings.len(),
                            input = %truncate(input, 200),
                            "model call succeeded"
                        );
                    }
                    return reply;
                }
                Err(e) => {
                    let retryable = e.is_retryable() && attempt < self.config.retry_attempts;
                    if !retryable {
                        warn!(error = %e, attempt, "model call failed, degrading to stub reply");
                        return ModelReply::stub();
                    }
                    let backoff = backoff_delay(attempt);
                    debug!(error = %e, attempt, backoff_ms = backoff.as_millis() as u64, "retrying model call");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "openrouter"
    }
}

/// Exponential backoff with jitter: 500ms, 1s, 2s, ... plus up to 250ms
fn backoff_delay(attempt: u32) -> Duration {
    use rand::Rng;
    let base = 500u64.saturating_mul(1 << attempt.min(4));
    let jitter = rand::rng().random_range(0..250);
    Duration::from_millis(base + jitter)
}

/// Parse the model's JSON content into a reply fragment. Invalid findings
/// are dropped at the boundary; a completely unparseable reply degrades to
/// a plain-message fragment rather than an error.
fn parse_reply(content: &str) -> ModelReply {
    let json_slice = extract_json_object(content).unwrap_or(content);

    let parsed: Value = match serde_json::from_str(json_slice) {
        Ok(v) => v,
        Err(_) => {
            return ModelReply {
                message: content.trim().to_string(),
                findings: Vec::new(),
                micro_task: None,
            };
        }
    };

    let message = parsed
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or_default()
        .to_string();

    let findings = parsed
        .get("errors")
        .and_then(|e| e.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|entry| {
                    let kind = ErrorKind::parse_lenient(
                        entry.get("kind").and_then(|k| k.as_str()).unwrap_or(""),
                    );
                    let original = entry.get("original").and_then(|v| v.as_str())?;
                    let corrected = entry.get("corrected").and_then(|v| v.as_str())?;
                    let explanation = entry.get("explanation").and_then(|v| v.as_str())?;
                    ErrorFinding::new(
                        kind,
                        original,
                        corrected,
                        explanation,
                        skill_keys_for(kind),
                        FindingSource::Model,
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let micro_task = parsed
        .get("micro_task")
        .and_then(|m| m.as_str())
        .map(|s| s.to_string())
        .filter(|s| !s.trim().is_empty());

    ModelReply {
        message,
        findings,
        micro_task,
    }
}

/// Models often wrap JSON in code fences; take the outermost object
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end > start {
        Some(&content[start..=end])
    } else {
        None
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_with_fenced_json() {
        let content = r#"```json
{"message": "Nice try!", "errors": [{"kind": "tense", "original": "I go", "corrected": "I went", "explanation": "Past context."}], "micro_task": "Write two past-tense sentences."}
```"#;
        let reply = parse_reply(content);
        assert_eq!(reply.message, "Nice try!");
        assert_eq!(reply.findings.len(), 1);
        assert_eq!(reply.findings[0].kind, ErrorKind::Tense);
        assert_eq!(reply.findings[0].source, FindingSource::Model);
        assert_eq!(reply.micro_task.as_deref(), Some("Write two past-tense sentences."));
    }

    #[test]
    fn test_parse_reply_drops_invalid_findings() {
        let content = r#"{"message": "ok", "errors": [
            {"kind": "tense", "original": "same", "corrected": "same", "explanation": "no-op"},
            {"kind": "weird-kind", "original": "a thing", "corrected": "the thing", "explanation": "specific reference"}
        ]}"#;
        let reply = parse_reply(content);
        assert_eq!(reply.findings.len(), 1);
        assert_eq!(reply.findings[0].kind, ErrorKind::Unclassified);
        assert!(reply.findings[0].skill_keys.is_empty());
    }

    #[test]
    fn test_parse_reply_tolerates_plain_text() {
        let reply = parse_reply("Great sentence, keep going!");
        assert_eq!(reply.message, "Great sentence, keep going!");
        assert!(reply.findings.is_empty());
    }

    #[test]
    fn test_backoff_grows() {
        let a = backoff_delay(0);
        let b = backoff_delay(2);
        assert!(a >= Duration::from_millis(500));
        assert!(b >= Duration::from_millis(2000));
    }
}
