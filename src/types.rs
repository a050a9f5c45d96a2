//! Shared types used across modules
//!
//! This module contains types that are used by multiple modules
//! to avoid circular dependencies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::taxonomy::{ErrorKind, FindingSource};

/// One detected problem in one utterance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorFinding {
    pub kind: ErrorKind,
    pub original_text: String,
    pub corrected_text: String,
    pub explanation: String,
    pub skill_keys: Vec<String>,
    pub source: FindingSource,
}

impl ErrorFinding {
    /// Build a finding, enforcing the construction invariants: the corrected
    /// text must be non-empty and differ from the original, and the
    /// explanation must be non-empty. Invalid inputs yield `None` and are
    /// dropped at the boundary instead of propagating bad data.
    pub fn new(
        kind: ErrorKind,
        original_text: impl Into<String>,
        corrected_text: impl Into<String>,
        explanation: impl Into<String>,
        skill_keys: Vec<String>,
        source: FindingSource,
    ) -> Option<Self> {
        let original_text = original_text.into();
        let corrected_text = corrected_text.into();
        let explanation = explanation.into();

        if corrected_text.is_empty() || corrected_text == original_text {
            return None;
        }
        if explanation.trim().is_empty() {
            return None;
        }

        Some(Self {
            kind,
            original_text,
            corrected_text,
            explanation,
            skill_keys,
            source,
        })
    }

    /// Merge key: two findings with the same kind and original text are
    /// duplicates, with the heuristic layer taking precedence.
    pub fn merge_key(&self) -> (ErrorKind, String) {
        (self.kind, self.original_text.clone())
    }
}

/// A persisted error-log row: a finding plus its log metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedFinding {
    pub id: String,
    pub user_id: String,
    #[serde(flatten)]
    pub finding: ErrorFinding,
    pub recycled: bool,
    pub created_at: DateTime<Utc>,
}

/// One tutoring request as it enters the orchestrator
#[derive(Debug, Clone, Deserialize)]
pub struct TutorRequest {
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub scenario_id: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

/// The orchestrator's output for one request. Created once, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct TutorResponse {
    pub message: String,
    pub errors: Vec<ErrorFinding>,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub micro_task: Option<String>,
    /// Best-effort persistence failures are reported here, not as request
    /// failures; the computed findings are still returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Fragment returned by the model layer (stub or live)
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub message: String,
    pub findings: Vec<ErrorFinding>,
    pub micro_task: Option<String>,
}

impl ModelReply {
    /// The deterministic fragment used in stub mode and as the degrade
    /// target for live-mode failures: no findings, a generic encouragement.
    pub fn stub() -> Self {
        Self {
            message: "Keep practicing! Write another sentence or two and I'll look at them."
                .to_string(),
            findings: Vec::new(),
            micro_task: None,
        }
    }
}

/// A user profile as stored and served
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub level: String,
    pub native_language: String,
    pub goals: Vec<String>,
    pub interests: Vec<String>,
    pub created_at: DateTime<Utc>,
}
