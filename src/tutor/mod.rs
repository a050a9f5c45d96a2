//! Tutor orchestrator
//!
//! Composes the heuristic rule engine with the model layer into one response
//! per request, then fans the merged findings out to the error log, the
//! mastery tracker, and (under the immediate recycle policy) the review
//! scheduler. Each request walks a strictly sequential state machine; no
//! state is ever revisited.

pub mod heuristics;

pub use heuristics::RuleEngine;

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RecyclePolicy;
use crate::error::{CoachError, CoachResult};
use crate::mastery::{ExposureOutcome, MasteryTracker};
use crate::model::TutorModel;
use crate::srs::ReviewScheduler;
use crate::store::SqliteStore;
use crate::taxonomy::ErrorKind;
use crate::types::{ErrorFinding, ModelReply, TutorRequest, TutorResponse};

/// Per-request pipeline state. Transitions are strictly sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Received,
    HeuristicDone,
    ModelDone,
    ModelSkipped,
    Merged,
    Persisted,
    Responded,
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestState::Received => "received",
            RequestState::HeuristicDone => "heuristic_done",
            RequestState::ModelDone => "model_done",
            RequestState::ModelSkipped => "model_skipped",
            RequestState::Merged => "merged",
            RequestState::Persisted => "persisted",
            RequestState::Responded => "responded",
        };
        write!(f, "{}", s)
    }
}

/// Orchestrates one tutoring request end to end
pub struct TutorEngine {
    rules: RuleEngine,
    model: Option<Arc<dyn TutorModel>>,
    store: Arc<SqliteStore>,
    mastery: Arc<MasteryTracker>,
    scheduler: Arc<ReviewScheduler>,
    recycle_policy: RecyclePolicy,
}

impl TutorEngine {
    pub fn new(
        model: Option<Arc<dyn TutorModel>>,
        store: Arc<SqliteStore>,
        mastery: Arc<MasteryTracker>,
        scheduler: Arc<ReviewScheduler>,
        recycle_policy: RecyclePolicy,
    ) -> Self {
        Self {
            rules: RuleEngine::new(),
            model,
            store,
            mastery,
            scheduler,
            recycle_policy,
        }
    }

    /// Handle one tutoring request.
    ///
    /// Heuristic findings are persisted before the model call so an aborted
    /// request leaves them valid. Persistence failures never suppress the
    /// computed findings; they surface in the response `warning` field.
    pub async fn handle_text(&self, request: &TutorRequest) -> CoachResult<TutorResponse> {
        if request.text.trim().is_empty() {
            return Err(CoachError::Validation("text must not be empty".to_string()));
        }
        if !self.store.user_exists(&request.user_id).await? {
            return Err(CoachError::NotFound(format!("user {}", request.user_id)));
        }

        let session_id = Uuid::new_v4().to_string();
        let mut state = RequestState::Received;
        let mut warnings: Vec<String> = Vec::new();
        debug!(session_id = %session_id, state = %state, "tutoring request");

        let heuristic_findings = self
            .rules
            .analyze(&request.text, request.scenario_id.as_deref());
        state = advance(state, RequestState::HeuristicDone, &session_id);

        self.persist_findings(&request.user_id, &heuristic_findings, &mut warnings)
            .await;

        let fragment: Option<ModelReply> = match &self.model {
            Some(model) => {
                let reply = model
                    .call_tutor(&request.text, request.context.as_deref())
                    .await;
                state = advance(state, RequestState::ModelDone, &session_id);
                Some(reply)
            }
            None => {
                state = advance(state, RequestState::ModelSkipped, &session_id);
                None
            }
        };

        let model_findings = fragment
            .as_ref()
            .map(|f| f.findings.clone())
            .unwrap_or_default();
        let merged = merge_findings(heuristic_findings, model_findings);
        state = advance(state, RequestState::Merged, &session_id);

        // Model findings that survived the merge are new to the log
        let model_only: Vec<ErrorFinding> = merged
            .iter()
            .filter(|f| f.source == crate::taxonomy::FindingSource::Model)
            .cloned()
            .collect();
        self.persist_findings(&request.user_id, &model_only, &mut warnings)
            .await;
        state = advance(state, RequestState::Persisted, &session_id);

        let message = response_message(fragment.as_ref(), merged.len());
        let micro_task = fragment.and_then(|f| f.micro_task);

        advance(state, RequestState::Responded, &session_id);

        Ok(TutorResponse {
            message,
            errors: merged,
            session_id,
            micro_task,
            warning: if warnings.is_empty() {
                None
            } else {
                Some(warnings.join("; "))
            },
        })
    }

    /// Best-effort fan-out for one batch of findings: error log append,
    /// mastery exposures, and immediate recycling when configured
    async fn persist_findings(
        &self,
        user_id: &str,
        findings: &[ErrorFinding],
        warnings: &mut Vec<String>,
    ) {
        for finding in findings {
            let logged = match self.store.append_finding(user_id, finding).await {
                Ok(logged) => logged,
                Err(e) => {
                    warn!(error = %e, "error log append failed");
                    warnings.push(format!("finding not saved: {}", e));
                    continue;
                }
            };

            for skill_key in &finding.skill_keys {
                if let Err(e) = self
                    .mastery
                    .record_exposure(user_id, skill_key, ExposureOutcome::Error)
                    .await
                {
                    warn!(error = %e, skill_key, "mastery update failed");
                    warnings.push(format!("mastery not updated for {}", skill_key));
                }
            }

            if self.recycle_policy == RecyclePolicy::Immediate && !finding.skill_keys.is_empty() {
                if let Err(e) = self.scheduler.enqueue_from_finding(user_id, &logged).await {
                    warn!(error = %e, "review enqueue failed");
                    warnings.push(format!("review item not created: {}", e));
                }
            }
        }
    }
}

fn advance(from: RequestState, to: RequestState, session_id: &str) -> RequestState {
    debug!(session_id, from = %from, to = %to, "state transition");
    to
}

/// Merge rule: all heuristic findings, then model findings whose
/// `(kind, original_text)` pair is unseen. The heuristic layer has
/// precedence on conflicts since it is free and deterministic.
pub fn merge_findings(
    heuristic: Vec<ErrorFinding>,
    model: Vec<ErrorFinding>,
) -> Vec<ErrorFinding> {
    let mut seen: HashSet<(ErrorKind, String)> =
        heuristic.iter().map(|f| f.merge_key()).collect();
    let mut merged = heuristic;
    for finding in model {
        if seen.insert(finding.merge_key()) {
            merged.push(finding);
        }
    }
    merged
}

/// The response message: the model's when it said something consistent with
/// the merged result (it contributed findings, or there are none at all),
/// otherwise a deterministic default phrase. A generic encouragement must
/// not mask heuristic findings.
fn response_message(fragment: Option<&ModelReply>, error_count: usize) -> String {
    if let Some(fragment) = fragment {
        let consistent = error_count == 0 || !fragment.findings.is_empty();
        if consistent && !fragment.message.trim().is_empty() {
            return fragment.message.clone();
        }
    }
    if error_count == 0 {
        "No errors spotted. Nice work!".to_string()
    } else {
        format!(
            "I found {} thing{} to review. Check the corrections below.",
            error_count,
            if error_count == 1 { "" } else { "s" }
        )
    }
}
