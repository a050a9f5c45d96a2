//! Deterministic stand-in for the remote tutor model
//!
//! Keeps the whole pipeline testable without network access: zero findings,
//! a fixed encouragement message, no I/O of any kind.

use async_trait::async_trait;

use super::TutorModel;
use crate::types::ModelReply;

/// Offline model implementation
pub struct StubTutorModel;

#[async_trait]
impl TutorModel for StubTutorModel {
    async fn call_tutor(&self, _input: &str, _context: Option<&str>) -> ModelReply {
        ModelReply::stub()
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_is_deterministic_and_empty() {
        let model = StubTutorModel;
        let first = model.call_tutor("I go to school yesterday.", None).await;
        let second = model.call_tutor("completely different input", Some("travel")).await;

        assert!(first.findings.is_empty());
        assert!(second.findings.is_empty());
        assert_eq!(first.message, second.message);
        assert!(first.micro_task.is_none());
    }
}
