//! Model fallback layer
//!
//! One interface, two implementations selected at start-up: a deterministic
//! stub (no credential, or `enable_llm = false`) and a live remote client.
//! The live client degrades to the stub fragment on any unrecoverable
//! failure, so callers never see an upstream error.

pub mod openrouter;
pub mod stub;

pub use openrouter::OpenRouterTutorModel;
pub use stub::StubTutorModel;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::{self, LlmConfig};
use crate::types::ModelReply;

/// The model-layer seam: enrich a tutoring request with model findings.
///
/// Implementations must always return a fragment; remote failures are
/// absorbed into stub-equivalent behavior internally.
#[async_trait]
pub trait TutorModel: Send + Sync {
    async fn call_tutor(&self, input: &str, context: Option<&str>) -> ModelReply;

    /// Short implementation name for logs and the health payload
    fn name(&self) -> &'static str;
}

/// Select the model implementation once at start-up.
///
/// `enable_llm = false` disables the model stage entirely (the orchestrator
/// records it as skipped); a missing credential keeps the stage enabled but
/// backed by the deterministic stub.
pub fn from_config(config: &LlmConfig) -> Option<Arc<dyn TutorModel>> {
    if !config.enable_llm {
        info!("model layer disabled by config");
        return None;
    }

    match config::get_api_key() {
        Some(api_key) => {
            info!(provider = %config.provider, model = %config.model, "model layer live");
            Some(Arc::new(OpenRouterTutorModel::new(config.clone(), api_key)))
        }
        None => {
            info!("no model credential configured, using stub");
            Some(Arc::new(StubTutorModel))
        }
    }
}
