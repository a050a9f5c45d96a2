//! Lingua Coach - Language Tutoring Core Library
//!
//! A language-tutoring feedback and review-scheduling core:
//! - Two-layer error detection: deterministic heuristic rules first, a
//!   remote language model as enrichment with a deterministic offline stub
//! - Append-only per-user error log with recycling into review items
//! - Spaced-repetition review scheduling (SM-2 style)
//! - Per-skill mastery tracking with read-time decay
//!
//! # Example
//!
//! ```ignore
//! use lingua_coach::tutor::RuleEngine;
//!
//! let findings = RuleEngine::new().analyze("I go to school yesterday.", None);
//! assert_eq!(findings.len(), 1);
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod error;
pub mod taxonomy;
pub mod types;
pub mod config;
pub mod store; // Must come before the trackers since they depend on it
pub mod mastery;
pub mod srs;
pub mod model;
pub mod tutor;
pub mod server;
pub mod cli;

// Re-export commonly used types for convenience
pub use config::Config;
pub use error::{CoachError, CoachResult};
pub use mastery::{ExposureOutcome, MasteryTracker};
pub use model::{StubTutorModel, TutorModel};
pub use srs::{CardState, ReviewItem, ReviewQuality, ReviewScheduler};
pub use store::SqliteStore;
pub use taxonomy::{ErrorKind, FindingSource};
pub use tutor::{RuleEngine, TutorEngine};
pub use types::{ErrorFinding, TutorRequest, TutorResponse, UserProfile};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Language Tutoring Core Library", NAME, VERSION)
}
