//! Persistent per-user storage
//!
//! Owns the error log (append-only), mastery rows, review items, and user
//! profiles. Every mutation is a single-row statement so concurrent requests
//! for the same user resolve as last-write-wins per key.

pub mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

/// One stored mastery record, before read-time decay is applied
#[derive(Debug, Clone)]
pub struct MasteryRow {
    pub skill_key: String,
    pub proficiency: f64,
    pub exposures: u32,
    pub updated_at: DateTime<Utc>,
}
