//! Per-skill mastery tracking
//!
//! Proficiency moves only through the defined update rules: a fixed decrease
//! per error, a diminishing-returns increase per success. Time decay is
//! computed at read time against the stored value and never persisted, so no
//! background sweep is needed.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::MasteryConfig;
use crate::error::CoachResult;
use crate::store::SqliteStore;

/// Outcome of one exposure to a skill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureOutcome {
    /// A finding implicated this skill
    Error,
    /// A review of an item tagged with this skill was answered correctly
    Success,
}

/// Tracks a decaying proficiency estimate per (user, skill)
pub struct MasteryTracker {
    store: Arc<SqliteStore>,
    config: MasteryConfig,
}

impl MasteryTracker {
    pub fn new(store: Arc<SqliteStore>, config: MasteryConfig) -> Self {
        Self { store, config }
    }

    /// Record one exposure. The store applies the update as a single-row
    /// atomic upsert; first exposure seeds the record from the configured
    /// initial proficiency.
    pub async fn record_exposure(
        &self,
        user_id: &str,
        skill_key: &str,
        outcome: ExposureOutcome,
    ) -> CoachResult<()> {
        debug!(user_id, skill_key, ?outcome, "recording skill exposure");
        match outcome {
            ExposureOutcome::Error => {
                self.store
                    .record_error_exposure(
                        user_id,
                        skill_key,
                        self.config.error_step,
                        self.config.initial_proficiency,
                    )
                    .await
            }
            ExposureOutcome::Success => {
                self.store
                    .record_success_exposure(
                        user_id,
                        skill_key,
                        self.config.success_step,
                        self.config.initial_proficiency,
                    )
                    .await
            }
        }
    }

    /// Read the user's mastery map with decay applied as of `now`
    pub async fn get_mastery(&self, user_id: &str) -> CoachResult<HashMap<String, f64>> {
        self.get_mastery_at(user_id, Utc::now()).await
    }

    /// Decay-at-read variant with an explicit clock, used by tests
    pub async fn get_mastery_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> CoachResult<HashMap<String, f64>> {
        let rows = self.store.get_mastery_rows(user_id).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let decayed = decay(
                    row.proficiency,
                    row.updated_at,
                    now,
                    self.config.decay_floor,
                    self.config.decay_half_life_days,
                );
                (row.skill_key, decayed)
            })
            .collect())
    }
}

/// Half-life decay toward the floor. Values at or below the floor are
/// returned unchanged; the stored value is never modified.
pub fn decay(
    proficiency: f64,
    updated_at: DateTime<Utc>,
    now: DateTime<Utc>,
    floor: f64,
    half_life_days: f64,
) -> f64 {
    if proficiency <= floor || half_life_days <= 0.0 {
        return proficiency;
    }
    let elapsed_days = (now - updated_at).num_seconds().max(0) as f64 / 86_400.0;
    let factor = 0.5_f64.powf(elapsed_days / half_life_days);
    floor + (proficiency - floor) * factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tracker() -> MasteryTracker {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        MasteryTracker::new(store, MasteryConfig::default())
    }

    #[test]
    fn test_decay_is_monotonic_and_floored() {
        let now = Utc::now();
        let fresh = decay(0.8, now, now, 0.2, 30.0);
        assert!((fresh - 0.8).abs() < 1e-9);

        let after_half_life = decay(0.8, now - Duration::days(30), now, 0.2, 30.0);
        assert!((after_half_life - 0.5).abs() < 1e-6);

        let after_long = decay(0.8, now - Duration::days(3650), now, 0.2, 30.0);
        assert!(after_long >= 0.2);
        assert!(after_long < 0.21);
    }

    #[test]
    fn test_decay_leaves_subfloor_values_alone() {
        let now = Utc::now();
        let v = decay(0.05, now - Duration::days(365), now, 0.2, 30.0);
        assert!((v - 0.05).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_exposure_sequence_stays_in_bounds() {
        let tracker = tracker();
        let outcomes = [
            ExposureOutcome::Error,
            ExposureOutcome::Error,
            ExposureOutcome::Success,
            ExposureOutcome::Error,
            ExposureOutcome::Success,
            ExposureOutcome::Success,
            ExposureOutcome::Error,
            ExposureOutcome::Error,
            ExposureOutcome::Error,
            ExposureOutcome::Error,
        ];
        for outcome in outcomes {
            tracker
                .record_exposure("u1", "grammar.tense.past-simple", outcome)
                .await
                .unwrap();
            let mastery = tracker.get_mastery("u1").await.unwrap();
            let p = mastery["grammar.tense.past-simple"];
            assert!((0.0..=1.0).contains(&p), "proficiency out of range: {}", p);
        }
    }

    #[tokio::test]
    async fn test_success_has_diminishing_returns() {
        let tracker = tracker();
        // First success from the initial 0.5
        tracker
            .record_exposure("u1", "grammar.articles", ExposureOutcome::Success)
            .await
            .unwrap();
        let p1 = tracker.get_mastery("u1").await.unwrap()["grammar.articles"];
        let gain1 = p1 - 0.5;

        tracker
            .record_exposure("u1", "grammar.articles", ExposureOutcome::Success)
            .await
            .unwrap();
        let p2 = tracker.get_mastery("u1").await.unwrap()["grammar.articles"];
        let gain2 = p2 - p1;

        assert!(gain2 < gain1, "expected diminishing returns: {} vs {}", gain2, gain1);
        assert!(p2 <= 1.0);
    }

    #[tokio::test]
    async fn test_error_decreases_bounded_by_zero() {
        let tracker = tracker();
        for _ in 0..20 {
            tracker
                .record_exposure("u1", "grammar.word-order", ExposureOutcome::Error)
                .await
                .unwrap();
        }
        let p = tracker.get_mastery("u1").await.unwrap()["grammar.word-order"];
        assert!(p >= 0.0);
        // Far below the floor after repeated errors; the floor only bounds decay
        assert!(p < 0.2);
    }
}
