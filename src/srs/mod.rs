//! Spaced-repetition review scheduling
//!
//! Each (user, item) pair owns one card. Cards move through
//! `New -> Learning -> Review`, with failed reviews demoting back to
//! `Learning` and an explicit administrative action required to reach
//! `Suspended`. Due-ness is computed on read; nothing runs in the background.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::SrsConfig;
use crate::error::{CoachError, CoachResult};
use crate::mastery::{ExposureOutcome, MasteryTracker};
use crate::store::SqliteStore;
use crate::taxonomy::ErrorKind;
use crate::types::LoggedFinding;

/// Scheduling state of a review card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    New,
    Learning,
    Review,
    Suspended,
}

impl std::fmt::Display for CardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CardState::New => write!(f, "new"),
            CardState::Learning => write!(f, "learning"),
            CardState::Review => write!(f, "review"),
            CardState::Suspended => write!(f, "suspended"),
        }
    }
}

impl CardState {
    /// Parse a stored state string; unknown values land in `New`, which is
    /// the safest state (due immediately, no history assumed).
    pub fn parse(s: &str) -> Self {
        match s {
            "learning" => CardState::Learning,
            "review" => CardState::Review,
            "suspended" => CardState::Suspended,
            _ => CardState::New,
        }
    }
}

/// Discrete review quality scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewQuality {
    Fail,
    Hard,
    Good,
    Easy,
}

impl ReviewQuality {
    pub fn is_success(&self) -> bool {
        !matches!(self, ReviewQuality::Fail)
    }
}

/// One spaced-repetition card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    pub user_id: String,
    pub item_id: String,
    pub state: CardState,
    pub kind: ErrorKind,
    pub interval_days: f64,
    pub ease: f64,
    pub streak: u32,
    pub due_at: DateTime<Utc>,
    pub skill_keys: Vec<String>,
    /// The erroneous text the learner produced
    pub prompt: String,
    /// The corrected form to recall
    pub answer: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stable identifier for a reviewable item, derived from the error kind and
/// the normalized corrected text. Equivalent findings collapse to one card.
pub fn item_id_for(kind: ErrorKind, corrected_text: &str) -> String {
    let normalized = corrected_text.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(kind.to_string().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Maintains the per-user review schedule
pub struct ReviewScheduler {
    store: Arc<SqliteStore>,
    mastery: Arc<MasteryTracker>,
    config: SrsConfig,
}

impl ReviewScheduler {
    pub fn new(store: Arc<SqliteStore>, mastery: Arc<MasteryTracker>, config: SrsConfig) -> Self {
        Self {
            store,
            mastery,
            config,
        }
    }

    /// Due cards for a user, earliest overdue first, weakest-ease tiebreak,
    /// capped at `limit` (config default when not given)
    pub async fn get_due(&self, user_id: &str, limit: Option<usize>) -> CoachResult<Vec<ReviewItem>> {
        let limit = limit.unwrap_or(self.config.due_limit);
        self.store.get_due_items(user_id, Utc::now(), limit).await
    }

    /// Apply one review outcome, reschedule the card, and fold the outcome
    /// into the mastery tracker for every skill the card carries
    pub async fn submit_review(
        &self,
        user_id: &str,
        item_id: &str,
        quality: ReviewQuality,
    ) -> CoachResult<ReviewItem> {
        let mut item = self
            .store
            .get_review_item(user_id, item_id)
            .await?
            .ok_or_else(|| CoachError::NotFound(format!("review item {}", item_id)))?;

        if item.state == CardState::Suspended {
            return Err(CoachError::Validation(
                "cannot review a suspended item".to_string(),
            ));
        }

        let now = Utc::now();
        apply_review(&mut item, quality, now, &self.config);
        self.store.update_review_item(&item).await?;

        debug!(
            user_id,
            item_id,
            state = %item.state,
            interval = item.interval_days,
            "review applied"
        );

        let outcome = if quality.is_success() {
            ExposureOutcome::Success
        } else {
            ExposureOutcome::Error
        };
        for skill_key in &item.skill_keys {
            self.mastery.record_exposure(user_id, skill_key, outcome).await?;
        }

        Ok(item)
    }

    /// Create a `New` card from a logged finding and mark the finding
    /// recycled. Idempotent: a second call for an equivalent finding returns
    /// the existing card without creating a duplicate.
    pub async fn enqueue_from_finding(
        &self,
        user_id: &str,
        logged: &LoggedFinding,
    ) -> CoachResult<ReviewItem> {
        let finding = &logged.finding;
        let item_id = item_id_for(finding.kind, &finding.corrected_text);
        let now = Utc::now();

        let candidate = ReviewItem {
            user_id: user_id.to_string(),
            item_id: item_id.clone(),
            state: CardState::New,
            kind: finding.kind,
            interval_days: 0.0,
            ease: self.config.ease_start,
            streak: 0,
            due_at: now,
            skill_keys: finding.skill_keys.clone(),
            prompt: finding.original_text.clone(),
            answer: finding.corrected_text.clone(),
            created_at: now,
            updated_at: now,
        };

        let created = self.store.insert_review_item_if_absent(&candidate).await?;
        if created {
            info!(user_id, item_id = %item_id, kind = %finding.kind, "enqueued review item");
        }

        // The log row is consumed either way; recycling an already-recycled
        // row is a no-op.
        self.store.mark_recycled(&logged.id).await?;

        let item = self
            .store
            .get_review_item(user_id, &item_id)
            .await?
            .ok_or_else(|| CoachError::Persistence("review item vanished after upsert".into()))?;
        Ok(item)
    }

    /// Administrative suspend/resume. Resume returns graduated cards to
    /// `Review` and everything else to `Learning`, due immediately.
    pub async fn set_suspended(
        &self,
        user_id: &str,
        item_id: &str,
        suspended: bool,
    ) -> CoachResult<ReviewItem> {
        let mut item = self
            .store
            .get_review_item(user_id, item_id)
            .await?
            .ok_or_else(|| CoachError::NotFound(format!("review item {}", item_id)))?;

        let now = Utc::now();
        if suspended {
            item.state = CardState::Suspended;
        } else if item.state == CardState::Suspended {
            item.state = if item.interval_days >= self.config.graduating_interval_days {
                CardState::Review
            } else {
                CardState::Learning
            };
            item.due_at = now;
        }
        item.updated_at = now;

        self.store.update_review_item(&item).await?;
        info!(user_id, item_id, suspended, "review item suspension changed");
        Ok(item)
    }
}

/// Pure transition function: reschedules one card for one review outcome
fn apply_review(item: &mut ReviewItem, quality: ReviewQuality, now: DateTime<Utc>, config: &SrsConfig) {
    match item.state {
        CardState::New | CardState::Learning => {
            if quality.is_success() {
                item.streak += 1;
                if item.streak >= 2 {
                    // Two consecutive successes graduate the card
                    item.state = CardState::Review;
                    item.interval_days = config.graduating_interval_days;
                } else {
                    item.state = CardState::Learning;
                    item.interval_days = learning_step(config, item.streak as usize);
                }
            } else {
                item.state = CardState::Learning;
                item.streak = 0;
                item.interval_days = learning_step(config, 0);
            }
        }
        CardState::Review => match quality {
            ReviewQuality::Fail => {
                item.ease = (item.ease - 0.2).max(config.ease_min);
                item.interval_days = (item.interval_days * 0.5).max(1.0);
                item.state = CardState::Learning;
                item.streak = 0;
            }
            ReviewQuality::Hard => {
                item.ease = (item.ease - 0.15).max(config.ease_min);
                item.interval_days *= 1.2;
            }
            ReviewQuality::Good => {
                item.interval_days *= item.ease;
            }
            ReviewQuality::Easy => {
                item.ease = (item.ease + 0.15).min(config.ease_max);
                item.interval_days *= item.ease * 1.3;
            }
        },
        // Callers reject suspended cards before this point
        CardState::Suspended => {}
    }

    item.due_at = now + days_to_duration(item.interval_days);
    item.updated_at = now;
}

fn learning_step(config: &SrsConfig, index: usize) -> f64 {
    let steps = &config.learning_steps_days;
    if steps.is_empty() {
        return 1.0;
    }
    steps[index.min(steps.len() - 1)]
}

fn days_to_duration(days: f64) -> Duration {
    Duration::seconds((days * 86_400.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SrsConfig;

    fn card(state: CardState, interval: f64, ease: f64) -> ReviewItem {
        let now = Utc::now();
        ReviewItem {
            user_id: "u1".to_string(),
            item_id: "abc123".to_string(),
            state,
            kind: ErrorKind::Tense,
            interval_days: interval,
            ease,
            streak: 0,
            due_at: now,
            skill_keys: vec!["grammar.tense.past-simple".to_string()],
            prompt: "I go yesterday".to_string(),
            answer: "I went yesterday".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_item_id_is_stable_and_normalized() {
        let a = item_id_for(ErrorKind::Tense, "I went to school yesterday.");
        let b = item_id_for(ErrorKind::Tense, "  i went to school yesterday.  ");
        let c = item_id_for(ErrorKind::Article, "I went to school yesterday.");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_two_successes_graduate_a_new_card() {
        let config = SrsConfig::default();
        let now = Utc::now();
        let mut item = card(CardState::New, 0.0, 2.5);

        apply_review(&mut item, ReviewQuality::Good, now, &config);
        assert_eq!(item.state, CardState::Learning);
        assert_eq!(item.streak, 1);
        assert!((item.interval_days - 3.0).abs() < 1e-9);

        apply_review(&mut item, ReviewQuality::Good, now, &config);
        assert_eq!(item.state, CardState::Review);
        assert!((item.interval_days - config.graduating_interval_days).abs() < 1e-9);
    }

    #[test]
    fn test_learning_failure_resets_streak() {
        let config = SrsConfig::default();
        let now = Utc::now();
        let mut item = card(CardState::Learning, 3.0, 2.5);
        item.streak = 1;

        apply_review(&mut item, ReviewQuality::Fail, now, &config);
        assert_eq!(item.state, CardState::Learning);
        assert_eq!(item.streak, 0);
        assert!((item.interval_days - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_review_fail_demotes_and_is_due_earlier_than_good() {
        let config = SrsConfig::default();
        let now = Utc::now();

        let mut failed = card(CardState::Review, 10.0, 2.5);
        apply_review(&mut failed, ReviewQuality::Fail, now, &config);
        assert_eq!(failed.state, CardState::Learning);
        assert!((failed.interval_days - 5.0).abs() < 1e-9);

        let mut passed = card(CardState::Review, 10.0, 2.5);
        apply_review(&mut passed, ReviewQuality::Good, now, &config);
        assert_eq!(passed.state, CardState::Review);
        assert!((passed.interval_days - 25.0).abs() < 1e-9);

        assert!(failed.due_at < passed.due_at);
    }

    #[test]
    fn test_review_fail_interval_floor() {
        let config = SrsConfig::default();
        let now = Utc::now();
        let mut item = card(CardState::Review, 1.0, 2.5);
        apply_review(&mut item, ReviewQuality::Fail, now, &config);
        assert!((item.interval_days - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ease_stays_in_bounds() {
        let config = SrsConfig::default();
        let now = Utc::now();

        let mut item = card(CardState::Review, 10.0, config.ease_min);
        apply_review(&mut item, ReviewQuality::Hard, now, &config);
        assert!(item.ease >= config.ease_min);

        let mut item = card(CardState::Review, 10.0, config.ease_max);
        apply_review(&mut item, ReviewQuality::Easy, now, &config);
        assert!(item.ease <= config.ease_max);
    }

    #[test]
    fn test_hard_grows_slower_than_good() {
        let config = SrsConfig::default();
        let now = Utc::now();

        let mut hard = card(CardState::Review, 10.0, 2.5);
        apply_review(&mut hard, ReviewQuality::Hard, now, &config);

        let mut good = card(CardState::Review, 10.0, 2.5);
        apply_review(&mut good, ReviewQuality::Good, now, &config);

        assert!(hard.interval_days < good.interval_days);
    }
}
