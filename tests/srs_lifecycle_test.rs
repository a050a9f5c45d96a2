//! Review-scheduler lifecycle tests on an in-memory store

use chrono::{Duration, Utc};
use std::sync::Arc;

use lingua_coach::config::{MasteryConfig, SrsConfig};
use lingua_coach::srs::item_id_for;
use lingua_coach::types::{ErrorFinding, LoggedFinding};
use lingua_coach::{
    CardState, ErrorKind, FindingSource, MasteryTracker, ReviewItem, ReviewQuality,
    ReviewScheduler, SqliteStore,
};

fn build_scheduler() -> (Arc<SqliteStore>, Arc<MasteryTracker>, ReviewScheduler) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let mastery = Arc::new(MasteryTracker::new(store.clone(), MasteryConfig::default()));
    let scheduler = ReviewScheduler::new(store.clone(), mastery.clone(), SrsConfig::default());
    (store, mastery, scheduler)
}

async fn logged_finding(store: &SqliteStore, user_id: &str, corrected: &str) -> LoggedFinding {
    let finding = ErrorFinding::new(
        ErrorKind::Tense,
        "I go to school yesterday.",
        corrected,
        "Past marker needs a past verb.",
        vec!["grammar.tense.past-simple".to_string()],
        FindingSource::Heuristic,
    )
    .unwrap();
    store.append_finding(user_id, &finding).await.unwrap()
}

#[tokio::test]
async fn test_get_due_is_empty_for_user_with_no_items() {
    let (_store, _mastery, scheduler) = build_scheduler();
    let due = scheduler.get_due("nobody", Some(20)).await.unwrap();
    assert_eq!(due.len(), 0);
}

#[tokio::test]
async fn test_new_item_is_due_immediately() {
    let (store, _mastery, scheduler) = build_scheduler();
    let logged = logged_finding(&store, "u1", "I went to school yesterday.").await;

    let item = scheduler.enqueue_from_finding("u1", &logged).await.unwrap();
    assert_eq!(item.state, CardState::New);

    let due = scheduler.get_due("u1", None).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].item_id, item.item_id);
}

#[tokio::test]
async fn test_enqueue_is_idempotent_for_equivalent_findings() {
    let (store, _mastery, scheduler) = build_scheduler();
    let first = logged_finding(&store, "u1", "I went to school yesterday.").await;
    let second = logged_finding(&store, "u1", "I went to school yesterday.").await;

    let item_a = scheduler.enqueue_from_finding("u1", &first).await.unwrap();
    let item_b = scheduler.enqueue_from_finding("u1", &second).await.unwrap();

    assert_eq!(item_a.item_id, item_b.item_id);
    let due = scheduler.get_due("u1", None).await.unwrap();
    assert_eq!(due.len(), 1);

    // Both originating log rows are consumed
    let unrecycled = store.query_findings("u1", 50, true).await.unwrap();
    assert!(unrecycled.is_empty());
}

#[tokio::test]
async fn test_two_successes_graduate_and_leave_due_queue() {
    let (store, _mastery, scheduler) = build_scheduler();
    let logged = logged_finding(&store, "u1", "I went to school yesterday.").await;
    let item = scheduler.enqueue_from_finding("u1", &logged).await.unwrap();

    let after_first = scheduler
        .submit_review("u1", &item.item_id, ReviewQuality::Good)
        .await
        .unwrap();
    assert_eq!(after_first.state, CardState::Learning);
    assert_eq!(after_first.streak, 1);

    let after_second = scheduler
        .submit_review("u1", &item.item_id, ReviewQuality::Good)
        .await
        .unwrap();
    assert_eq!(after_second.state, CardState::Review);
    assert!((after_second.interval_days - 7.0).abs() < 1e-9);
    assert!(after_second.due_at > Utc::now());

    let due = scheduler.get_due("u1", None).await.unwrap();
    assert!(due.is_empty());
}

#[tokio::test]
async fn test_fail_on_review_card_demotes_to_learning() {
    let (store, _mastery, scheduler) = build_scheduler();
    let logged = logged_finding(&store, "u1", "I went to school yesterday.").await;
    let item = scheduler.enqueue_from_finding("u1", &logged).await.unwrap();

    // Graduate the card first
    scheduler
        .submit_review("u1", &item.item_id, ReviewQuality::Good)
        .await
        .unwrap();
    let graduated = scheduler
        .submit_review("u1", &item.item_id, ReviewQuality::Good)
        .await
        .unwrap();
    assert_eq!(graduated.state, CardState::Review);

    let failed = scheduler
        .submit_review("u1", &item.item_id, ReviewQuality::Fail)
        .await
        .unwrap();
    assert_eq!(failed.state, CardState::Learning);
    assert_eq!(failed.streak, 0);
    // Halved with a one-day floor, so strictly earlier than a good outcome
    // (interval x ease) would have produced
    assert!(failed.interval_days <= graduated.interval_days * 0.5);
    assert!(failed.due_at < graduated.due_at + Duration::days(1));
}

#[tokio::test]
async fn test_suspended_items_never_surface_and_resume_is_due() {
    let (store, _mastery, scheduler) = build_scheduler();
    let logged = logged_finding(&store, "u1", "I went to school yesterday.").await;
    let item = scheduler.enqueue_from_finding("u1", &logged).await.unwrap();

    let suspended = scheduler
        .set_suspended("u1", &item.item_id, true)
        .await
        .unwrap();
    assert_eq!(suspended.state, CardState::Suspended);

    let due = scheduler.get_due("u1", None).await.unwrap();
    assert!(due.is_empty());

    // Reviewing a suspended card is rejected
    let err = scheduler
        .submit_review("u1", &item.item_id, ReviewQuality::Good)
        .await
        .unwrap_err();
    assert!(matches!(err, lingua_coach::CoachError::Validation(_)));

    let resumed = scheduler
        .set_suspended("u1", &item.item_id, false)
        .await
        .unwrap();
    assert_ne!(resumed.state, CardState::Suspended);

    let due = scheduler.get_due("u1", None).await.unwrap();
    assert_eq!(due.len(), 1);
}

#[tokio::test]
async fn test_review_outcomes_feed_mastery() {
    let (store, mastery, scheduler) = build_scheduler();
    let logged = logged_finding(&store, "u1", "I went to school yesterday.").await;
    let item = scheduler.enqueue_from_finding("u1", &logged).await.unwrap();

    scheduler
        .submit_review("u1", &item.item_id, ReviewQuality::Good)
        .await
        .unwrap();
    let after_success = mastery.get_mastery("u1").await.unwrap();
    let p_success = after_success["grammar.tense.past-simple"];
    assert!(p_success > 0.5);

    scheduler
        .submit_review("u1", &item.item_id, ReviewQuality::Fail)
        .await
        .unwrap();
    let after_fail = mastery.get_mastery("u1").await.unwrap();
    let p_fail = after_fail["grammar.tense.past-simple"];
    assert!(p_fail < p_success);
}

#[tokio::test]
async fn test_submit_review_for_unknown_item_is_not_found() {
    let (_store, _mastery, scheduler) = build_scheduler();
    let err = scheduler
        .submit_review("u1", "no-such-item", ReviewQuality::Good)
        .await
        .unwrap_err();
    assert!(matches!(err, lingua_coach::CoachError::NotFound(_)));
}

fn backdated_item(
    now: chrono::DateTime<Utc>,
    user_id: &str,
    answer: &str,
    hours_overdue: i64,
    ease: f64,
) -> ReviewItem {
    ReviewItem {
        user_id: user_id.to_string(),
        item_id: item_id_for(ErrorKind::Tense, answer),
        state: CardState::Review,
        kind: ErrorKind::Tense,
        interval_days: 7.0,
        ease,
        streak: 0,
        due_at: now - Duration::hours(hours_overdue),
        skill_keys: vec!["grammar.tense.past-simple".to_string()],
        prompt: "prompt".to_string(),
        answer: answer.to_string(),
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_due_ordering_earliest_first_then_lowest_ease() {
    let (store, _mastery, scheduler) = build_scheduler();

    let now = Utc::now();
    // Most overdue card first regardless of ease
    let oldest = backdated_item(now, "u1", "answer one", 10, 2.8);
    // Two cards overdue by exactly the same amount: lowest ease surfaces first
    let weak = backdated_item(now, "u1", "answer two", 5, 1.4);
    let strong = backdated_item(now, "u1", "answer three", 5, 2.6);

    for item in [&strong, &oldest, &weak] {
        assert!(store.insert_review_item_if_absent(item).await.unwrap());
    }

    let due = scheduler.get_due("u1", Some(20)).await.unwrap();
    assert_eq!(due.len(), 3);
    assert_eq!(due[0].item_id, oldest.item_id);
    assert_eq!(due[1].item_id, weak.item_id);
    assert_eq!(due[2].item_id, strong.item_id);
}

#[tokio::test]
async fn test_due_limit_caps_results() {
    let (store, _mastery, scheduler) = build_scheduler();
    let now = Utc::now();
    for i in 0..5 {
        let item = backdated_item(now, "u1", &format!("answer {}", i), 3 + i, 2.5);
        store.insert_review_item_if_absent(&item).await.unwrap();
    }

    let due = scheduler.get_due("u1", Some(2)).await.unwrap();
    assert_eq!(due.len(), 2);
}
