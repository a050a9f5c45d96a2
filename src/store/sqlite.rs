//! SQLite-backed store for users, the error log, mastery, and review items

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::MasteryRow;
use crate::error::{CoachError, CoachResult};
use crate::srs::{CardState, ReviewItem};
use crate::taxonomy::{ErrorKind, FindingSource};
use crate::types::{ErrorFinding, LoggedFinding, UserProfile};

/// SQLite-backed store. The connection is serialized behind an async mutex;
/// each method holds the lock for one statement batch and never across an
/// await on external I/O.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path
    pub async fn new<P: AsRef<Path>>(path: P) -> CoachResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoachError::Persistence(e.to_string()))?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store (tests and the offline CLI)
    pub fn open_in_memory() -> CoachResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> CoachResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                level TEXT NOT NULL,
                native_language TEXT NOT NULL,
                goals TEXT NOT NULL DEFAULT '[]',
                interests TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            );

            -- Append-only error log; recycled is the only mutable column
            CREATE TABLE IF NOT EXISTS error_log (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                original_text TEXT NOT NULL,
                corrected_text TEXT NOT NULL,
                explanation TEXT NOT NULL,
                skill_keys TEXT NOT NULL DEFAULT '[]',
                source TEXT NOT NULL,
                recycled INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS mastery (
                user_id TEXT NOT NULL,
                skill_key TEXT NOT NULL,
                proficiency REAL NOT NULL,
                exposures INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, skill_key)
            );

            CREATE TABLE IF NOT EXISTS review_items (
                user_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                state TEXT NOT NULL,
                kind TEXT NOT NULL,
                interval_days REAL NOT NULL,
                ease REAL NOT NULL,
                streak INTEGER NOT NULL DEFAULT 0,
                due_at TEXT NOT NULL,
                skill_keys TEXT NOT NULL DEFAULT '[]',
                prompt TEXT NOT NULL,
                answer TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, item_id)
            );

            CREATE INDEX IF NOT EXISTS idx_error_log_user ON error_log(user_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_review_due ON review_items(user_id, due_at);
            "#,
        )?;

        Ok(())
    }

    // ============ Users ============

    /// Insert a new user profile
    pub async fn create_user(&self, profile: &UserProfile) -> CoachResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO users (user_id, level, native_language, goals, interests, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                profile.user_id,
                profile.level,
                profile.native_language,
                serde_json::to_string(&profile.goals)?,
                serde_json::to_string(&profile.interests)?,
                profile.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Load a user profile by id
    pub async fn get_user(&self, user_id: &str) -> CoachResult<Option<UserProfile>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT user_id, level, native_language, goals, interests, created_at
             FROM users WHERE user_id = ?1",
        )?;

        let result = stmt
            .query_row(params![user_id], |row| {
                let goals_json: String = row.get(3)?;
                let interests_json: String = row.get(4)?;
                let created_at_str: String = row.get(5)?;
                Ok(UserProfile {
                    user_id: row.get(0)?,
                    level: row.get(1)?,
                    native_language: row.get(2)?,
                    goals: serde_json::from_str(&goals_json).unwrap_or_default(),
                    interests: serde_json::from_str(&interests_json).unwrap_or_default(),
                    created_at: parse_timestamp(&created_at_str),
                })
            })
            .optional()?;

        Ok(result)
    }

    /// Check user existence without loading the profile
    pub async fn user_exists(&self, user_id: &str) -> CoachResult<bool> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached("SELECT 1 FROM users WHERE user_id = ?1")?;
        let found: Option<i64> = stmt.query_row(params![user_id], |row| row.get(0)).optional()?;
        Ok(found.is_some())
    }

    // ============ Error log ============

    /// Append one finding to the user's error log
    pub async fn append_finding(
        &self,
        user_id: &str,
        finding: &ErrorFinding,
    ) -> CoachResult<LoggedFinding> {
        let logged = LoggedFinding {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            finding: finding.clone(),
            recycled: false,
            created_at: Utc::now(),
        };

        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO error_log
               (id, user_id, kind, original_text, corrected_text, explanation, skill_keys, source, recycled, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)"#,
            params![
                logged.id,
                logged.user_id,
                finding.kind.to_string(),
                finding.original_text,
                finding.corrected_text,
                finding.explanation,
                serde_json::to_string(&finding.skill_keys)?,
                finding.source.to_string(),
                logged.created_at.to_rfc3339(),
            ],
        )?;

        Ok(logged)
    }

    /// Query the user's error log, most recent first
    pub async fn query_findings(
        &self,
        user_id: &str,
        limit: usize,
        unrecycled_only: bool,
    ) -> CoachResult<Vec<LoggedFinding>> {
        let conn = self.conn.lock().await;
        let sql = if unrecycled_only {
            "SELECT id, user_id, kind, original_text, corrected_text, explanation, skill_keys, source, recycled, created_at
             FROM error_log WHERE user_id = ?1 AND recycled = 0
             ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        } else {
            "SELECT id, user_id, kind, original_text, corrected_text, explanation, skill_keys, source, recycled, created_at
             FROM error_log WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        };
        let mut stmt = conn.prepare_cached(sql)?;

        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            let kind_str: String = row.get(2)?;
            let skill_keys_json: String = row.get(6)?;
            let source_str: String = row.get(7)?;
            let recycled: i64 = row.get(8)?;
            let created_at_str: String = row.get(9)?;
            Ok(LoggedFinding {
                id: row.get(0)?,
                user_id: row.get(1)?,
                finding: ErrorFinding {
                    kind: ErrorKind::parse_lenient(&kind_str),
                    original_text: row.get(3)?,
                    corrected_text: row.get(4)?,
                    explanation: row.get(5)?,
                    skill_keys: serde_json::from_str(&skill_keys_json).unwrap_or_default(),
                    source: if source_str == "model" {
                        FindingSource::Model
                    } else {
                        FindingSource::Heuristic
                    },
                },
                recycled: recycled != 0,
                created_at: parse_timestamp(&created_at_str),
            })
        })?;

        let mut findings = Vec::new();
        for row in rows {
            findings.push(row?);
        }
        Ok(findings)
    }

    /// Flip the recycled flag on one log row. Returns false if the row was
    /// not found.
    pub async fn mark_recycled(&self, finding_id: &str) -> CoachResult<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE error_log SET recycled = 1 WHERE id = ?1",
            params![finding_id],
        )?;
        Ok(changed > 0)
    }

    // ============ Mastery ============

    /// Apply an error exposure to one (user, skill) row as a single atomic
    /// upsert: decrease bounded below by 0, exposure count incremented.
    pub async fn record_error_exposure(
        &self,
        user_id: &str,
        skill_key: &str,
        step: f64,
        initial: f64,
    ) -> CoachResult<()> {
        let now = Utc::now().to_rfc3339();
        let first = (initial - step).max(0.0);
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO mastery (user_id, skill_key, proficiency, exposures, updated_at)
               VALUES (?1, ?2, ?3, 1, ?4)
               ON CONFLICT(user_id, skill_key) DO UPDATE SET
                   proficiency = max(0.0, proficiency - ?5),
                   exposures = exposures + 1,
                   updated_at = ?4"#,
            params![user_id, skill_key, first, now, step],
        )?;
        Ok(())
    }

    /// Apply a success exposure: increase with diminishing returns, bounded
    /// above by 1.
    pub async fn record_success_exposure(
        &self,
        user_id: &str,
        skill_key: &str,
        step: f64,
        initial: f64,
    ) -> CoachResult<()> {
        let now = Utc::now().to_rfc3339();
        let first = (initial + step * (1.0 - initial)).min(1.0);
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO mastery (user_id, skill_key, proficiency, exposures, updated_at)
               VALUES (?1, ?2, ?3, 1, ?4)
               ON CONFLICT(user_id, skill_key) DO UPDATE SET
                   proficiency = min(1.0, proficiency + ?5 * (1.0 - proficiency)),
                   exposures = exposures + 1,
                   updated_at = ?4"#,
            params![user_id, skill_key, first, now, step],
        )?;
        Ok(())
    }

    /// Load all stored mastery rows for a user (undecayed)
    pub async fn get_mastery_rows(&self, user_id: &str) -> CoachResult<Vec<MasteryRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT skill_key, proficiency, exposures, updated_at
             FROM mastery WHERE user_id = ?1 ORDER BY skill_key",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            let updated_at_str: String = row.get(3)?;
            Ok(MasteryRow {
                skill_key: row.get(0)?,
                proficiency: row.get(1)?,
                exposures: row.get::<_, i64>(2)? as u32,
                updated_at: parse_timestamp(&updated_at_str),
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // ============ Review items ============

    /// Insert a review item if no card with the same (user, item) key exists.
    /// Returns true when a new row was created — the idempotent-upsert half
    /// of `enqueue_from_finding`.
    pub async fn insert_review_item_if_absent(&self, item: &ReviewItem) -> CoachResult<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            r#"INSERT INTO review_items
               (user_id, item_id, state, kind, interval_days, ease, streak, due_at, skill_keys, prompt, answer, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
               ON CONFLICT(user_id, item_id) DO NOTHING"#,
            params![
                item.user_id,
                item.item_id,
                item.state.to_string(),
                item.kind.to_string(),
                item.interval_days,
                item.ease,
                item.streak as i64,
                item.due_at.to_rfc3339(),
                serde_json::to_string(&item.skill_keys)?,
                item.prompt,
                item.answer,
                item.created_at.to_rfc3339(),
                item.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Overwrite the scheduling fields of an existing card in one statement
    pub async fn update_review_item(&self, item: &ReviewItem) -> CoachResult<()> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            r#"UPDATE review_items SET
                   state = ?3, interval_days = ?4, ease = ?5, streak = ?6,
                   due_at = ?7, updated_at = ?8
               WHERE user_id = ?1 AND item_id = ?2"#,
            params![
                item.user_id,
                item.item_id,
                item.state.to_string(),
                item.interval_days,
                item.ease,
                item.streak as i64,
                item.due_at.to_rfc3339(),
                item.updated_at.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(CoachError::NotFound(format!(
                "review item {} for user {}",
                item.item_id, item.user_id
            )));
        }
        Ok(())
    }

    /// Load one review item
    pub async fn get_review_item(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> CoachResult<Option<ReviewItem>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT user_id, item_id, state, kind, interval_days, ease, streak, due_at, skill_keys, prompt, answer, created_at, updated_at
             FROM review_items WHERE user_id = ?1 AND item_id = ?2",
        )?;
        let result = stmt
            .query_row(params![user_id, item_id], row_to_review_item)
            .optional()?;
        Ok(result)
    }

    /// Due cards for a user: `due_at <= now`, suspended excluded, earliest
    /// overdue first, ties broken by lowest ease so the weakest items surface
    /// first.
    pub async fn get_due_items(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> CoachResult<Vec<ReviewItem>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT user_id, item_id, state, kind, interval_days, ease, streak, due_at, skill_keys, prompt, answer, created_at, updated_at
             FROM review_items
             WHERE user_id = ?1 AND state != 'suspended' AND due_at <= ?2
             ORDER BY due_at ASC, ease ASC LIMIT ?3",
        )?;

        let rows = stmt.query_map(
            params![user_id, now.to_rfc3339(), limit as i64],
            row_to_review_item,
        )?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }
}

fn row_to_review_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReviewItem> {
    let state_str: String = row.get(2)?;
    let kind_str: String = row.get(3)?;
    let due_at_str: String = row.get(7)?;
    let skill_keys_json: String = row.get(8)?;
    let created_at_str: String = row.get(11)?;
    let updated_at_str: String = row.get(12)?;
    Ok(ReviewItem {
        user_id: row.get(0)?,
        item_id: row.get(1)?,
        state: CardState::parse(&state_str),
        kind: ErrorKind::parse_lenient(&kind_str),
        interval_days: row.get(4)?,
        ease: row.get(5)?,
        streak: row.get::<_, i64>(6)? as u32,
        due_at: parse_timestamp(&due_at_str),
        skill_keys: serde_json::from_str(&skill_keys_json).unwrap_or_default(),
        prompt: row.get(9)?,
        answer: row.get(10)?,
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
