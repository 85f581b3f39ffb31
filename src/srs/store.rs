//! SQLite persistence for the scheduling engine.
//!
//! One connection behind a mutex; every write that spans tables runs in a
//! single IMMEDIATE transaction. Card rows carry a `version` counter used
//! as a compare-and-swap guard so a stale read-modify-write surfaces as a
//! conflict instead of silently losing an update. Timestamps are stored as
//! integer epoch milliseconds.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::leveling;
use super::models::{Card, CardStatus, LearnerProgress, ReviewRecord, ScheduleSnapshot};
use super::SrsError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cards (
    id              TEXT PRIMARY KEY,
    owner           TEXT NOT NULL,
    book_id         TEXT,
    ease_factor     REAL NOT NULL,
    interval_days   INTEGER NOT NULL,
    repetitions     INTEGER NOT NULL,
    due_at          INTEGER NOT NULL,
    status          TEXT NOT NULL,
    total_reviews   INTEGER NOT NULL DEFAULT 0,
    correct_reviews INTEGER NOT NULL DEFAULT 0,
    version         INTEGER NOT NULL DEFAULT 0,
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cards_owner_due ON cards(owner, status, due_at);

CREATE TABLE IF NOT EXISTS reviews (
    id                 TEXT PRIMARY KEY,
    card_id            TEXT NOT NULL,
    owner              TEXT NOT NULL,
    rating             INTEGER NOT NULL,
    response_time_ms   INTEGER,
    reviewed_at        INTEGER NOT NULL,
    ease_before        REAL NOT NULL,
    interval_before    INTEGER NOT NULL,
    repetitions_before INTEGER NOT NULL,
    ease_after         REAL NOT NULL,
    interval_after     INTEGER NOT NULL,
    repetitions_after  INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reviews_owner_at ON reviews(owner, reviewed_at);
CREATE INDEX IF NOT EXISTS idx_reviews_card ON reviews(card_id);

CREATE TABLE IF NOT EXISTS learner_progress (
    owner            TEXT PRIMARY KEY,
    total_experience INTEGER NOT NULL DEFAULT 0,
    level            INTEGER NOT NULL DEFAULT 1,
    daily_review_cap INTEGER NOT NULL,
    last_activity    INTEGER NOT NULL
);
"#;

const CARD_COLUMNS: &str = "id, owner, book_id, ease_factor, interval_days, repetitions, \
     due_at, status, total_reviews, correct_reviews, version, created_at, updated_at";

pub struct SrsStore {
    conn: Mutex<Connection>,
}

impl SrsStore {
    pub fn open(db_path: &Path) -> Result<Self, SrsError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, SrsError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, SrsError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Recover the guard after a writer panic; SQLite has already rolled
        // back any transaction that was open on the connection.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ========== Card State ==========

    pub fn insert_card(&self, card: &Card) -> Result<(), SrsError> {
        self.conn().execute(
            "INSERT INTO cards (id, owner, book_id, ease_factor, interval_days, repetitions, \
             due_at, status, total_reviews, correct_reviews, version, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                card.id,
                card.owner,
                card.book_id,
                f64::from(card.ease_factor),
                card.interval,
                card.repetitions,
                card.due_at.timestamp_millis(),
                card.status.as_str(),
                i64::from(card.total_reviews),
                i64::from(card.correct_reviews),
                card.version,
                card.created_at.timestamp_millis(),
                card.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    pub fn get_card(&self, id: &str) -> Result<Option<Card>, SrsError> {
        let conn = self.conn();
        let card = conn
            .query_row(
                &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"),
                [id],
                card_from_row,
            )
            .optional()?;
        Ok(card)
    }

    pub fn set_status(
        &self,
        id: &str,
        status: CardStatus,
        now: DateTime<Utc>,
    ) -> Result<(), SrsError> {
        let changed = self.conn().execute(
            "UPDATE cards SET status = ?1, updated_at = ?2, version = version + 1 WHERE id = ?3",
            params![status.as_str(), now.timestamp_millis(), id],
        )?;
        if changed == 0 {
            return Err(SrsError::CardNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Cards eligible for review now, most overdue first.
    ///
    /// Ties on the due date break on card id so the order is stable.
    pub fn due_cards(
        &self,
        owner: &str,
        now: DateTime<Utc>,
        limit: usize,
        book_id: Option<&str>,
    ) -> Result<Vec<Card>, SrsError> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {CARD_COLUMNS} FROM cards \
             WHERE owner = ?1 AND status != 'suspended' AND due_at <= ?2 \
             AND (?3 IS NULL OR book_id = ?3) \
             ORDER BY due_at ASC, id ASC LIMIT ?4",
        );
        let mut stmt = conn.prepare(&sql)?;
        let cards = stmt
            .query_map(
                params![owner, now.timestamp_millis(), book_id, limit as i64],
                card_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cards)
    }

    // ========== Review transaction ==========

    /// Apply one review as a single atomic unit of work: rewrite the card
    /// row (guarded by `expected_version`), append the review record, and
    /// upsert learner progress. All three commit together or not at all.
    ///
    /// Returns the progress row as committed. A version mismatch means a
    /// concurrent writer got there first; nothing is written and the
    /// caller sees a conflict it can retry.
    pub fn apply_review(
        &self,
        updated: &Card,
        expected_version: i64,
        record: &ReviewRecord,
        experience_gain: u32,
        default_daily_cap: u32,
    ) -> Result<LearnerProgress, SrsError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE cards SET ease_factor = ?1, interval_days = ?2, repetitions = ?3, \
             due_at = ?4, status = ?5, total_reviews = ?6, correct_reviews = ?7, \
             updated_at = ?8, version = version + 1 \
             WHERE id = ?9 AND version = ?10",
            params![
                f64::from(updated.ease_factor),
                updated.interval,
                updated.repetitions,
                updated.due_at.timestamp_millis(),
                updated.status.as_str(),
                i64::from(updated.total_reviews),
                i64::from(updated.correct_reviews),
                updated.updated_at.timestamp_millis(),
                updated.id,
                expected_version,
            ],
        )?;
        if changed == 0 {
            // Dropping the transaction rolls it back.
            return Err(SrsError::Conflict(updated.id.clone()));
        }

        tx.execute(
            "INSERT INTO reviews (id, card_id, owner, rating, response_time_ms, reviewed_at, \
             ease_before, interval_before, repetitions_before, \
             ease_after, interval_after, repetitions_after) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.id,
                record.card_id,
                record.owner,
                record.rating,
                record.response_time_ms,
                record.reviewed_at.timestamp_millis(),
                f64::from(record.before.ease_factor),
                record.before.interval,
                record.before.repetitions,
                f64::from(record.after.ease_factor),
                record.after.interval,
                record.after.repetitions,
            ],
        )?;

        let existing: Option<(i64, i64)> = tx
            .query_row(
                "SELECT total_experience, daily_review_cap FROM learner_progress WHERE owner = ?1",
                [&record.owner],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (previous_experience, daily_review_cap) = match existing {
            Some((xp, cap)) => (xp.max(0) as u64, cap.max(0) as u32),
            None => (0, default_daily_cap),
        };
        let total_experience = previous_experience + u64::from(experience_gain);
        let level = leveling::level_from_experience(total_experience);

        tx.execute(
            "INSERT INTO learner_progress (owner, total_experience, level, daily_review_cap, last_activity) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(owner) DO UPDATE SET \
             total_experience = ?2, level = ?3, last_activity = ?5",
            params![
                record.owner,
                total_experience as i64,
                i64::from(level),
                i64::from(daily_review_cap),
                record.reviewed_at.timestamp_millis(),
            ],
        )?;

        tx.commit()?;

        Ok(LearnerProgress {
            owner: record.owner.clone(),
            total_experience,
            level,
            daily_review_cap,
            last_activity: record.reviewed_at,
        })
    }

    // ========== Review log reads ==========

    /// Count of reviews in the half-open instant range [from, to).
    pub fn count_reviews_between(
        &self,
        owner: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u32, SrsError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM reviews \
             WHERE owner = ?1 AND reviewed_at >= ?2 AND reviewed_at < ?3",
            params![owner, from.timestamp_millis(), to.timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u32)
    }

    /// Lifetime (total, correct) review counts for one learner.
    pub fn review_counts(
        &self,
        owner: &str,
        book_id: Option<&str>,
    ) -> Result<(u64, u64), SrsError> {
        let (total, correct): (i64, i64) = self.conn().query_row(
            "SELECT COUNT(*), COALESCE(SUM(r.rating >= 3), 0) \
             FROM reviews r JOIN cards c ON c.id = r.card_id \
             WHERE r.owner = ?1 AND (?2 IS NULL OR c.book_id = ?2)",
            params![owner, book_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((total.max(0) as u64, correct.max(0) as u64))
    }

    /// (reviewed_at, rating) pairs for a learner, oldest first, optionally
    /// bounded below and filtered by source book.
    pub fn review_log(
        &self,
        owner: &str,
        since: Option<DateTime<Utc>>,
        book_id: Option<&str>,
    ) -> Result<Vec<(DateTime<Utc>, i32)>, SrsError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT r.reviewed_at, r.rating \
             FROM reviews r JOIN cards c ON c.id = r.card_id \
             WHERE r.owner = ?1 AND (?2 IS NULL OR r.reviewed_at >= ?2) \
             AND (?3 IS NULL OR c.book_id = ?3) \
             ORDER BY r.reviewed_at ASC",
        )?;
        let rows = stmt
            .query_map(
                params![owner, since.map(|t| t.timestamp_millis()), book_id],
                |row| {
                    let at = datetime_from_millis(0, row.get(0)?)?;
                    Ok((at, row.get::<_, i32>(1)?))
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Distinct UTC calendar days on which the learner reviewed anything.
    pub fn review_days(
        &self,
        owner: &str,
        book_id: Option<&str>,
    ) -> Result<Vec<NaiveDate>, SrsError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT date(r.reviewed_at / 1000, 'unixepoch') \
             FROM reviews r JOIN cards c ON c.id = r.card_id \
             WHERE r.owner = ?1 AND (?2 IS NULL OR c.book_id = ?2)",
        )?;
        let days = stmt
            .query_map(params![owner, book_id], |row| {
                let text: String = row.get(0)?;
                NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(days)
    }

    pub fn review_record(&self, id: &str) -> Result<Option<ReviewRecord>, SrsError> {
        let conn = self.conn();
        let record = conn
            .query_row(
                "SELECT id, card_id, owner, rating, response_time_ms, reviewed_at, \
                 ease_before, interval_before, repetitions_before, \
                 ease_after, interval_after, repetitions_after \
                 FROM reviews WHERE id = ?1",
                [id],
                review_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn review_count_for_card(&self, card_id: &str) -> Result<u32, SrsError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM reviews WHERE card_id = ?1",
            [card_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u32)
    }

    // ========== Learner progress ==========

    pub fn get_progress(&self, owner: &str) -> Result<Option<LearnerProgress>, SrsError> {
        let conn = self.conn();
        let progress = conn
            .query_row(
                "SELECT owner, total_experience, level, daily_review_cap, last_activity \
                 FROM learner_progress WHERE owner = ?1",
                [owner],
                progress_from_row,
            )
            .optional()?;
        Ok(progress)
    }

    pub fn set_daily_cap(
        &self,
        owner: &str,
        cap: u32,
        now: DateTime<Utc>,
    ) -> Result<(), SrsError> {
        self.conn().execute(
            "INSERT INTO learner_progress (owner, total_experience, level, daily_review_cap, last_activity) \
             VALUES (?1, 0, 1, ?2, ?3) \
             ON CONFLICT(owner) DO UPDATE SET daily_review_cap = ?2",
            params![owner, i64::from(cap), now.timestamp_millis()],
        )?;
        Ok(())
    }
}

fn datetime_from_millis(column: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            Type::Integer,
            format!("timestamp out of range: {millis}").into(),
        )
    })
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    let status_text: String = row.get(7)?;
    let status = CardStatus::parse(&status_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            Type::Text,
            format!("unknown card status: {status_text}").into(),
        )
    })?;
    Ok(Card {
        id: row.get(0)?,
        owner: row.get(1)?,
        book_id: row.get(2)?,
        ease_factor: row.get::<_, f64>(3)? as f32,
        interval: row.get(4)?,
        repetitions: row.get(5)?,
        due_at: datetime_from_millis(6, row.get(6)?)?,
        status,
        total_reviews: row.get::<_, i64>(8)?.max(0) as u32,
        correct_reviews: row.get::<_, i64>(9)?.max(0) as u32,
        version: row.get(10)?,
        created_at: datetime_from_millis(11, row.get(11)?)?,
        updated_at: datetime_from_millis(12, row.get(12)?)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewRecord> {
    Ok(ReviewRecord {
        id: row.get(0)?,
        card_id: row.get(1)?,
        owner: row.get(2)?,
        rating: row.get(3)?,
        response_time_ms: row.get(4)?,
        reviewed_at: datetime_from_millis(5, row.get(5)?)?,
        before: ScheduleSnapshot {
            ease_factor: row.get::<_, f64>(6)? as f32,
            interval: row.get(7)?,
            repetitions: row.get(8)?,
        },
        after: ScheduleSnapshot {
            ease_factor: row.get::<_, f64>(9)? as f32,
            interval: row.get(10)?,
            repetitions: row.get(11)?,
        },
    })
}

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<LearnerProgress> {
    Ok(LearnerProgress {
        owner: row.get(0)?,
        total_experience: row.get::<_, i64>(1)?.max(0) as u64,
        level: row.get::<_, i64>(2)?.max(0) as u32,
        daily_review_cap: row.get::<_, i64>(3)?.max(0) as u32,
        last_activity: datetime_from_millis(4, row.get(4)?)?,
    })
}
