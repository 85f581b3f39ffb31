//! Spaced Repetition Scheduling Engine for Mnemos
//!
//! The core of the backend: decides when each flashcard is next shown, how
//! a review moves it through its lifecycle, and how learner statistics are
//! derived from the review history.
//!
//! Layout:
//! - Pure functions: SM-2 scheduler, status state machine, reward
//!   calculator, level curve. No I/O, unit-testable without a store.
//! - Transactional shell: the review orchestrator applies a review as one
//!   atomic unit of work over the SQLite store.
//! - Read side: due-set selection and statistics, idempotent and safe to
//!   retry.

pub mod due;
pub mod leveling;
pub mod models;
pub mod review;
pub mod reward;
pub mod scheduler;
pub mod stats;
pub mod status;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use due::{DueCard, DueQuery, DueSet};
pub use models::{Card, CardStatus, LearnerProgress, ReviewRecord, ScheduleSnapshot};
pub use review::{ReviewOutcome, SubmitReviewRequest};
pub use scheduler::Rating;
pub use stats::{LearnerStatistics, ReviewHistoryDay, StreakSummary};

use store::SrsStore;

#[derive(Error, Debug)]
pub enum SrsError {
    #[error("Card not found: {0}")]
    CardNotFound(String),
    #[error("Card {card_id} does not belong to {owner}")]
    NotOwner { card_id: String, owner: String },
    #[error("Card is suspended: {0}")]
    CardSuspended(String),
    #[error("Invalid rating: {0} (expected 1-4)")]
    InvalidRating(i32),
    #[error("Invalid response time: {0} ms")]
    InvalidResponseTime(i64),
    #[error("Concurrent update of card {0}, retry the review")]
    Conflict(String),
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SrsError {
    /// Stable machine-readable code, independent of the display message.
    pub fn code(&self) -> &'static str {
        match self {
            SrsError::CardNotFound(_) => "not_found",
            SrsError::NotOwner { .. } => "forbidden",
            SrsError::CardSuspended(_)
            | SrsError::InvalidRating(_)
            | SrsError::InvalidResponseTime(_) => "invalid_state",
            SrsError::Conflict(_) => "conflict",
            SrsError::Storage(_) | SrsError::Io(_) => "storage_failure",
        }
    }
}

/// Tunables for the scheduling engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrsConfig {
    /// Daily review cap for owners who never set one.
    pub default_daily_cap: u32,
    /// Bounds the per-owner cap is silently clamped to.
    pub min_daily_cap: u32,
    pub max_daily_cap: u32,
    /// Hard ceiling on cards returned by a single due query.
    pub max_due_batch: u32,
    /// Experience for a Good review; other ratings scale from this.
    pub base_experience: u32,
}

impl Default for SrsConfig {
    fn default() -> Self {
        Self {
            default_daily_cap: 100,
            min_daily_cap: 10,
            max_daily_cap: 500,
            max_due_batch: 500,
            base_experience: 10,
        }
    }
}

/// Handle to the scheduling engine; cheap to clone, safe to share across
/// request handlers.
#[derive(Clone)]
pub struct SrsEngine {
    store: Arc<SrsStore>,
    config: SrsConfig,
}

impl SrsEngine {
    /// Open (or create) the engine's database under the data directory.
    pub fn open(data_dir: PathBuf) -> Result<Self, SrsError> {
        let store = SrsStore::open(&data_dir.join("srs").join("mnemos.db"))?;
        Ok(Self {
            store: Arc::new(store),
            config: SrsConfig::default(),
        })
    }

    pub fn in_memory() -> Result<Self, SrsError> {
        Self::in_memory_with_config(SrsConfig::default())
    }

    pub fn in_memory_with_config(config: SrsConfig) -> Result<Self, SrsError> {
        Ok(Self {
            store: Arc::new(SrsStore::open_in_memory()?),
            config,
        })
    }

    pub(crate) fn store(&self) -> &SrsStore {
        &self.store
    }

    pub(crate) fn config(&self) -> &SrsConfig {
        &self.config
    }

    // ========== Card registration & suspension ==========

    /// Put a freshly authored card into the scheduling rotation: status
    /// NEW, default ease, due immediately.
    pub fn register_card(
        &self,
        owner: &str,
        book_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Card, SrsError> {
        let card = Card::new(owner.to_string(), book_id, now);
        self.store.insert_card(&card)?;
        tracing::debug!(card_id = %card.id, owner, "card registered");
        Ok(card)
    }

    /// Load a card, enforcing ownership.
    pub fn get_card(&self, card_id: &str, owner: &str) -> Result<Card, SrsError> {
        let card = self
            .store
            .get_card(card_id)?
            .ok_or_else(|| SrsError::CardNotFound(card_id.to_string()))?;
        if card.owner != owner {
            return Err(SrsError::NotOwner {
                card_id: card.id,
                owner: owner.to_string(),
            });
        }
        Ok(card)
    }

    /// Suspend or reactivate a card. Suspended cards never appear in the
    /// due set and reject reviews until reactivated here.
    pub fn set_suspended(
        &self,
        card_id: &str,
        owner: &str,
        suspended: bool,
        now: DateTime<Utc>,
    ) -> Result<Card, SrsError> {
        let card = self.get_card(card_id, owner)?;
        let next = if suspended {
            CardStatus::Suspended
        } else {
            status::reactivated_status(card.total_reviews, card.repetitions, card.interval)
        };
        self.store.set_status(card_id, next, now)?;
        self.get_card(card_id, owner)
    }

    // ========== Learner progress ==========

    /// Progress snapshot for one learner; defaults for learners who have
    /// not reviewed anything yet.
    pub fn progress(&self, owner: &str, now: DateTime<Utc>) -> Result<LearnerProgress, SrsError> {
        Ok(self
            .store
            .get_progress(owner)?
            .unwrap_or_else(|| LearnerProgress {
                owner: owner.to_string(),
                total_experience: 0,
                level: leveling::level_from_experience(0),
                daily_review_cap: self.config.default_daily_cap,
                last_activity: now,
            }))
    }

    /// Update the owner's daily review cap, silently clamping into the
    /// configured bounds. Returns the cap as stored.
    pub fn set_daily_cap(
        &self,
        owner: &str,
        cap: u32,
        now: DateTime<Utc>,
    ) -> Result<u32, SrsError> {
        let clamped = cap.clamp(self.config.min_daily_cap, self.config.max_daily_cap);
        self.store.set_daily_cap(owner, clamped, now)?;
        Ok(clamped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_card_defaults() {
        let engine = SrsEngine::in_memory().unwrap();
        let now = Utc::now();
        let card = engine
            .register_card("learner-1", Some("book-1".to_string()), now)
            .unwrap();

        assert_eq!(card.status, CardStatus::New);
        assert_eq!(card.repetitions, 0);
        assert_eq!(card.interval, 0);
        assert!(card.is_due(now));

        let loaded = engine.get_card(&card.id, "learner-1").unwrap();
        assert_eq!(loaded.book_id.as_deref(), Some("book-1"));
    }

    #[test]
    fn test_get_card_enforces_ownership() {
        let engine = SrsEngine::in_memory().unwrap();
        let card = engine
            .register_card("learner-1", None, Utc::now())
            .unwrap();
        let err = engine.get_card(&card.id, "learner-2").unwrap_err();
        assert!(matches!(err, SrsError::NotOwner { .. }));
    }

    #[test]
    fn test_suspend_and_reactivate() {
        let engine = SrsEngine::in_memory().unwrap();
        let now = Utc::now();
        let card = engine.register_card("learner-1", None, now).unwrap();

        let suspended = engine
            .set_suspended(&card.id, "learner-1", true, now)
            .unwrap();
        assert_eq!(suspended.status, CardStatus::Suspended);

        let resumed = engine
            .set_suspended(&card.id, "learner-1", false, now)
            .unwrap();
        assert_eq!(resumed.status, CardStatus::New);
    }

    #[test]
    fn test_progress_defaults_before_first_review() {
        let engine = SrsEngine::in_memory().unwrap();
        let now = Utc::now();
        let progress = engine.progress("learner-1", now).unwrap();
        assert_eq!(progress.total_experience, 0);
        assert_eq!(progress.level, 1);
        assert_eq!(progress.daily_review_cap, 100);
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(SrsError::CardNotFound("x".into()).code(), "not_found");
        assert_eq!(
            SrsError::NotOwner {
                card_id: "x".into(),
                owner: "y".into()
            }
            .code(),
            "forbidden"
        );
        assert_eq!(SrsError::CardSuspended("x".into()).code(), "invalid_state");
        assert_eq!(SrsError::InvalidRating(7).code(), "invalid_state");
        assert_eq!(SrsError::Conflict("x".into()).code(), "conflict");
    }
}
