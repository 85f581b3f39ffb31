use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scheduler::DEFAULT_EASE_FACTOR;

/// Lifecycle status of a card in the scheduling rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    /// Never reviewed
    #[default]
    New,
    /// In the initial learning phase
    Learning,
    /// Graduated to regular spaced review
    Review,
    /// Excluded from the rotation until explicitly reactivated
    Suspended,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::New => "new",
            CardStatus::Learning => "learning",
            CardStatus::Review => "review",
            CardStatus::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(CardStatus::New),
            "learning" => Some(CardStatus::Learning),
            "review" => Some(CardStatus::Review),
            "suspended" => Some(CardStatus::Suspended),
            _ => None,
        }
    }
}

/// Scheduling state for one learning item, owned by a single learner.
///
/// This row is a denormalized projection of the review log, kept so due-set
/// queries don't have to fold the full history. It is mutated only by the
/// review orchestrator (and the suspend switch), never by readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub owner: String,
    /// Source book this card was authored from, if any.
    pub book_id: Option<String>,
    /// Multiplier controlling interval growth; never below 1.3.
    pub ease_factor: f32,
    /// Days until the next review after the last successful one.
    pub interval: i32,
    /// Consecutive successful reviews since the last lapse.
    pub repetitions: i32,
    pub due_at: DateTime<Utc>,
    pub status: CardStatus,
    pub total_reviews: u32,
    pub correct_reviews: u32,
    /// Write-versioning token; bumped on every committed mutation.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    pub fn new(owner: String, book_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner,
            book_id,
            ease_factor: DEFAULT_EASE_FACTOR,
            interval: 0,
            repetitions: 0,
            due_at: now,
            status: CardStatus::New,
            total_reviews: 0,
            correct_reviews: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

/// Scheduling fields captured on a review record, before and after.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub ease_factor: f32,
    pub interval: i32,
    pub repetitions: i32,
}

/// One submitted review. Append-only: never updated or deleted once
/// written. The review log is the system of record for all statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: String,
    pub card_id: String,
    pub owner: String,
    /// Rating on the 1-4 scale (Again/Hard/Good/Easy).
    pub rating: i32,
    pub response_time_ms: Option<i64>,
    pub reviewed_at: DateTime<Utc>,
    pub before: ScheduleSnapshot,
    pub after: ScheduleSnapshot,
}

/// Aggregate progress for one learner, created lazily on first review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerProgress {
    pub owner: String,
    pub total_experience: u64,
    pub level: u32,
    /// Reviews the learner aims to complete per UTC day.
    pub daily_review_cap: u32,
    pub last_activity: DateTime<Utc>,
}
