//! Review transaction orchestrator.
//!
//! Validates the submission, runs the pure scheduling pipeline
//! (scheduler -> status machine -> reward), then applies the result as one
//! atomic unit of work: card rewrite, review-record append, and progress
//! upsert commit together or not at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::{Card, CardStatus, ReviewRecord, ScheduleSnapshot};
use super::scheduler::{self, Rating, SchedulerState};
use super::{leveling, reward, status, SrsEngine, SrsError};

/// One review submission from the client layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReviewRequest {
    pub card_id: String,
    pub owner: String,
    /// Rating on the 1-4 scale (Again/Hard/Good/Easy).
    pub rating: i32,
    /// How long the learner took to answer, if measured.
    pub response_time_ms: Option<i64>,
}

/// Snapshot returned after a committed review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub card: Card,
    pub review_id: String,
    pub rating: i32,
    pub is_lapse: bool,
    pub experience_awarded: u32,
    pub total_experience: u64,
    pub level: u32,
    pub leveled_up: bool,
    /// The card crossed the mastery threshold with this review.
    pub newly_mastered: bool,
}

impl SrsEngine {
    /// Apply one review to a card.
    ///
    /// Validation failures (unknown card, wrong owner, suspended card, bad
    /// rating or response time) surface before anything is written. A
    /// `Conflict` means another review of the same card committed between
    /// our read and write; the caller may retry. Any storage failure leaves
    /// no partial state behind.
    pub fn submit_review(
        &self,
        request: &SubmitReviewRequest,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, SrsError> {
        let rating = Rating::from_value(request.rating)
            .ok_or(SrsError::InvalidRating(request.rating))?;
        if let Some(ms) = request.response_time_ms {
            if ms <= 0 {
                return Err(SrsError::InvalidResponseTime(ms));
            }
        }

        let card = self
            .store()
            .get_card(&request.card_id)?
            .ok_or_else(|| SrsError::CardNotFound(request.card_id.clone()))?;
        if card.owner != request.owner {
            return Err(SrsError::NotOwner {
                card_id: card.id,
                owner: request.owner.clone(),
            });
        }
        if card.status == CardStatus::Suspended {
            return Err(SrsError::CardSuspended(card.id));
        }

        let before = ScheduleSnapshot {
            ease_factor: card.ease_factor,
            interval: card.interval,
            repetitions: card.repetitions,
        };
        let scheduled = scheduler::next_state(
            SchedulerState {
                ease_factor: card.ease_factor,
                interval: card.interval,
                repetitions: card.repetitions,
            },
            rating,
            now,
        );
        let next_status = status::next_status(
            card.status,
            scheduled.repetitions,
            scheduled.interval,
            scheduled.is_lapse,
        );
        let experience = reward::experience_for(rating, self.config().base_experience);
        let was_mastered = reward::is_mastered(card.repetitions, card.interval);

        let mut updated = card.clone();
        updated.ease_factor = scheduled.ease_factor;
        updated.interval = scheduled.interval;
        updated.repetitions = scheduled.repetitions;
        updated.due_at = scheduled.due_at;
        updated.status = next_status;
        updated.total_reviews += 1;
        if rating.is_correct() {
            updated.correct_reviews += 1;
        }
        updated.updated_at = now;
        updated.version = card.version + 1;

        let record = ReviewRecord {
            id: Uuid::new_v4().to_string(),
            card_id: updated.id.clone(),
            owner: updated.owner.clone(),
            rating: rating.value(),
            response_time_ms: request.response_time_ms,
            reviewed_at: now,
            before,
            after: ScheduleSnapshot {
                ease_factor: scheduled.ease_factor,
                interval: scheduled.interval,
                repetitions: scheduled.repetitions,
            },
        };

        let progress = self.store().apply_review(
            &updated,
            card.version,
            &record,
            experience,
            self.config().default_daily_cap,
        )?;

        let previous_level =
            leveling::level_from_experience(progress.total_experience - u64::from(experience));
        let newly_mastered =
            !was_mastered && reward::is_mastered(updated.repetitions, updated.interval);

        tracing::debug!(
            card_id = %updated.id,
            rating = rating.value(),
            lapse = scheduled.is_lapse,
            interval = scheduled.interval,
            "review applied"
        );

        Ok(ReviewOutcome {
            card: updated,
            review_id: record.id,
            rating: rating.value(),
            is_lapse: scheduled.is_lapse,
            experience_awarded: experience,
            total_experience: progress.total_experience,
            level: progress.level,
            leveled_up: progress.level > previous_level,
            newly_mastered,
        })
    }
}
