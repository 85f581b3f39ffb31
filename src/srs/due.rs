//! Due-set selection: which cards should be reviewed right now.
//!
//! Read-only. Overdue ordering falls out of sorting by due date ascending;
//! the overdue fields are computed at read time and never written back.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::models::Card;
use super::{SrsEngine, SrsError};

/// Query for the due set of one learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueQuery {
    pub owner: String,
    /// Maximum cards to return; defaults to the owner's daily cap.
    pub limit: Option<u32>,
    /// Restrict to cards authored from one book.
    pub book_id: Option<String>,
}

/// A due card plus its read-time overdue projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueCard {
    pub card: Card,
    pub is_overdue: bool,
    /// Whole days past the due date; 0 when not overdue.
    pub overdue_days: i64,
}

/// The due set and the day's budget against the owner's cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueSet {
    pub cards: Vec<DueCard>,
    pub daily_cap: u32,
    /// Reviews already completed during the current UTC day.
    pub reviewed_today: u32,
    pub remaining_today: u32,
}

impl SrsEngine {
    /// Cards eligible for review at `now`, most overdue first.
    pub fn due_cards(&self, query: &DueQuery, now: DateTime<Utc>) -> Result<DueSet, SrsError> {
        let daily_cap = self.daily_cap_for(&query.owner)?;
        let limit = query
            .limit
            .unwrap_or(daily_cap)
            .min(self.config().max_due_batch);

        let cards = self.store().due_cards(
            &query.owner,
            now,
            limit as usize,
            query.book_id.as_deref(),
        )?;
        let cards = cards
            .into_iter()
            .map(|card| {
                let is_overdue = card.due_at < now;
                let overdue_days = if is_overdue {
                    now.signed_duration_since(card.due_at).num_days()
                } else {
                    0
                };
                DueCard {
                    card,
                    is_overdue,
                    overdue_days,
                }
            })
            .collect();

        let day_start = now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        let reviewed_today =
            self.store()
                .count_reviews_between(&query.owner, day_start, day_start + Duration::days(1))?;

        Ok(DueSet {
            cards,
            daily_cap,
            reviewed_today,
            remaining_today: daily_cap.saturating_sub(reviewed_today),
        })
    }

    /// The owner's configured daily cap, silently clamped to the allowed
    /// range; the configured default when the owner has no progress row yet.
    pub(crate) fn daily_cap_for(&self, owner: &str) -> Result<u32, SrsError> {
        let config = self.config();
        let cap = self
            .store()
            .get_progress(owner)?
            .map(|p| p.daily_review_cap)
            .unwrap_or(config.default_daily_cap);
        Ok(cap.clamp(config.min_daily_cap, config.max_daily_cap))
    }
}
