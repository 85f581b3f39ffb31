//! Statistics derived from the review log.
//!
//! Everything here is computed by folding review records (the system of
//! record), never by trusting a cached projection: retention, per-day
//! history buckets, and calendar-day streaks. Days are bucketed by the UTC
//! calendar date of the review, not local time.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{SrsEngine, SrsError};

/// One UTC calendar day of review activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewHistoryDay {
    pub date: NaiveDate,
    pub reviewed: u32,
    pub correct: u32,
    pub incorrect: u32,
}

impl ReviewHistoryDay {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            reviewed: 0,
            correct: 0,
            incorrect: 0,
        }
    }
}

/// Consecutive-day review streaks for one learner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSummary {
    pub current: u32,
    pub longest: u32,
    pub last_review_date: Option<NaiveDate>,
}

/// Aggregate statistics response for one learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerStatistics {
    pub owner: String,
    pub total_reviews: u64,
    pub correct_reviews: u64,
    /// Percentage of correct reviews, rounded to two decimals; 0 when
    /// there are no reviews at all.
    pub retention_rate: f64,
    pub history: Vec<ReviewHistoryDay>,
    pub streak: StreakSummary,
}

/// Retention percentage, rounded to two decimals. Defined as 0 for an
/// empty history rather than NaN.
pub fn retention_rate(correct: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = correct as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Dense per-day buckets for the `window_days` UTC days ending at `today`.
///
/// Every day in the window appears exactly once, zero-filled when nothing
/// was reviewed. Reviews outside the window are ignored.
pub fn build_review_history(
    reviews: &[(DateTime<Utc>, bool)],
    window_days: u32,
    today: NaiveDate,
) -> Vec<ReviewHistoryDay> {
    let mut days: Vec<ReviewHistoryDay> = (0..i64::from(window_days))
        .rev()
        .map(|back| ReviewHistoryDay::empty(today - Duration::days(back)))
        .collect();
    if days.is_empty() {
        return days;
    }

    let start = days[0].date;
    for (reviewed_at, correct) in reviews {
        let date = reviewed_at.date_naive();
        if date < start || date > today {
            continue;
        }
        let idx = date.signed_duration_since(start).num_days() as usize;
        let day = &mut days[idx];
        day.reviewed += 1;
        if *correct {
            day.correct += 1;
        } else {
            day.incorrect += 1;
        }
    }

    days
}

/// Streaks over the set of distinct UTC days that saw at least one review.
///
/// The current streak is anchored at `today`, or at yesterday if nothing
/// was reviewed today yet; otherwise it is 0. The longest streak is the
/// longest run anywhere in the history, ongoing or not.
pub fn compute_streak<I>(review_days: I, today: NaiveDate) -> StreakSummary
where
    I: IntoIterator<Item = NaiveDate>,
{
    let days: BTreeSet<NaiveDate> = review_days.into_iter().collect();
    let last_review_date = days.iter().next_back().copied();

    let mut longest = 0u32;
    let mut run = 0u32;
    let mut prev: Option<NaiveDate> = None;
    for &day in &days {
        run = match prev {
            Some(p) if day.signed_duration_since(p).num_days() == 1 => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        prev = Some(day);
    }

    let anchor = if days.contains(&today) {
        Some(today)
    } else if days.contains(&(today - Duration::days(1))) {
        Some(today - Duration::days(1))
    } else {
        None
    };

    let mut current = 0u32;
    if let Some(anchor) = anchor {
        let mut day = anchor;
        while days.contains(&day) {
            current += 1;
            day = day - Duration::days(1);
        }
    }

    StreakSummary {
        current,
        longest,
        last_review_date,
    }
}

impl SrsEngine {
    /// Statistics for one learner over a trailing window of UTC days.
    ///
    /// Read-only; safe to retry freely.
    pub fn statistics(
        &self,
        owner: &str,
        window_days: u32,
        book_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<LearnerStatistics, SrsError> {
        let today = now.date_naive();
        let (total_reviews, correct_reviews) = self.store().review_counts(owner, book_id)?;

        let window_start = today - Duration::days(i64::from(window_days).saturating_sub(1));
        let since = window_start.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let windowed: Vec<(DateTime<Utc>, bool)> = self
            .store()
            .review_log(owner, Some(since), book_id)?
            .into_iter()
            .map(|(at, rating)| (at, rating >= 3))
            .collect();
        let history = build_review_history(&windowed, window_days, today);

        let streak = compute_streak(self.store().review_days(owner, book_id)?, today);

        Ok(LearnerStatistics {
            owner: owner.to_string(),
            total_reviews,
            correct_reviews,
            retention_rate: retention_rate(correct_reviews, total_reviews),
            history,
            streak,
        })
    }
}
