//! SM-2 scheduling core.
//!
//! Pure functions over explicit inputs: the same (state, rating, now)
//! always produces the same schedule. No clock reads, no storage.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Floor below which the ease factor never drops.
pub const MIN_EASE_FACTOR: f32 = 1.3;

/// Ease factor assigned to never-reviewed cards.
pub const DEFAULT_EASE_FACTOR: f32 = 2.5;

/// Fixed ease penalty applied on a lapse.
const LAPSE_EASE_PENALTY: f32 = 0.2;

/// Learner rating for one review, on the 1-4 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            1 => Some(Rating::Again),
            2 => Some(Rating::Hard),
            3 => Some(Rating::Good),
            4 => Some(Rating::Easy),
            _ => None,
        }
    }

    pub fn value(self) -> i32 {
        match self {
            Rating::Again => 1,
            Rating::Hard => 2,
            Rating::Good => 3,
            Rating::Easy => 4,
        }
    }

    /// Ratings of 3 and up count as a successful recall.
    pub fn is_correct(self) -> bool {
        matches!(self, Rating::Good | Rating::Easy)
    }
}

/// Scheduling fields the algorithm reads and rewrites.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerState {
    pub ease_factor: f32,
    pub interval: i32,
    pub repetitions: i32,
}

/// Result of scheduling one review.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduled {
    pub ease_factor: f32,
    pub interval: i32,
    pub repetitions: i32,
    pub due_at: DateTime<Utc>,
    pub is_lapse: bool,
}

/// Compute the next scheduling state for a card.
///
/// A rating below Good is a lapse: repetitions reset, the card comes back
/// tomorrow, and the ease factor takes a fixed penalty (floored at 1.3).
/// On success the interval follows the SM-2 ladder 1 / 6 /
/// round(interval * EF'), where EF' is adjusted by the canonical
/// quality-delta formula and never drops below the floor.
pub fn next_state(current: SchedulerState, rating: Rating, now: DateTime<Utc>) -> Scheduled {
    if !rating.is_correct() {
        let ease_factor = (current.ease_factor - LAPSE_EASE_PENALTY).max(MIN_EASE_FACTOR);
        return Scheduled {
            ease_factor,
            interval: 1,
            repetitions: 0,
            due_at: now + Duration::days(1),
            is_lapse: true,
        };
    }

    let repetitions = current.repetitions + 1;

    // EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))
    let q = if rating == Rating::Easy { 5.0_f32 } else { 4.0 };
    let ease_factor = (current.ease_factor + 0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02))
        .max(MIN_EASE_FACTOR);

    let interval = match repetitions {
        1 => 1,
        2 => 6,
        _ => (current.interval as f32 * ease_factor).round() as i32,
    };

    Scheduled {
        ease_factor,
        interval,
        repetitions,
        due_at: now + Duration::days(interval as i64),
        is_lapse: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> SchedulerState {
        SchedulerState {
            ease_factor: DEFAULT_EASE_FACTOR,
            interval: 0,
            repetitions: 0,
        }
    }

    #[test]
    fn test_rating_from_value() {
        assert_eq!(Rating::from_value(1), Some(Rating::Again));
        assert_eq!(Rating::from_value(4), Some(Rating::Easy));
        assert_eq!(Rating::from_value(0), None);
        assert_eq!(Rating::from_value(5), None);
    }

    #[test]
    fn test_first_review_good() {
        let now = Utc::now();
        let result = next_state(fresh(), Rating::Good, now);
        assert!(!result.is_lapse);
        assert_eq!(result.repetitions, 1);
        assert_eq!(result.interval, 1);
        assert_eq!(result.due_at, now + Duration::days(1));
    }

    #[test]
    fn test_second_review_good() {
        let now = Utc::now();
        let first = next_state(fresh(), Rating::Good, now);
        let second = next_state(
            SchedulerState {
                ease_factor: first.ease_factor,
                interval: first.interval,
                repetitions: first.repetitions,
            },
            Rating::Good,
            now,
        );
        assert_eq!(second.repetitions, 2);
        assert_eq!(second.interval, 6);
    }

    #[test]
    fn test_third_review_multiplies_by_ease() {
        let now = Utc::now();
        let state = SchedulerState {
            ease_factor: 2.5,
            interval: 6,
            repetitions: 2,
        };
        let result = next_state(state, Rating::Good, now);
        assert_eq!(result.repetitions, 3);
        // 6 * 2.5 = 15 (Good leaves the ease factor unchanged)
        assert_eq!(result.interval, 15);
    }

    #[test]
    fn test_lapse_resets_repetitions() {
        let now = Utc::now();
        let state = SchedulerState {
            ease_factor: 2.5,
            interval: 30,
            repetitions: 5,
        };
        let result = next_state(state, Rating::Again, now);
        assert!(result.is_lapse);
        assert_eq!(result.repetitions, 0);
        assert_eq!(result.interval, 1);
        assert_eq!(result.due_at, now + Duration::days(1));
        assert!(result.ease_factor < 2.5);
    }

    #[test]
    fn test_hard_is_a_lapse() {
        let now = Utc::now();
        let state = SchedulerState {
            ease_factor: 2.5,
            interval: 10,
            repetitions: 3,
        };
        let result = next_state(state, Rating::Hard, now);
        assert!(result.is_lapse);
        assert_eq!(result.repetitions, 0);
        assert_eq!(result.interval, 1);
    }

    #[test]
    fn test_easy_increases_ease() {
        let now = Utc::now();
        let result = next_state(fresh(), Rating::Easy, now);
        assert!(result.ease_factor > DEFAULT_EASE_FACTOR);
    }

    #[test]
    fn test_good_keeps_ease() {
        let now = Utc::now();
        let result = next_state(fresh(), Rating::Good, now);
        assert!((result.ease_factor - DEFAULT_EASE_FACTOR).abs() < 0.001);
    }

    #[test]
    fn test_ease_never_below_floor() {
        let now = Utc::now();
        let mut state = SchedulerState {
            ease_factor: 1.3,
            interval: 10,
            repetitions: 4,
        };
        for _ in 0..10 {
            let result = next_state(state, Rating::Again, now);
            assert!(result.ease_factor >= MIN_EASE_FACTOR);
            state = SchedulerState {
                ease_factor: result.ease_factor,
                interval: result.interval,
                repetitions: result.repetitions,
            };
        }
        assert!((state.ease_factor - MIN_EASE_FACTOR).abs() < 0.001);
    }

    #[test]
    fn test_first_success_from_zero_interval() {
        let now = Utc::now();
        let state = SchedulerState {
            ease_factor: 2.5,
            interval: 0,
            repetitions: 0,
        };
        let result = next_state(state, Rating::Good, now);
        assert_eq!(result.interval, 1);
    }

    #[test]
    fn test_deterministic() {
        let now = Utc::now();
        let state = SchedulerState {
            ease_factor: 2.17,
            interval: 13,
            repetitions: 3,
        };
        let a = next_state(state, Rating::Easy, now);
        let b = next_state(state, Rating::Easy, now);
        assert_eq!(a, b);
    }

    #[test]
    fn test_interval_grows_over_successes() {
        let now = Utc::now();
        let mut state = fresh();
        let mut last_interval = 0;
        for i in 0..5 {
            let result = next_state(state, Rating::Good, now);
            match i {
                0 => assert_eq!(result.interval, 1),
                1 => assert_eq!(result.interval, 6),
                _ => assert!(result.interval > last_interval),
            }
            last_interval = result.interval;
            state = SchedulerState {
                ease_factor: result.ease_factor,
                interval: result.interval,
                repetitions: result.repetitions,
            };
        }
        assert!(last_interval > 30);
    }
}
