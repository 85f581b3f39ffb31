//! Card lifecycle state machine, driven by scheduler output.

use super::models::CardStatus;

/// Repetitions needed to graduate out of the learning phase.
const GRADUATION_REPETITIONS: i32 = 2;

/// Minimum interval (days) required for graduation.
const GRADUATION_INTERVAL_DAYS: i32 = 1;

/// Next lifecycle status after a review.
///
/// Any lapse drops the card back to Learning, whatever it was before.
/// Suspension is toggled by the owner outside the review flow; a suspended
/// card is rejected before scheduling runs, so the Suspended arm is a
/// pass-through.
pub fn next_status(
    current: CardStatus,
    new_repetitions: i32,
    new_interval: i32,
    is_lapse: bool,
) -> CardStatus {
    if is_lapse {
        return CardStatus::Learning;
    }

    match current {
        CardStatus::New => CardStatus::Learning,
        CardStatus::Learning => {
            if new_repetitions >= GRADUATION_REPETITIONS && new_interval >= GRADUATION_INTERVAL_DAYS
            {
                CardStatus::Review
            } else {
                CardStatus::Learning
            }
        }
        CardStatus::Review => CardStatus::Review,
        CardStatus::Suspended => CardStatus::Suspended,
    }
}

/// Status a card resumes with when the owner lifts a suspension.
///
/// Re-derived from the scheduling fields so a card that had graduated goes
/// straight back to Review instead of repeating the learning phase.
pub fn reactivated_status(total_reviews: u32, repetitions: i32, interval: i32) -> CardStatus {
    if total_reviews == 0 {
        CardStatus::New
    } else if repetitions >= GRADUATION_REPETITIONS && interval >= GRADUATION_INTERVAL_DAYS {
        CardStatus::Review
    } else {
        CardStatus::Learning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lapse_always_returns_to_learning() {
        for status in [CardStatus::New, CardStatus::Learning, CardStatus::Review] {
            assert_eq!(next_status(status, 0, 1, true), CardStatus::Learning);
        }
    }

    #[test]
    fn test_new_graduates_to_learning_on_success() {
        assert_eq!(next_status(CardStatus::New, 1, 1, false), CardStatus::Learning);
    }

    #[test]
    fn test_learning_graduates_to_review() {
        assert_eq!(
            next_status(CardStatus::Learning, 2, 6, false),
            CardStatus::Review
        );
    }

    #[test]
    fn test_learning_stays_below_graduation_threshold() {
        assert_eq!(
            next_status(CardStatus::Learning, 1, 1, false),
            CardStatus::Learning
        );
    }

    #[test]
    fn test_review_stays_on_success() {
        assert_eq!(
            next_status(CardStatus::Review, 7, 40, false),
            CardStatus::Review
        );
    }

    #[test]
    fn test_reactivated_status() {
        assert_eq!(reactivated_status(0, 0, 0), CardStatus::New);
        assert_eq!(reactivated_status(3, 1, 1), CardStatus::Learning);
        assert_eq!(reactivated_status(8, 4, 12), CardStatus::Review);
    }
}
