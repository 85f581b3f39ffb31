//! Level curve for learner progress.
//!
//! Quadratic requirement: level n is reached at 100 * (n - 1)^2 total
//! experience, so each level costs progressively more than the last.

const LEVEL_UNIT_EXPERIENCE: u64 = 100;

/// Level for a given amount of total experience. Levels start at 1.
pub fn level_from_experience(experience: u64) -> u32 {
    ((experience / LEVEL_UNIT_EXPERIENCE) as f64).sqrt() as u32 + 1
}

/// Total experience required to reach a level.
pub fn experience_for_level(level: u32) -> u64 {
    let steps = u64::from(level.saturating_sub(1));
    LEVEL_UNIT_EXPERIENCE * steps * steps
}

/// Experience still missing until the next level.
pub fn experience_to_next_level(experience: u64) -> u64 {
    let next = level_from_experience(experience) + 1;
    experience_for_level(next).saturating_sub(experience)
}
