//! SM-2 Spaced Repetition Algorithm
//!
//! Implementation of the SuperMemo 2 algorithm for calculating
//! optimal review intervals based on user performance.
//!
//! Quality ratings (0-5):
//! - 0: Complete blackout, no recall
//! - 1: Incorrect, but upon seeing answer, remembered
//! - 2: Incorrect, but answer seemed easy to recall
//! - 3: Correct response with serious difficulty
//! - 4: Correct response after hesitation
//! - 5: Perfect response with no hesitation

use chrono::{DateTime, Duration, Utc};

use super::models::{CardSchedule, CardStatus};

/// Minimum ease factor allowed
const MIN_EASE_FACTOR: f32 = 1.3;

/// Result of calculating the next review
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub repetitions: i32,
    pub interval: i32,
    pub ease_factor: f32,
    pub due_date: DateTime<Utc>,
    pub status: CardStatus,
}

/// Calculate the next review interval and ease factor using SM-2.
///
/// Pure function of the current schedule and the quality rating — no I/O,
/// no stored state.
///
/// On a passing review (quality >= 3) the interval progresses 1 -> 6 ->
/// round(interval * ease) and the ease factor is adjusted by the standard
/// SM-2 formula, floored at 1.3. On a failed review the repetition count
/// and interval reset; the ease factor is left untouched.
pub fn next_review(schedule: &CardSchedule, quality: i32) -> ReviewOutcome {
    // Clamp quality to valid range
    let quality = quality.clamp(0, 5);

    let mut ease_factor = schedule.ease_factor;
    let mut interval = schedule.interval;
    let repetitions;
    let status;

    if quality >= 3 {
        // Correct response
        match schedule.repetitions {
            0 => {
                // First review: 1 day
                interval = 1;
                status = CardStatus::Learning;
            }
            1 => {
                // Second review: 6 days
                interval = 6;
                status = CardStatus::Review;
            }
            _ => {
                // Subsequent reviews: multiply by ease factor
                interval = (interval as f32 * ease_factor).round() as i32;
                status = CardStatus::Review;
            }
        }

        repetitions = schedule.repetitions + 1;

        // Update ease factor based on quality
        // EF' = EF + (0.1 - (5-q) * (0.08 + (5-q) * 0.02))
        ease_factor = ease_factor
            + (0.1 - (5 - quality) as f32 * (0.08 + (5 - quality) as f32 * 0.02));

        // Ensure minimum ease factor
        ease_factor = ease_factor.max(MIN_EASE_FACTOR);
    } else {
        // Incorrect response - reset progress, ease factor stays put
        repetitions = 0;
        interval = 1;

        if schedule.status == CardStatus::Review {
            status = CardStatus::Relearning;
        } else {
            status = CardStatus::Learning;
        }
    }

    // Calculate due date
    let due_date = Utc::now() + Duration::days(interval as i64);

    ReviewOutcome {
        repetitions,
        interval,
        ease_factor,
        due_date,
        status,
    }
}

/// Calculate the preview intervals for each quality rating
/// Used to show users what interval each rating would give
pub fn preview_intervals(schedule: &CardSchedule) -> [i32; 4] {
    // Returns intervals for ratings: Again (1), Hard (2), Good (3), Easy (4)
    // Mapped from SM-2 quality ratings: 1, 3, 4, 5

    let again = next_review(schedule, 1).interval;
    let hard = next_review(schedule, 3).interval;
    let good = next_review(schedule, 4).interval;
    let easy = next_review(schedule, 5).interval;

    [again, hard, good, easy]
}

/// Map UI rating (1-4: Again, Hard, Good, Easy) to SM-2 quality (0-5)
pub fn ui_rating_to_quality(rating: i32) -> i32 {
    match rating {
        1 => 1, // Again -> quality 1 (incorrect but recognized)
        2 => 3, // Hard -> quality 3 (correct with difficulty)
        3 => 4, // Good -> quality 4 (correct with hesitation)
        4 => 5, // Easy -> quality 5 (perfect)
        _ => 3, // Default to Good
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn new_schedule() -> CardSchedule {
        CardSchedule::new(Uuid::new_v4())
    }

    #[test]
    fn test_first_review_perfect() {
        let schedule = new_schedule();
        let result = next_review(&schedule, 5);

        // (rep=0, ef=2.5, interval=0) -> (rep=1, ef=2.6, interval=1)
        assert_eq!(result.repetitions, 1);
        assert_eq!(result.interval, 1);
        assert!((result.ease_factor - 2.6).abs() < 1e-6);
        assert_eq!(result.status, CardStatus::Learning);
    }

    #[test]
    fn test_second_review_correct() {
        let mut schedule = new_schedule();
        schedule.repetitions = 1;
        schedule.interval = 1;
        schedule.ease_factor = 2.6;

        let result = next_review(&schedule, 4);

        assert_eq!(result.repetitions, 2);
        assert_eq!(result.interval, 6);
        assert!((result.ease_factor - 2.6).abs() < 0.01);
        assert_eq!(result.status, CardStatus::Review);
    }

    #[test]
    fn test_subsequent_review_multiplies_interval() {
        let mut schedule = new_schedule();
        schedule.repetitions = 5;
        schedule.interval = 10;
        schedule.ease_factor = 2.5;

        let result = next_review(&schedule, 4);

        // 10 * 2.5 = 25
        assert_eq!(result.interval, 25);
        assert_eq!(result.repetitions, 6);
    }

    #[test]
    fn test_review_incorrect_resets_but_keeps_ease() {
        let mut schedule = new_schedule();
        schedule.repetitions = 2;
        schedule.interval = 6;
        schedule.ease_factor = 2.6;
        schedule.status = CardStatus::Review;

        let result = next_review(&schedule, 2);

        assert_eq!(result.repetitions, 0);
        assert_eq!(result.interval, 1);
        assert!((result.ease_factor - 2.6).abs() < 1e-6);
        assert_eq!(result.status, CardStatus::Relearning);
    }

    #[test]
    fn test_ease_factor_never_below_minimum() {
        for quality in 0..=5 {
            let mut schedule = new_schedule();
            schedule.ease_factor = MIN_EASE_FACTOR;
            schedule.repetitions = 3;
            schedule.interval = 10;

            let result = next_review(&schedule, quality);
            assert!(
                result.ease_factor >= MIN_EASE_FACTOR,
                "quality {} dropped ease factor to {}",
                quality,
                result.ease_factor
            );
        }
    }

    #[test]
    fn test_fail_resets_regardless_of_prior_state() {
        for quality in 0..3 {
            let mut schedule = new_schedule();
            schedule.repetitions = 12;
            schedule.interval = 180;
            schedule.ease_factor = 2.1;

            let result = next_review(&schedule, quality);
            assert_eq!(result.repetitions, 0);
            assert_eq!(result.interval, 1);
        }
    }

    #[test]
    fn test_quality_is_clamped() {
        let schedule = new_schedule();
        let result = next_review(&schedule, 9);

        // Treated as quality 5
        assert_eq!(result.repetitions, 1);
        assert!((result.ease_factor - 2.6).abs() < 1e-6);
    }

    #[test]
    fn test_preview_intervals_for_new_card() {
        let schedule = new_schedule();
        let [again, hard, good, easy] = preview_intervals(&schedule);

        assert_eq!(again, 1);
        assert_eq!(hard, 1);
        assert_eq!(good, 1);
        assert_eq!(easy, 1);
    }

    #[test]
    fn test_ui_rating_mapping() {
        assert_eq!(ui_rating_to_quality(1), 1);
        assert_eq!(ui_rating_to_quality(2), 3);
        assert_eq!(ui_rating_to_quality(3), 4);
        assert_eq!(ui_rating_to_quality(4), 5);
        assert_eq!(ui_rating_to_quality(0), 3);
    }
}
