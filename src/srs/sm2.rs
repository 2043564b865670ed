//! SM-2 variant grading table.
//!
//! Intervals are whole days; intra-day scheduling is not modelled.

use super::Grade;

pub const INITIAL_EASE: f64 = 2.5;
pub const MIN_EASE: f64 = 1.3;
pub const MAX_EASE: f64 = 3.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sm2Update {
    pub reps: u32,
    pub interval_days: i64,
    pub ease: f64,
    pub lapses: u32,
}

/// Pure grading step: `(interval, ease, reps, lapses) × grade → next tuple`.
pub fn schedule(
    grade: Grade,
    interval_days: i64,
    ease: f64,
    reps: u32,
    lapses: u32,
) -> Sm2Update {
    match grade {
        Grade::Again => Sm2Update {
            reps: 0,
            interval_days: 1,
            ease: (ease - 0.20).max(MIN_EASE),
            lapses: lapses + 1,
        },
        Grade::Hard => {
            let new_ease = (ease - 0.15).max(MIN_EASE);
            let interval = match reps {
                0 => 1,
                1 => 3,
                _ => scale_interval(interval_days, new_ease.max(1.2)),
            };
            Sm2Update {
                reps: reps + 1,
                interval_days: interval,
                ease: new_ease,
                lapses,
            }
        }
        Grade::Good => {
            let interval = match reps {
                0 => 1,
                1 => 3,
                _ => scale_interval(interval_days, ease),
            };
            Sm2Update {
                reps: reps + 1,
                interval_days: interval,
                ease,
                lapses,
            }
        }
        Grade::Easy => {
            let interval = match reps {
                0 => 2,
                1 => 5,
                _ => scale_interval(interval_days, ease * 1.3),
            };
            Sm2Update {
                reps: reps + 1,
                interval_days: interval,
                ease: (ease + 0.10).min(MAX_EASE),
                lapses,
            }
        }
    }
}

fn scale_interval(interval_days: i64, factor: f64) -> i64 {
    ((interval_days.max(1) as f64) * factor).ceil() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_goods_on_a_new_card_reach_three_days() {
        let first = schedule(Grade::Good, 0, INITIAL_EASE, 0, 0);
        assert_eq!(first.reps, 1);
        assert_eq!(first.interval_days, 1);
        assert!((first.ease - 2.5).abs() < f64::EPSILON);

        let second = schedule(Grade::Good, first.interval_days, first.ease, first.reps, 0);
        assert_eq!(second.reps, 2);
        assert_eq!(second.interval_days, 3);
        assert!((second.ease - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn mature_good_multiplies_by_ease() {
        let update = schedule(Grade::Good, 3, 2.5, 2, 0);
        assert_eq!(update.interval_days, 8); // ceil(3 * 2.5)
    }

    #[test]
    fn again_resets_reps_and_counts_a_lapse() {
        let update = schedule(Grade::Again, 10, 2.5, 5, 2);
        assert_eq!(update.reps, 0);
        assert_eq!(update.interval_days, 1);
        assert_eq!(update.lapses, 3);
        assert!((update.ease - 2.3).abs() < 1e-9);
    }

    #[test]
    fn ease_never_drops_below_floor() {
        let update = schedule(Grade::Again, 1, 1.35, 0, 0);
        assert!((update.ease - MIN_EASE).abs() < 1e-9);

        let hard = schedule(Grade::Hard, 1, 1.31, 3, 0);
        assert!((hard.ease - MIN_EASE).abs() < 1e-9);
    }

    #[test]
    fn hard_uses_dampened_multiplier() {
        // ease 1.3 经 hard 扣减后夹在下限，但乘数不低于 1.2
        let update = schedule(Grade::Hard, 10, MIN_EASE, 4, 0);
        assert_eq!(update.interval_days, 13); // ceil(10 * 1.3)
    }

    #[test]
    fn easy_boosts_and_caps_ease() {
        let fresh = schedule(Grade::Easy, 0, 2.5, 0, 0);
        assert_eq!(fresh.interval_days, 2);
        assert!((fresh.ease - 2.6).abs() < 1e-9);

        let capped = schedule(Grade::Easy, 5, 3.45, 3, 0);
        assert!((capped.ease - MAX_EASE).abs() < 1e-9);
    }

    #[test]
    fn second_review_intervals_match_table() {
        assert_eq!(schedule(Grade::Hard, 1, 2.5, 1, 0).interval_days, 3);
        assert_eq!(schedule(Grade::Good, 1, 2.5, 1, 0).interval_days, 3);
        assert_eq!(schedule(Grade::Easy, 1, 2.5, 1, 0).interval_days, 5);
    }
}
