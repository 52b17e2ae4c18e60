//! XP and streak arithmetic for practice sessions.

use chrono::{DateTime, Utc};

use crate::model::CefrLevel;

/// XP earned for a session:
/// `round(base * clamp(score/50, 0.5, 2.0) * level_multiplier)`, floored at 1.
pub fn xp_earned(base: u32, overall: u8, level: CefrLevel) -> i64 {
    let score_multiplier = (f64::from(overall) / 50.0).clamp(0.5, 2.0);
    let raw = f64::from(base) * score_multiplier * level.xp_multiplier();
    (raw.round() as i64).max(1)
}

/// Whole days between the last activity and now, by calendar date.
pub fn days_since(last_activity: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now.date_naive() - last_activity.date_naive()).num_days()
}

/// Streak update rule: same day → unchanged; exactly one day gap → +1;
/// longer gap → reset to 1.
pub fn next_streak(previous: i64, days_gap: i64) -> i64 {
    match days_gap {
        0 => previous,
        1 => previous + 1,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn xp_matches_documented_scenario() {
        // B1 user, overall 78: round(10 * 1.56 * 1.3) = 20
        assert_eq!(xp_earned(10, 78, CefrLevel::B1), 20);
    }

    #[test]
    fn xp_score_multiplier_is_clamped() {
        // Score 10 → 0.2, clamped to 0.5: round(10 * 0.5 * 1.0) = 5
        assert_eq!(xp_earned(10, 10, CefrLevel::A0), 5);
        // Score 100 → 2.0 exactly: round(10 * 2.0 * 1.6) = 32
        assert_eq!(xp_earned(10, 100, CefrLevel::C2), 32);
    }

    #[test]
    fn xp_is_floored_at_one() {
        assert_eq!(xp_earned(0, 0, CefrLevel::A0), 1);
        assert_eq!(xp_earned(1, 0, CefrLevel::A0), 1);
    }

    #[test]
    fn xp_grows_with_level_at_equal_score() {
        let low = xp_earned(10, 80, CefrLevel::A0);
        let high = xp_earned(10, 80, CefrLevel::C2);
        assert!(high > low);
    }

    #[test]
    fn streak_rule_is_deterministic() {
        assert_eq!(next_streak(5, 0), 5);
        assert_eq!(next_streak(5, 1), 6);
        assert_eq!(next_streak(5, 2), 1);
        assert_eq!(next_streak(5, 30), 1);
        assert_eq!(next_streak(0, 1), 1);
        // A first session on the signup day does not start a streak.
        assert_eq!(next_streak(0, 0), 0);
    }

    #[test]
    fn days_since_uses_calendar_dates() {
        let late_night = Utc.with_ymd_and_hms(2025, 3, 1, 23, 50, 0).unwrap();
        let early_morning = Utc.with_ymd_and_hms(2025, 3, 2, 0, 10, 0).unwrap();
        // 20 minutes apart but across midnight — counts as a one-day gap.
        assert_eq!(days_since(late_night, early_morning), 1);

        let same_day = Utc.with_ymd_and_hms(2025, 3, 2, 12, 0, 0).unwrap();
        assert_eq!(days_since(early_morning, same_day), 0);
    }
}
