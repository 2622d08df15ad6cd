//! Escalation policy: warning count to timeout duration.
//!
//! | count | timeout |
//! |-------|---------|
//! | 1     | 10m     |
//! | 2     | 1h      |
//! | 3     | 3h      |
//! | 4+    | 6h      |
//!
//! Counts of zero are looked up as count 1, so a timeout is never zero length.

use std::time::Duration;

/// Warning count at which the maximum timeout applies.
pub const MAX_ESCALATION_LEVEL: u32 = 4;

const TIMEOUT_LEVELS: [Duration; MAX_ESCALATION_LEVEL as usize] = [
    Duration::from_secs(10 * 60),
    Duration::from_secs(60 * 60),
    Duration::from_secs(3 * 60 * 60),
    Duration::from_secs(6 * 60 * 60),
];

/// Longest timeout the policy hands out.
pub const MAX_TIMEOUT: Duration = TIMEOUT_LEVELS[TIMEOUT_LEVELS.len() - 1];

/// Timeout for a member whose warning count has just become `warning_count`.
#[must_use]
pub fn timeout_for(warning_count: u32) -> Duration {
    let level = warning_count.clamp(1, MAX_ESCALATION_LEVEL);
    TIMEOUT_LEVELS[(level - 1) as usize]
}

/// Whether `warning_count` has reached the top of the table.
#[must_use]
pub fn is_max_escalation(warning_count: u32) -> bool {
    warning_count >= MAX_ESCALATION_LEVEL
}

/// Render a duration as `"{h}h {m}m"`, or `"{m}m"` when under an hour.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn table_values() {
        assert_eq!(timeout_for(1), Duration::from_secs(600));
        assert_eq!(timeout_for(2), Duration::from_secs(3600));
        assert_eq!(timeout_for(3), Duration::from_secs(3 * 3600));
        assert_eq!(timeout_for(4), Duration::from_secs(6 * 3600));
        assert_eq!(timeout_for(4), MAX_TIMEOUT);
    }

    #[test]
    fn zero_is_treated_as_first_offense() {
        assert_eq!(timeout_for(0), timeout_for(1));
    }

    #[test]
    fn counts_past_the_table_cap() {
        assert_eq!(timeout_for(5), MAX_TIMEOUT);
        assert_eq!(timeout_for(u32::MAX), MAX_TIMEOUT);
    }

    #[test]
    fn max_escalation_marker() {
        assert!(!is_max_escalation(3));
        assert!(is_max_escalation(4));
        assert!(is_max_escalation(17));
    }

    #[test]
    fn format_under_an_hour() {
        assert_eq!(format_duration(Duration::from_secs(600)), "10m");
        assert_eq!(format_duration(Duration::from_secs(59)), "0m");
    }

    #[test]
    fn format_hours_and_minutes() {
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h 0m");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600)), "3h 0m");
        assert_eq!(format_duration(Duration::from_secs(3600 + 25 * 60)), "1h 25m");
    }

    proptest! {
        #[test]
        fn monotonic_non_decreasing(a in 0u32..1000, b in 0u32..1000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(timeout_for(lo) <= timeout_for(hi));
        }

        #[test]
        fn saturates_at_level_four(c in 4u32..=u32::MAX) {
            prop_assert_eq!(timeout_for(c), timeout_for(4));
        }

        #[test]
        fn never_zero(c in any::<u32>()) {
            prop_assert!(timeout_for(c) > Duration::ZERO);
        }
    }
}
