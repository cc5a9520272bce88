// src/sync/eligibility.rs
use chrono::{DateTime, Utc};

/// An entry is eligible unless it is strictly older than the watermark.
pub fn is_eligible(resolved_at: DateTime<Utc>, watermark: DateTime<Utc>) -> bool {
    resolved_at >= watermark
}

/// Source-level short-circuit: a feed last updated before the watermark has
/// nothing new, whatever its entries claim.
pub fn source_may_have_news(updated_at: DateTime<Utc>, watermark: DateTime<Utc>) -> bool {
    updated_at >= watermark
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn boundary_is_inclusive() {
        let wm = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(!is_eligible(wm - Duration::seconds(1), wm));
        assert!(is_eligible(wm, wm));
        assert!(is_eligible(wm + Duration::seconds(1), wm));
    }

    #[test]
    fn stale_source_is_short_circuited() {
        let wm = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(!source_may_have_news(wm - Duration::days(1), wm));
        assert!(source_may_have_news(wm, wm));
    }
}
