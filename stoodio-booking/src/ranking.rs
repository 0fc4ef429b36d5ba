use chrono::Duration;
use stoodio_core::RankingTier;

/// Hours an engineer of `tier` waits before a newly posted job shows up.
///
/// An engineer with no tier on record gets the most conservative delay.
pub fn visibility_delay(tier: Option<RankingTier>) -> Duration {
    Duration::hours(delay_hours(tier.unwrap_or(RankingTier::Provisional)))
}

fn delay_hours(tier: RankingTier) -> i64 {
    match tier {
        RankingTier::Elite | RankingTier::Platinum => 0,
        RankingTier::Gold => 1,
        RankingTier::Silver => 3,
        RankingTier::Bronze => 6,
        RankingTier::Provisional => 12,
    }
}

/// Job board explanation shown to the engineer
pub fn visibility_hint(tier: Option<RankingTier>) -> String {
    let tier = tier.unwrap_or(RankingTier::Provisional);
    match delay_hours(tier) {
        0 => format!("{} engineers see new jobs instantly", title(tier)),
        1 => format!("{} engineers see new jobs 1 hour after posting", title(tier)),
        h => format!("{} engineers see new jobs {} hours after posting", title(tier), h),
    }
}

fn title(tier: RankingTier) -> String {
    let upper = tier.as_str();
    let mut out = upper[..1].to_string();
    out.push_str(&upper[1..].to_ascii_lowercase());
    out
}
