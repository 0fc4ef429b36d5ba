use chrono::{DateTime, Utc};
use stoodio_core::{Booking, RankingTier};

use crate::ranking::visibility_delay;

/// Whether an engineer of `tier` may see `job` at `now`
pub fn is_visible(job: &Booking, tier: Option<RankingTier>, now: DateTime<Utc>) -> bool {
    job.is_open_job() && now >= job.posted_at + visibility_delay(tier)
}

/// Open jobs an engineer of `tier` may see right now, soonest session first.
/// Ties keep creation order.
pub fn visible_jobs(
    bookings: &[Booking],
    tier: Option<RankingTier>,
    now: DateTime<Utc>,
) -> Vec<Booking> {
    let mut jobs: Vec<Booking> = bookings
        .iter()
        .filter(|b| is_visible(b, tier, now))
        .cloned()
        .collect();

    jobs.sort_by_key(|b| (b.slot.starts_at(), b.sequence));
    jobs
}
