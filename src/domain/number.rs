//! Human-readable order and booking numbers.
//!
//! Numbers are labels for people reading receipts; the store-assigned id is
//! the identity. Collisions are caught by the store's unique key and the
//! caller draws again.

use chrono::{DateTime, Utc};
use rand::Rng;

const SUFFIX_RANGE: std::ops::RangeInclusive<u32> = 100_000..=999_999;

/// `{PREFIX}-{YYYYMMDD}-{6 digits}` for the given instant.
pub fn generate<R: Rng + ?Sized>(prefix: &str, at: DateTime<Utc>, rng: &mut R) -> String {
    format!(
        "{prefix}-{}-{}",
        at.format("%Y%m%d"),
        rng.gen_range(SUFFIX_RANGE)
    )
}

/// Whether `number` has the shape produced by [`generate`] for `prefix`.
pub fn is_well_formed(prefix: &str, number: &str) -> bool {
    let Some(rest) = number
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
    else {
        return false;
    };
    let Some((date, suffix)) = rest.split_once('-') else {
        return false;
    };
    date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && chrono::NaiveDate::parse_from_str(date, "%Y%m%d").is_ok()
        && suffix
            .parse::<u32>()
            .is_ok_and(|n| suffix.len() == 6 && SUFFIX_RANGE.contains(&n))
}
