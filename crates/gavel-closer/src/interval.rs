use std::time::Duration;

use gavel_core::config::{AUCTION_INTERVAL_ENV, DEFAULT_AUCTION_INTERVAL_SECS};
use tracing::warn;

/// Interval used when nothing usable is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(DEFAULT_AUCTION_INTERVAL_SECS);

/// Floor for the closer's tick period.
pub const MIN_TICK: Duration = Duration::from_secs(1);

/// Parse a duration string such as `"20s"`, `"5m"`, `"1h30m"` or `"1.5s"`.
///
/// Accepts one or more `<decimal><unit>` pairs with units `ns`, `us`
/// (or `µs`), `ms`, `s`, `m` and `h`. A bare `"0"` is zero. Negative values,
/// missing units and overflow yield `None`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let s = raw.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() || s.starts_with('-') {
        return None;
    }

    let mut total_nanos: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        // Number: digits with an optional fractional part.
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(num_len);
        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
            return None;
        }

        // Unit: everything up to the next number.
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);
        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => return None,
        };

        let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        total_nanos = total_nanos.checked_add(whole.checked_mul(unit_nanos)?)?;

        if !frac.is_empty() {
            // Digits beyond nanosecond resolution of an hour do not matter.
            let frac = &frac[..frac.len().min(18)];
            let scale = 10u128.pow(frac.len() as u32);
            let frac_value: u128 = frac.parse().ok()?;
            total_nanos = total_nanos.checked_add(frac_value * unit_nanos / scale)?;
        }

        rest = next;
    }

    let nanos = u64::try_from(total_nanos).ok()?;
    Some(Duration::from_nanos(nanos))
}

/// Resolve the auction interval from a raw setting.
///
/// Never fails: absent or malformed input falls back to [`DEFAULT_INTERVAL`].
pub fn resolve_interval(raw: Option<&str>) -> Duration {
    match raw {
        None => DEFAULT_INTERVAL,
        Some(value) => parse_duration(value).unwrap_or_else(|| {
            warn!(
                value,
                default_secs = DEFAULT_INTERVAL.as_secs(),
                "invalid auction interval; using default"
            );
            DEFAULT_INTERVAL
        }),
    }
}

/// Resolve the auction interval from the `AUCTION_INTERVAL` env var.
pub fn interval_from_env() -> Duration {
    resolve_interval(std::env::var(AUCTION_INTERVAL_ENV).ok().as_deref())
}

/// How often the closer checks for expired auctions: half the interval,
/// but never more often than once per [`MIN_TICK`].
pub fn tick_period(interval: Duration) -> Duration {
    (interval / 2).max(MIN_TICK)
}
