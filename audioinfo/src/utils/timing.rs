//! Exact sample-count to wall-clock conversion.
//!
//! Durations are accumulated as rationals over the least common multiple of
//! the involved sample rates and rounded to nanoseconds once, when the
//! [`Duration`] is materialized.

use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

const fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Sums `count / rate` over all `(rate, count)` entries, rounding once to
/// the nearest nanosecond. Entries with a zero rate are ignored.
pub fn samples_to_duration<I>(entries: I) -> Duration
where
    I: IntoIterator<Item = (u32, u64)>,
{
    let mut numerator: u128 = 0;
    let mut denominator: u128 = 1;

    for (rate, count) in entries {
        if rate == 0 {
            continue;
        }

        let rate = rate as u128;
        let lcm = denominator / gcd(denominator, rate) * rate;
        numerator = numerator * (lcm / denominator) + count as u128 * (lcm / rate);
        denominator = lcm;
    }

    let nanos = (numerator * NANOS_PER_SEC + denominator / 2) / denominator;
    let secs = (nanos / NANOS_PER_SEC).min(u64::MAX as u128) as u64;

    Duration::new(secs, (nanos % NANOS_PER_SEC) as u32)
}

/// Converts a single sample count at `rate` Hz.
pub fn duration_of(count: u64, rate: u32) -> Duration {
    samples_to_duration([(rate, count)])
}

#[test]
fn test_single_rate_rounds_once() {
    assert_eq!(duration_of(11_520, 44_100), Duration::from_nanos(261_224_490));
    assert_eq!(duration_of(1_152, 44_100), Duration::from_nanos(26_122_449));
    assert_eq!(duration_of(48_000, 48_000), Duration::from_secs(1));
    assert_eq!(duration_of(0, 48_000), Duration::ZERO);
}

#[test]
fn test_mixed_rates() {
    let d = samples_to_duration([(44_100, 3 * 1_152), (48_000, 2 * 1_152)]);
    assert_eq!(d, Duration::from_nanos(126_367_347));

    let exact = samples_to_duration([(44_100, 1), (22_050, 0), (44_100, 1)]);
    assert_eq!(exact, Duration::from_nanos(45_351));
    assert_eq!(duration_of(1, 44_100) * 2, Duration::from_nanos(45_352));
}

#[test]
fn test_zero_rate_ignored() {
    assert_eq!(samples_to_duration([(0, 100), (8_000, 8_000)]), Duration::from_secs(1));
}
