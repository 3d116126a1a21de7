//! ISO-8601 durations (`PT5M`, `PT1H30M`, `P1DT2H`) as used by the autoscale API.
//!
//! Usable as `#[serde(with = "crate::iso8601")]` on `std::time::Duration` fields.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Format a duration. Sub-second parts become fractional seconds (`PT0.5S`).
pub fn format(d: Duration) -> String {
    let mut secs = d.as_secs();
    let nanos = d.subsec_nanos();
    let days = secs / 86_400;
    secs %= 86_400;
    let hours = secs / 3_600;
    secs %= 3_600;
    let minutes = secs / 60;
    secs %= 60;

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{}D", days));
    }
    let has_time = hours > 0 || minutes > 0 || secs > 0 || nanos > 0;
    if has_time || days == 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{}H", hours));
        }
        if minutes > 0 {
            out.push_str(&format!("{}M", minutes));
        }
        if nanos > 0 {
            let frac = format!("{:09}", nanos);
            out.push_str(&format!("{}.{}S", secs, frac.trim_end_matches('0')));
        } else if secs > 0 || !has_time {
            out.push_str(&format!("{}S", secs));
        }
    }
    out
}

/// Parse the day/time subset of ISO-8601 durations. Years, months and
/// weeks have no fixed length and are rejected, as are totals that do not
/// fit a `Duration` or carry more than nanosecond precision.
pub fn parse(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let rest = s
        .strip_prefix('P')
        .ok_or_else(|| format!("'{}' is not an ISO-8601 duration", s))?;
    if rest.is_empty() {
        return Err(format!("'{}' has no components", s));
    }

    let overflow = || format!("'{}' is too large", s);
    let mut total: u128 = 0;
    let mut in_time = false;
    let mut number = String::new();
    for c in rest.chars() {
        match c {
            'T' if !in_time && number.is_empty() => in_time = true,
            '0'..='9' | '.' => number.push(c),
            unit => {
                let factor: u128 = match (in_time, unit) {
                    (false, 'D') => 86_400,
                    (true, 'H') => 3_600,
                    (true, 'M') => 60,
                    (true, 'S') => 1,
                    _ => return Err(format!("'{}': unsupported component '{}'", s, unit)),
                };
                let nanos = component_nanos(&number)
                    .ok_or_else(|| format!("'{}': bad value '{}' before '{}'", s, number, unit))?;
                number.clear();
                total = nanos
                    .checked_mul(factor)
                    .and_then(|n| total.checked_add(n))
                    .ok_or_else(overflow)?;
            }
        }
    }
    if !number.is_empty() {
        return Err(format!("'{}': trailing value without unit", s));
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| overflow())?;
    Ok(Duration::new(secs, (total % NANOS_PER_SEC) as u32))
}

/// `12` or `12.5` as nanoseconds of one unit.
fn component_nanos(value: &str) -> Option<u128> {
    let (whole, frac) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if whole.is_empty() || frac.len() > 9 || frac.contains('.') {
        return None;
    }
    let whole: u128 = whole.parse().ok()?;
    let frac: u128 = if frac.is_empty() {
        0
    } else {
        format!("{:0<9}", frac).parse().ok()?
    };
    whole.checked_mul(NANOS_PER_SEC)?.checked_add(frac)
}

pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(*d))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse(&s).map_err(serde::de::Error::custom)
}
