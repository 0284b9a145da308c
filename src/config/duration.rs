//! Serde adapter for human-readable durations (`"300ms"`, `"5s"`,
//! `"1h30m"`).
//!
//! Apply with `#[serde(with = "appvisor::config::duration")]`.

use std::fmt::Write;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Parses a duration string: one or more `<number><unit>` segments, where
/// unit is one of `ns`, `us`, `ms`, `s`, `m`, `h`. Numbers may carry a
/// decimal part. A bare `"0"` is accepted.
pub fn parse(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let bytes = s.as_bytes();
    let mut total = Duration::ZERO;
    let mut i = 0;

    while i < bytes.len() {
        let num_start = i;
        while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
            i += 1;
        }
        if num_start == i {
            return Err(format!("invalid duration {input:?}: expected a number"));
        }
        let number: f64 = s[num_start..i]
            .parse()
            .map_err(|_| format!("invalid duration {input:?}: bad number"))?;

        let unit_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        let factor = match &s[unit_start..i] {
            "ns" => 1e-9,
            "us" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            unit => return Err(format!("invalid duration {input:?}: unknown unit {unit:?}")),
        };

        total += Duration::from_secs_f64(number * factor);
    }

    Ok(total)
}

/// Renders a duration back into the grammar [`parse`] accepts.
pub fn format(d: &Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }

    let total_secs = d.as_secs();
    let nanos = d.subsec_nanos();

    let mut out = String::new();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    let millis = nanos / 1_000_000;
    let micros = (nanos % 1_000_000) / 1_000;
    let rest_nanos = nanos % 1_000;

    for (value, unit) in [
        (hours, "h"),
        (minutes, "m"),
        (secs, "s"),
        (u64::from(millis), "ms"),
        (u64::from(micros), "us"),
        (u64::from(rest_nanos), "ns"),
    ] {
        if value > 0 {
            let _ = write!(out, "{value}{unit}");
        }
    }
    out
}

pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(d))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse("300ms").unwrap(), Duration::from_millis(300));
        assert_eq!(parse("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parses_compound_and_fractional() {
        assert_eq!(parse("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse("2m30s").unwrap(), Duration::from_secs(150));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("").is_err());
        assert!(parse("5").is_err());
        assert!(parse("5 seconds").is_err());
        assert!(parse("abc").is_err());
    }

    #[test]
    fn format_round_trips() {
        for d in [
            Duration::ZERO,
            Duration::from_millis(300),
            Duration::from_secs(5),
            Duration::from_secs(5400),
            Duration::from_micros(1500),
        ] {
            assert_eq!(parse(&format(&d)).unwrap(), d, "{d:?}");
        }
    }
}
