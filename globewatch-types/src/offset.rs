//! Relative offsets such as `"1d2h30m"`, used to disable sounds for a while.

use chrono::TimeDelta;

/// Unit suffix to seconds multiplier, in the order they must appear.
const UNITS: &[(char, i64)] = &[('d', 86_400), ('h', 3_600), ('m', 60)];

/// Error returned by [`parse_relative_offset`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OffsetParseError {
    #[error("empty offset")]
    Empty,
    #[error("invalid offset {0:?}: expected [N]d[N]h[N]m")]
    Malformed(String),
    #[error("offset {0:?} is out of range")]
    Overflow(String),
}

/// Parse an offset of the form `[N d][N h][N m]`.
///
/// Each unit is optional but at least one must be present, and units must
/// appear in day, hour, minute order. Suffixes are case-insensitive.
pub fn parse_relative_offset(s: &str) -> Result<TimeDelta, OffsetParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(OffsetParseError::Empty);
    }

    let malformed = || OffsetParseError::Malformed(s.to_string());
    let overflow = || OffsetParseError::Overflow(s.to_string());

    let mut rest = s;
    let mut next_unit = 0;
    let mut seconds: i64 = 0;

    while !rest.is_empty() {
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return Err(malformed());
        }
        let count: i64 = rest[..digits].parse().map_err(|_| overflow())?;

        let suffix = rest[digits..]
            .chars()
            .next()
            .ok_or_else(malformed)?
            .to_ascii_lowercase();
        let pos = UNITS[next_unit..]
            .iter()
            .position(|(c, _)| *c == suffix)
            .ok_or_else(malformed)?;
        let (_, multiplier) = UNITS[next_unit + pos];
        next_unit += pos + 1;

        seconds = count
            .checked_mul(multiplier)
            .and_then(|v| seconds.checked_add(v))
            .ok_or_else(overflow)?;
        rest = &rest[digits + 1..];
    }

    TimeDelta::try_seconds(seconds).ok_or_else(overflow)
}

/// Format an offset in the canonical `1d2h30m` form, dropping zero units.
///
/// Sub-minute remainders are truncated. A zero offset formats as `"0m"`.
pub fn format_relative_offset(offset: TimeDelta) -> String {
    let mut remaining = offset.num_minutes().max(0) * 60;
    let mut out = String::new();

    for (suffix, multiplier) in UNITS {
        let count = remaining / multiplier;
        if count > 0 {
            out.push_str(&format!("{}{}", count, suffix));
            remaining -= count * multiplier;
        }
    }

    if out.is_empty() {
        out.push_str("0m");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_relative_offset("2h").unwrap(), TimeDelta::hours(2));
        assert_eq!(parse_relative_offset("45m").unwrap(), TimeDelta::minutes(45));
        assert_eq!(parse_relative_offset("3D").unwrap(), TimeDelta::days(3));
    }

    #[test]
    fn parses_combined_units() {
        let expected = TimeDelta::days(1) + TimeDelta::hours(2) + TimeDelta::minutes(30);
        assert_eq!(parse_relative_offset("1d2h30m").unwrap(), expected);
        assert_eq!(
            parse_relative_offset("1D30M").unwrap(),
            TimeDelta::days(1) + TimeDelta::minutes(30)
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_relative_offset(""), Err(OffsetParseError::Empty));
        assert!(matches!(
            parse_relative_offset("2x"),
            Err(OffsetParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_relative_offset("30m2h"),
            Err(OffsetParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_relative_offset("2h2h"),
            Err(OffsetParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_relative_offset("h"),
            Err(OffsetParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_relative_offset("12"),
            Err(OffsetParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_relative_offset("99999999999999999999d"),
            Err(OffsetParseError::Overflow(_))
        ));
    }

    #[test]
    fn formats_canonically() {
        let offset = parse_relative_offset("1d2h30m").unwrap();
        assert_eq!(format_relative_offset(offset), "1d2h30m");
        assert_eq!(format_relative_offset(TimeDelta::hours(5)), "5h");
        assert_eq!(format_relative_offset(TimeDelta::seconds(20)), "0m");
    }
}
