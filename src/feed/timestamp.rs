use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{AppError, Result};

// Layouts are tried in this order; some are ambiguous subsets of others,
// so the order is load-bearing.
const RFC1123Z: &str = "%a, %d %b %Y %H:%M:%S %z";
const ANSIC: &str = "%a %b %e %H:%M:%S %Y";
const DATETIME: &str = "%Y-%m-%d %H:%M:%S";
const RFC822Z: &str = "%d %b %y %H:%M %z";

/// Parses a feed item's publish date against the known timestamp layouts.
///
/// Layouts without a zone (or with an unparseable zone abbreviation) are
/// treated as UTC.
pub fn parse_published_at(raw: &str) -> Result<DateTime<Utc>> {
    // RFC 1123 with numeric zone, e.g. "Mon, 02 Jan 2006 15:04:05 -0700"
    if let Ok(dt) = DateTime::parse_from_str(raw, RFC1123Z) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Unix-style with zone abbreviation, e.g. "Mon Jan 2 15:04:05 MST 2006".
    // chrono cannot parse zone abbreviations, so the zone token is dropped
    // and the remainder read as UTC.
    if let Some(stripped) = strip_zone_abbrev(raw) {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&stripped, ANSIC) {
            return Ok(dt.and_utc());
        }
    }
    // ANSI C, e.g. "Mon Jan 2 15:04:05 2006"
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, ANSIC) {
        return Ok(dt.and_utc());
    }
    // e.g. "2006-01-02 15:04:05"
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, DATETIME) {
        return Ok(dt.and_utc());
    }
    // RFC 822 with numeric zone, e.g. "02 Jan 06 15:04 -0700"
    if let Ok(dt) = DateTime::parse_from_str(raw, RFC822Z) {
        return Ok(dt.with_timezone(&Utc));
    }

    Err(AppError::UnknownTimestampFormat {
        raw: raw.to_string(),
    })
}

/// For "ddd Mon d HH:MM:SS ZZZ yyyy" inputs, returns the string with the
/// zone token removed. Anything else returns `None`.
fn strip_zone_abbrev(raw: &str) -> Option<String> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.len() != 6 {
        return None;
    }
    if !tokens[4].chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    let mut rest = tokens[..4].to_vec();
    rest.push(tokens[5]);
    Some(rest.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rfc1123_with_numeric_zone() {
        let dt = parse_published_at("Mon, 02 Jan 2006 15:04:05 -0700").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap());
    }

    #[test]
    fn unix_date_with_zone_abbreviation() {
        let dt = parse_published_at("Mon Jan 2 15:04:05 MST 2006").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap());
    }

    #[test]
    fn ansi_c_without_zone() {
        let dt = parse_published_at("Mon Jan 2 15:04:05 2006").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap());
    }

    #[test]
    fn iso_like_date_time() {
        let dt = parse_published_at("2006-01-02 15:04:05").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap());
    }

    #[test]
    fn rfc822_with_numeric_zone() {
        let dt = parse_published_at("02 Jan 06 15:04 -0700").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 0).unwrap());
    }

    #[test]
    fn unrecognized_string_is_an_error() {
        let err = parse_published_at("banana").unwrap_err();
        match err {
            AppError::UnknownTimestampFormat { raw } => assert_eq!(raw, "banana"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
