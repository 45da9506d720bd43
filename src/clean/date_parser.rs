use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

use super::convert::StudentRow;
use super::utils::clean_opt;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse any of the accepted date spellings into a calendar date.
///
/// Accepted: `YYYY-MM-DD`, `YYYY/MM/DD` (optionally followed by a time of
/// day), RFC 3339 timestamps, and `MM/DD/YYYY`. Anything else is `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = clean_opt(Some(raw))?;

    // fast path: bare ISO date, the overwhelmingly common shape
    if s.len() == 10 && s.is_ascii() && &s[4..5] == "-" && &s[7..8] == "-" {
        let year: i32 = s[0..4].parse().ok()?;
        let month: u32 = s[5..7].parse().ok()?;
        let day: u32 = s[8..10].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&s, fmt) {
            return Some(dt.date());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&s, fmt).ok())
}

/// Step 2: parse every row's raw date; unparseable or absent dates are
/// flagged. Returns how many rows ended up without a date.
pub fn normalize_dates(rows: &mut [StudentRow]) -> usize {
    let mut missing = 0;
    for r in rows.iter_mut() {
        r.dob = r.dob_raw.as_deref().and_then(parse_date);
        r.missing_dob = r.dob.is_none();
        if r.missing_dob {
            missing += 1;
        }
    }
    missing
}

/// Whole years between `dob` and `on`; `None` when `dob` lies after `on`.
pub fn age_on(dob: NaiveDate, on: NaiveDate) -> Option<i64> {
    if dob > on {
        return None;
    }
    let mut age = i64::from(on.year() - dob.year());
    if (on.month(), on.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    Some(age)
}

/// Bucket an age down to its decade (37 → 30).
pub fn age_group(age: i64) -> i64 {
    (age / 10) * 10
}
