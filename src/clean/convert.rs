use chrono::NaiveDate;
use std::fmt;

use super::contact::{parse_contact_info, Contact};
use super::utils::clean_opt;
use crate::error::{PipelineError, Result};
use crate::source::RawStudentRecord;

/// A foreign key as found in the raw row.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// Null or blank in the source.
    Absent,
    Id(i64),
    /// Present but not an integer id; can never resolve.
    Unparseable(String),
}

impl Reference {
    pub fn from_raw(raw: Option<&str>) -> Self {
        match clean_opt(raw) {
            None => Reference::Absent,
            Some(s) => match parse_id(&s) {
                Some(id) => Reference::Id(id),
                None => Reference::Unparseable(s),
            },
        }
    }

    pub fn id(&self) -> Option<i64> {
        match self {
            Reference::Id(id) => Some(*id),
            _ => None,
        }
    }
}

/// Subscriber id. Integer ids order numerically and come first; any other
/// text orders lexically after them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubscriberKey {
    Numeric(i64),
    Text(String),
}

impl SubscriberKey {
    pub fn parse(s: String) -> Self {
        match parse_id(&s) {
            Some(id) => SubscriberKey::Numeric(id),
            None => SubscriberKey::Text(s),
        }
    }
}

impl fmt::Display for SubscriberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriberKey::Numeric(id) => write!(f, "{}", id),
            SubscriberKey::Text(s) => f.write_str(s),
        }
    }
}

/// A student row after type coercion; the working shape for every later step.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentRow {
    /// Position in the raw table, the final dedup tie-break.
    pub row: usize,
    pub uuid: SubscriberKey,
    pub name: Option<String>,
    pub sex: Option<String>,
    /// Untouched until date normalization runs.
    pub dob_raw: Option<String>,
    pub dob: Option<NaiveDate>,
    pub missing_dob: bool,
    pub contact: Contact,
    pub job: Reference,
    pub career_path: Reference,
    pub num_course_taken: Option<f64>,
    pub time_spent_hrs: Option<f64>,
}

/// Numeric-looking text → `f64`. Anything unparseable or non-finite is missing.
pub fn parse_f64(raw: Option<&str>) -> Option<f64> {
    let s = clean_opt(raw)?;
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer ids, also accepting integral floats (`"7.0"`) as the source
/// sometimes stores ids in REAL columns.
pub fn parse_id(s: &str) -> Option<i64> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(i);
    }
    let f = s.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Step 1: coerce one raw student row. Only a missing subscriber id is an
/// error; every other field degrades to missing.
pub fn coerce_student(raw: &RawStudentRecord) -> Result<StudentRow> {
    let uuid = clean_opt(raw.uuid.as_deref())
        .map(SubscriberKey::parse)
        .ok_or_else(|| {
            PipelineError::TransformError(format!(
                "student at row {} has no uuid ({:?})",
                raw.row, raw.uuid
            ))
        })?;

    Ok(StudentRow {
        row: raw.row,
        uuid,
        name: clean_opt(raw.name.as_deref()),
        sex: clean_opt(raw.sex.as_deref()),
        dob_raw: raw.dob.clone(),
        dob: None,
        missing_dob: false,
        contact: parse_contact_info(raw.contact_info.as_deref()),
        job: Reference::from_raw(raw.job_id.as_deref()),
        career_path: Reference::from_raw(raw.current_career_path_id.as_deref()),
        num_course_taken: parse_f64(raw.num_course_taken.as_deref()),
        time_spent_hrs: parse_f64(raw.time_spent_hrs.as_deref()),
    })
}

pub fn coerce_students(raw: &[RawStudentRecord]) -> Result<Vec<StudentRow>> {
    raw.iter().map(coerce_student).collect()
}
