// src/clean/mod.rs
//! Raw tables → one cleansed subscriber table.
//!
//! The transform is an ordered list of independent steps, each in its own
//! module so it can be exercised on its own:
//!
//! 1. `convert`     type coercion (numerics, ids, contact info)
//! 2. `date_parser` date normalization
//! 3. `dedup`       one row per subscriber id
//! 4. `enrich`      left join onto career paths and jobs
//! 5. `flags`       derived fields and quality flags

pub mod contact;
pub mod convert;
pub mod date_parser;
pub mod dedup;
pub mod enrich;
pub mod flags;
pub mod utils;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::source::RawTables;
use enrich::ReferenceIndex;

/// Column names of the cleansed table, in on-disk order.
pub const CLEANSED_COLUMNS: [&str; 25] = [
    "uuid",
    "name",
    "dob",
    "age",
    "age_group",
    "sex",
    "email",
    "street",
    "city",
    "state",
    "zip_code",
    "job_id",
    "num_course_taken",
    "current_career_path_id",
    "time_spent_hrs",
    "career_path_name",
    "hours_to_complete",
    "job_category",
    "avg_salary",
    "missing_dob",
    "missing_contact_info",
    "missing_progress",
    "dangling_career_path",
    "dangling_job",
    "incomplete",
];

/// One subscriber after cleaning. `None` is the missing sentinel.
///
/// Field order must match `CLEANSED_COLUMNS`; the flat export derives its
/// header from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleansedSubscriberRecord {
    pub uuid: String,
    pub name: Option<String>,
    pub dob: Option<NaiveDate>,
    pub age: Option<i64>,
    pub age_group: Option<i64>,
    pub sex: Option<String>,
    pub email: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub job_id: Option<i64>,
    pub num_course_taken: Option<f64>,
    pub current_career_path_id: Option<i64>,
    pub time_spent_hrs: Option<f64>,
    pub career_path_name: Option<String>,
    pub hours_to_complete: Option<f64>,
    pub job_category: Option<String>,
    pub avg_salary: Option<f64>,
    pub missing_dob: bool,
    pub missing_contact_info: bool,
    pub missing_progress: bool,
    pub dangling_career_path: bool,
    pub dangling_job: bool,
    pub incomplete: bool,
}

#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Date ages are computed against.
    pub reference_date: NaiveDate,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            reference_date: Utc::now().date_naive(),
        }
    }
}

/// Counts reported to the changelog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub input_rows: usize,
    pub output_rows: usize,
    pub duplicates_collapsed: usize,
    pub reference_duplicates_collapsed: usize,
    pub flagged_rows: usize,
    pub missing_dates: usize,
    pub dangling_career_paths: usize,
    pub dangling_jobs: usize,
}

impl TransformStats {
    pub fn dangling_references(&self) -> usize {
        self.dangling_career_paths + self.dangling_jobs
    }
}

#[derive(Debug, Clone)]
pub struct CleanOutput {
    /// Sorted by `uuid`: integer ids numerically, then textual ids.
    pub records: Vec<CleansedSubscriberRecord>,
    pub stats: TransformStats,
}

/// Run all cleaning steps. Either every record is produced or none is.
#[tracing::instrument(level = "info", skip_all, fields(students = raw.students.len()))]
pub fn transform(raw: &RawTables, opts: &TransformOptions) -> Result<CleanOutput> {
    // validate references first so an ambiguous join fails before any work
    let index = ReferenceIndex::build(&raw.career_paths, &raw.jobs)?;

    // 1) type coercion
    let mut rows = convert::coerce_students(&raw.students)?;

    // 2) date normalization
    let missing_dates = date_parser::normalize_dates(&mut rows);

    // 3) dedup
    let (rows, duplicates_collapsed) = dedup::dedup_students(rows);

    // 4) enrichment join
    let mut records = enrich::enrich(rows, &index);

    // 5) derived fields
    for rec in records.iter_mut() {
        flags::derive_flags(rec, opts.reference_date);
    }

    let stats = TransformStats {
        input_rows: raw.students.len(),
        output_rows: records.len(),
        duplicates_collapsed,
        reference_duplicates_collapsed: index.collapsed,
        flagged_rows: records.iter().filter(|r| r.is_flagged()).count(),
        missing_dates,
        dangling_career_paths: records.iter().filter(|r| r.dangling_career_path).count(),
        dangling_jobs: records.iter().filter(|r| r.dangling_job).count(),
    };
    info!(?stats, "transform complete");

    Ok(CleanOutput { records, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::source::{CareerPathRecord, JobIndustryRecord, RawStudentRecord};
    use crate::test_support::init_test_logging;
    use anyhow::Result;

    fn student(row: usize, uuid: &str) -> RawStudentRecord {
        RawStudentRecord {
            row,
            uuid: Some(uuid.into()),
            name: Some(format!("student {uuid}")),
            dob: Some("1990-01-01".into()),
            sex: Some("M".into()),
            contact_info: Some(
                r#"{"mailing_address": "1 Main St, Springfield, Ohio, 45501", "email": "s@example.com"}"#
                    .into(),
            ),
            job_id: Some("1".into()),
            num_course_taken: Some("3".into()),
            current_career_path_id: Some("1".into()),
            time_spent_hrs: Some("4.5".into()),
        }
    }

    fn tables(students: Vec<RawStudentRecord>) -> RawTables {
        RawTables {
            students,
            career_paths: vec![CareerPathRecord {
                row: 0,
                career_path_id: Some("1".into()),
                career_path_name: Some("data scientist".into()),
                hours_to_complete: Some("20".into()),
            }],
            jobs: vec![JobIndustryRecord {
                row: 0,
                job_id: Some("1".into()),
                job_category: Some("analytics".into()),
                avg_salary: Some("86000".into()),
            }],
        }
    }

    fn opts() -> TransformOptions {
        TransformOptions {
            reference_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        }
    }

    #[test]
    fn serde_field_order_matches_column_list() -> Result<()> {
        let mut w = csv::Writer::from_writer(vec![]);
        w.serialize(CleansedSubscriberRecord::default())?;
        let text = String::from_utf8(w.into_inner()?)?;
        let header = text.lines().next().unwrap_or_default();
        assert_eq!(header, CLEANSED_COLUMNS.join(","));
        Ok(())
    }

    #[test]
    fn unparseable_numeric_keeps_the_row_with_missing_value() -> Result<()> {
        init_test_logging();
        let mut bad = student(1, "2");
        bad.num_course_taken = Some("three".into());
        bad.time_spent_hrs = Some("4h".into());
        let out = transform(&tables(vec![student(0, "1"), bad]), &opts())?;

        assert_eq!(out.records.len(), 2);
        let rec = &out.records[1];
        assert_eq!(rec.uuid, "2");
        assert_eq!(rec.num_course_taken, None);
        assert_eq!(rec.time_spent_hrs, None);
        assert!(rec.missing_progress && rec.incomplete);
        assert_eq!(out.stats.flagged_rows, 1);
        Ok(())
    }

    #[test]
    fn duplicate_uuid_yields_one_record_by_tie_break() -> Result<()> {
        let mut older = student(0, "7");
        older.dob = Some("1980-01-01".into());
        older.name = Some("older".into());
        let mut newer = student(1, "7");
        newer.dob = Some("1985/06/01".into());
        newer.name = Some("newer".into());
        let mut undated = student(2, "7");
        undated.dob = Some("garbage".into());
        undated.name = Some("undated".into());

        let out = transform(&tables(vec![older, newer, undated]), &opts())?;
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].name.as_deref(), Some("newer"));
        assert_eq!(out.records[0].dob, NaiveDate::from_ymd_opt(1985, 6, 1));
        assert_eq!(out.stats.duplicates_collapsed, 2);
        assert_eq!(out.stats.input_rows, 3);
        assert_eq!(out.stats.output_rows, 1);
        Ok(())
    }

    #[test]
    fn dangling_career_path_is_kept_and_flagged() -> Result<()> {
        let mut s = student(0, "3");
        s.current_career_path_id = Some("42".into());
        let out = transform(&tables(vec![s]), &opts())?;

        let rec = &out.records[0];
        assert_eq!(rec.current_career_path_id, Some(42));
        assert_eq!(rec.career_path_name, None);
        assert!(rec.dangling_career_path);
        assert_eq!(out.stats.dangling_career_paths, 1);
        assert_eq!(out.stats.dangling_references(), 1);
        Ok(())
    }

    #[test]
    fn output_is_sorted_by_uuid_and_enriched() -> Result<()> {
        let out = transform(
            &tables(vec![student(0, "30"), student(1, "4"), student(2, "12")]),
            &opts(),
        )?;
        let ids: Vec<&str> = out.records.iter().map(|r| r.uuid.as_str()).collect();
        assert_eq!(ids, vec!["4", "12", "30"]);

        let rec = &out.records[0];
        assert_eq!(rec.career_path_name.as_deref(), Some("data scientist"));
        assert_eq!(rec.job_category.as_deref(), Some("analytics"));
        assert_eq!(rec.avg_salary, Some(86000.0));
        assert_eq!(rec.age, Some(34));
        assert_eq!(rec.age_group, Some(30));
        assert_eq!(rec.city.as_deref(), Some("Springfield"));
        assert!(!rec.is_flagged());
        Ok(())
    }

    #[test]
    fn textual_uuid_does_not_fail_the_run() -> Result<()> {
        let out = transform(&tables(vec![student(0, "a7f3-19"), student(1, "1")]), &opts())?;
        let ids: Vec<&str> = out.records.iter().map(|r| r.uuid.as_str()).collect();
        assert_eq!(ids, vec!["1", "a7f3-19"]);
        Ok(())
    }

    #[test]
    fn ambiguous_reference_table_produces_no_output() {
        let mut t = tables(vec![student(0, "1")]);
        t.career_paths.push(CareerPathRecord {
            row: 1,
            career_path_id: Some("1".into()),
            career_path_name: Some("something else".into()),
            hours_to_complete: None,
        });
        assert!(matches!(
            transform(&t, &opts()),
            Err(PipelineError::TransformError(_))
        ));
    }
}
