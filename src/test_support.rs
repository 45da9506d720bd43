//! Fixtures shared by the in-module tests.

use anyhow::Result;
use rusqlite::{params, Connection};
use std::path::Path;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub fn init_test_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,subscriber_pipeline=debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// A student row for the raw fixture database. Every cell is stored as text.
#[derive(Debug, Clone)]
pub struct FixtureStudent {
    pub uuid: Option<String>,
    pub name: Option<String>,
    pub dob: Option<String>,
    pub sex: Option<String>,
    pub contact_info: Option<String>,
    pub job_id: Option<String>,
    pub num_course_taken: Option<String>,
    pub current_career_path_id: Option<String>,
    pub time_spent_hrs: Option<String>,
}

impl FixtureStudent {
    pub fn new(uuid: &str) -> Self {
        Self {
            uuid: Some(uuid.to_string()),
            name: Some(format!("Student {}", uuid)),
            dob: Some("1990-01-01".into()),
            sex: Some("F".into()),
            contact_info: Some(
                r#"{"mailing_address": "303 N Timber Key, Irondale, Wisconsin, 84736", "email": "student@woohoo.com"}"#
                    .into(),
            ),
            job_id: Some("1".into()),
            num_course_taken: Some("5".into()),
            current_career_path_id: Some("1".into()),
            time_spent_hrs: Some("10.5".into()),
        }
    }

    pub fn name(mut self, v: &str) -> Self {
        self.name = Some(v.into());
        self
    }

    pub fn dob(mut self, v: &str) -> Self {
        self.dob = Some(v.into());
        self
    }

    pub fn no_dob(mut self) -> Self {
        self.dob = None;
        self
    }

    pub fn contact_info(mut self, v: Option<&str>) -> Self {
        self.contact_info = v.map(Into::into);
        self
    }

    pub fn job_id(mut self, v: Option<&str>) -> Self {
        self.job_id = v.map(Into::into);
        self
    }

    pub fn career_path_id(mut self, v: Option<&str>) -> Self {
        self.current_career_path_id = v.map(Into::into);
        self
    }

    pub fn num_course_taken(mut self, v: &str) -> Self {
        self.num_course_taken = Some(v.into());
        self
    }

    pub fn time_spent_hrs(mut self, v: Option<&str>) -> Self {
        self.time_spent_hrs = v.map(Into::into);
        self
    }
}

/// Build a raw snapshot shaped like the production source.
///
/// Columns are declared without a type so SQLite keeps every value exactly as
/// inserted, which lets tests feed malformed strings into numeric columns.
pub fn write_fixture_db(
    path: &Path,
    students: &[FixtureStudent],
    career_paths: &[(&str, &str, Option<&str>)],
    jobs: &[(&str, &str, Option<&str>)],
) -> Result<()> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "CREATE TABLE cademycode_students (
            uuid, name, dob, sex, contact_info, job_id,
            num_course_taken, current_career_path_id, time_spent_hrs
        );
        CREATE TABLE cademycode_courses (career_path_id, career_path_name, hours_to_complete);
        CREATE TABLE cademycode_student_jobs (job_id, job_category, avg_salary);",
    )?;

    for s in students {
        conn.execute(
            "INSERT INTO cademycode_students VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                s.uuid,
                s.name,
                s.dob,
                s.sex,
                s.contact_info,
                s.job_id,
                s.num_course_taken,
                s.current_career_path_id,
                s.time_spent_hrs
            ],
        )?;
    }
    for (id, name, hours) in career_paths {
        conn.execute(
            "INSERT INTO cademycode_courses VALUES (?1, ?2, ?3)",
            params![id, name, hours],
        )?;
    }
    for (id, category, salary) in jobs {
        conn.execute(
            "INSERT INTO cademycode_student_jobs VALUES (?1, ?2, ?3)",
            params![id, category, salary],
        )?;
    }
    Ok(())
}
