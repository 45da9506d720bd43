// src/source/mod.rs

pub mod raw_table;

pub use raw_table::RawRow;

use crate::config::TableNames;
use crate::error::{PipelineError, Result};
use raw_table::cell_to_text;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use tracing::{debug, info, warn};

pub const STUDENT_COLUMNS: [&str; 9] = [
    "uuid",
    "name",
    "dob",
    "sex",
    "contact_info",
    "job_id",
    "num_course_taken",
    "current_career_path_id",
    "time_spent_hrs",
];
pub const CAREER_PATH_COLUMNS: [&str; 3] = ["career_path_id", "career_path_name", "hours_to_complete"];
pub const JOB_COLUMNS: [&str; 3] = ["job_id", "job_category", "avg_salary"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawStudentRecord {
    /// Zero-based position in the source table.
    pub row: usize,
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

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CareerPathRecord {
    pub row: usize,
    pub career_path_id: Option<String>,
    pub career_path_name: Option<String>,
    pub hours_to_complete: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobIndustryRecord {
    pub row: usize,
    pub job_id: Option<String>,
    pub job_category: Option<String>,
    pub avg_salary: Option<String>,
}

/// The three raw tables of one snapshot. Never mutated after reading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTables {
    pub students: Vec<RawStudentRecord>,
    pub career_paths: Vec<CareerPathRecord>,
    pub jobs: Vec<JobIndustryRecord>,
}

/// Open the raw snapshot read-only and load the three tables.
///
/// The connection lives only for the duration of this call and is closed on
/// every exit path.
#[tracing::instrument(level = "info", skip(path, tables), fields(path = %path.as_ref().display()))]
pub fn read_source<P: AsRef<Path>>(path: P, tables: &TableNames) -> Result<RawTables> {
    let path = path.as_ref();
    // read-only open never creates the file, but the message is clearer this way
    if !path.is_file() {
        return Err(PipelineError::source_unavailable(
            path,
            "file does not exist",
            None,
        ));
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| PipelineError::source_unavailable(path, "opening snapshot", Some(e)))?;

    let result = read_all(&conn, path, tables);

    if let Err((_, e)) = conn.close() {
        warn!(error = %e, "closing source snapshot failed");
    }

    let raw = result?;
    info!(
        students = raw.students.len(),
        career_paths = raw.career_paths.len(),
        jobs = raw.jobs.len(),
        "source snapshot loaded"
    );
    Ok(raw)
}

fn read_all(conn: &Connection, path: &Path, tables: &TableNames) -> Result<RawTables> {
    let students = read_table(conn, path, &tables.students, &STUDENT_COLUMNS)?;
    let career_paths = read_table(conn, path, &tables.career_paths, &CAREER_PATH_COLUMNS)?;
    let jobs = read_table(conn, path, &tables.jobs, &JOB_COLUMNS)?;

    Ok(RawTables {
        students: students
            .into_iter()
            .enumerate()
            .map(|(row, mut cells)| RawStudentRecord {
                row,
                time_spent_hrs: cells.pop().flatten(),
                current_career_path_id: cells.pop().flatten(),
                num_course_taken: cells.pop().flatten(),
                job_id: cells.pop().flatten(),
                contact_info: cells.pop().flatten(),
                sex: cells.pop().flatten(),
                dob: cells.pop().flatten(),
                name: cells.pop().flatten(),
                uuid: cells.pop().flatten(),
            })
            .collect(),
        career_paths: career_paths
            .into_iter()
            .enumerate()
            .map(|(row, mut cells)| CareerPathRecord {
                row,
                hours_to_complete: cells.pop().flatten(),
                career_path_name: cells.pop().flatten(),
                career_path_id: cells.pop().flatten(),
            })
            .collect(),
        jobs: jobs
            .into_iter()
            .enumerate()
            .map(|(row, mut cells)| JobIndustryRecord {
                row,
                avg_salary: cells.pop().flatten(),
                job_category: cells.pop().flatten(),
                job_id: cells.pop().flatten(),
            })
            .collect(),
    })
}

/// List the column names of `table`; empty when the table does not exist.
pub(crate) fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let cols = stmt
        .query_map([table], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(cols)
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Whether `table` is an ordinary rowid table. Views and `WITHOUT ROWID`
/// tables have no `rowid` to order by.
fn has_rowid(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let row: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT type, sql FROM sqlite_master WHERE name = ?1 COLLATE NOCASE",
            [table],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    Ok(match row {
        Some((kind, sql)) => {
            let sql = sql
                .unwrap_or_default()
                .to_ascii_uppercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            kind == "table" && !sql.contains("WITHOUT ROWID")
        }
        None => false,
    })
}

/// Select `columns` (in that order) from `table`. Rows come back in `rowid`
/// order when the table has one, else in SQLite's scan order.
fn read_table(conn: &Connection, path: &Path, table: &str, columns: &[&str]) -> Result<Vec<RawRow>> {
    let present = table_columns(conn, table).map_err(|e| {
        PipelineError::source_unavailable(path, format!("inspecting table `{}`", table), Some(e))
    })?;
    if present.is_empty() {
        return Err(PipelineError::schema_mismatch(table, "table not found"));
    }

    let missing: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|c| !present.iter().any(|p| p == c))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::schema_mismatch(
            table,
            format!("missing column(s): {}", missing.join(", ")),
        ));
    }

    let ordered = has_rowid(conn, table).map_err(|e| {
        PipelineError::source_unavailable(path, format!("inspecting table `{}`", table), Some(e))
    })?;
    let select = format!(
        "SELECT {} FROM {}{}",
        columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", "),
        quote_ident(table),
        if ordered { " ORDER BY rowid" } else { "" }
    );
    debug!(%select, "reading raw table");

    let unavailable = |e: rusqlite::Error| {
        PipelineError::source_unavailable(path, format!("reading table `{}`", table), Some(e))
    };
    let mut stmt = conn.prepare(&select).map_err(unavailable)?;
    let rows = stmt
        .query_map([], |row| {
            (0..columns.len())
                .map(|i| row.get_ref(i).map(cell_to_text))
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .map_err(unavailable)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(unavailable)?;
    Ok(rows)
}
