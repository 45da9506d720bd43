use rusqlite::{params, Connection, OpenFlags};
use std::{fs::File, path::Path};
use tempfile::TempPath;
use tracing::debug;

use super::{temp_in, ArtifactSummary};
use crate::clean::{CleansedSubscriberRecord, CLEANSED_COLUMNS};
use crate::error::{PipelineError, Result};
use crate::source::{quote_ident, table_columns};

/// SQLite type of each cleansed column, aligned with `CLEANSED_COLUMNS`.
const COLUMN_TYPES: [&str; 25] = [
    "TEXT PRIMARY KEY",
    "TEXT",
    "TEXT",
    "INTEGER",
    "INTEGER",
    "TEXT",
    "TEXT",
    "TEXT",
    "TEXT",
    "TEXT",
    "TEXT",
    "INTEGER",
    "REAL",
    "INTEGER",
    "REAL",
    "TEXT",
    "REAL",
    "TEXT",
    "REAL",
    "INTEGER NOT NULL",
    "INTEGER NOT NULL",
    "INTEGER NOT NULL",
    "INTEGER NOT NULL",
    "INTEGER NOT NULL",
    "INTEGER NOT NULL",
];

fn create_table_sql(table: &str) -> String {
    let cols = CLEANSED_COLUMNS
        .iter()
        .zip(COLUMN_TYPES.iter())
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", quote_ident(table), cols)
}

fn insert_sql(table: &str) -> String {
    let placeholders = (1..=CLEANSED_COLUMNS.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {} VALUES ({})", quote_ident(table), placeholders)
}

/// Write `records` into a fresh SQLite file next to its final location.
/// The returned path is deleted on drop unless persisted.
pub fn write_temp(records: &[CleansedSubscriberRecord], dir: &Path, table: &str) -> Result<TempPath> {
    let tmp = temp_in(dir, ".cleansed-db-")?.into_temp_path();
    let path = tmp.to_path_buf();
    let fail = |what: &str, e: rusqlite::Error| PipelineError::write(&path, what.to_string(), e);

    let mut conn = Connection::open(&tmp).map_err(|e| fail("opening temp database", e))?;
    conn.execute(&create_table_sql(table), [])
        .map_err(|e| fail("creating cleansed table", e))?;

    let tx = conn.transaction().map_err(|e| fail("starting transaction", e))?;
    {
        let mut stmt = tx
            .prepare(&insert_sql(table))
            .map_err(|e| fail("preparing insert", e))?;
        for r in records {
            stmt.execute(params![
                r.uuid,
                r.name,
                r.dob,
                r.age,
                r.age_group,
                r.sex,
                r.email,
                r.street,
                r.city,
                r.state,
                r.zip_code,
                r.job_id,
                r.num_course_taken,
                r.current_career_path_id,
                r.time_spent_hrs,
                r.career_path_name,
                r.hours_to_complete,
                r.job_category,
                r.avg_salary,
                r.missing_dob,
                r.missing_contact_info,
                r.missing_progress,
                r.dangling_career_path,
                r.dangling_job,
                r.incomplete,
            ])
            .map_err(|e| fail("inserting record", e))?;
        }
    }
    tx.commit().map_err(|e| fail("committing records", e))?;
    conn.close().map_err(|(_, e)| fail("closing temp database", e))?;

    File::open(&path)
        .and_then(|f| f.sync_all())
        .map_err(|e| PipelineError::write(&path, "syncing temp database", e))?;

    debug!(path = %path.display(), rows = records.len(), "relational snapshot staged");
    Ok(tmp)
}

fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        return Err(PipelineError::PromotionConsistencyError(format!(
            "relational artifact {} is missing",
            path.display()
        )));
    }
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(|e| read_error(path, e))
}

fn read_error(path: &Path, e: rusqlite::Error) -> PipelineError {
    PipelineError::PromotionConsistencyError(format!("reading {}: {}", path.display(), e))
}

/// Column names and row count of the cleansed table.
pub fn inspect_relational(path: &Path, table: &str) -> Result<ArtifactSummary> {
    let conn = open_read_only(path)?;
    let columns = table_columns(&conn, table).map_err(|e| read_error(path, e))?;
    let rows: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)), [], |r| r.get(0))
        .map_err(|e| read_error(path, e))?;
    Ok(ArtifactSummary {
        columns,
        rows: rows as usize,
    })
}

/// Load every record back, in the order they were written.
pub fn read_relational(path: &Path, table: &str) -> Result<Vec<CleansedSubscriberRecord>> {
    let conn = open_read_only(path)?;
    let select = format!(
        "SELECT {} FROM {} ORDER BY rowid",
        CLEANSED_COLUMNS
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", "),
        quote_ident(table)
    );
    let mut stmt = conn.prepare(&select).map_err(|e| read_error(path, e))?;
    let records = stmt
        .query_map([], |r| {
            Ok(CleansedSubscriberRecord {
                uuid: r.get(0)?,
                name: r.get(1)?,
                dob: r.get(2)?,
                age: r.get(3)?,
                age_group: r.get(4)?,
                sex: r.get(5)?,
                email: r.get(6)?,
                street: r.get(7)?,
                city: r.get(8)?,
                state: r.get(9)?,
                zip_code: r.get(10)?,
                job_id: r.get(11)?,
                num_course_taken: r.get(12)?,
                current_career_path_id: r.get(13)?,
                time_spent_hrs: r.get(14)?,
                career_path_name: r.get(15)?,
                hours_to_complete: r.get(16)?,
                job_category: r.get(17)?,
                avg_salary: r.get(18)?,
                missing_dob: r.get(19)?,
                missing_contact_info: r.get(20)?,
                missing_progress: r.get(21)?,
                dangling_career_path: r.get(22)?,
                dangling_job: r.get(23)?,
                incomplete: r.get(24)?,
            })
        })
        .map_err(|e| read_error(path, e))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| read_error(path, e))?;
    Ok(records)
}
