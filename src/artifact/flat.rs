use csv::{ReaderBuilder, WriterBuilder};
use std::path::Path;
use tempfile::TempPath;
use tracing::debug;

use super::{temp_in, ArtifactSummary};
use crate::clean::{CleansedSubscriberRecord, CLEANSED_COLUMNS};
use crate::error::{PipelineError, Result};

/// Write `records` as CSV into a temp file in `dir`.
///
/// The header is written explicitly so an empty record set still yields a
/// file with the full header row. Missing values are empty fields.
pub fn write_temp(records: &[CleansedSubscriberRecord], dir: &Path) -> Result<TempPath> {
    let mut tmp = temp_in(dir, ".cleansed-csv-")?;
    let path = tmp.path().to_path_buf();
    let fail = |what: &str, e: csv::Error| PipelineError::write(&path, what.to_string(), e);

    {
        let mut w = WriterBuilder::new()
            .has_headers(false)
            .from_writer(tmp.as_file_mut());
        w.write_record(CLEANSED_COLUMNS)
            .map_err(|e| fail("writing header", e))?;
        for r in records {
            w.serialize(r).map_err(|e| fail("writing record", e))?;
        }
        w.flush()
            .map_err(|e| PipelineError::write(&path, "flushing csv", e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| PipelineError::write(&path, "syncing csv", e))?;

    debug!(path = %path.display(), rows = records.len(), "flat export staged");
    Ok(tmp.into_temp_path())
}

fn read_error(path: &Path, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::PromotionConsistencyError(format!("reading {}: {}", path.display(), e))
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    if !path.is_file() {
        return Err(PipelineError::PromotionConsistencyError(format!(
            "flat artifact {} is missing",
            path.display()
        )));
    }
    ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| read_error(path, e))
}

/// Header names and data row count.
pub fn inspect_flat(path: &Path) -> Result<ArtifactSummary> {
    let mut rdr = open_reader(path)?;
    let columns = rdr
        .headers()
        .map_err(|e| read_error(path, e))?
        .iter()
        .map(str::to_string)
        .collect();
    let mut rows = 0;
    for rec in rdr.records() {
        rec.map_err(|e| read_error(path, e))?;
        rows += 1;
    }
    Ok(ArtifactSummary { columns, rows })
}

/// Parse the flat export back into records; the inverse of `write_temp`.
pub fn read_flat(path: &Path) -> Result<Vec<CleansedSubscriberRecord>> {
    let mut rdr = open_reader(path)?;
    let headers = rdr.headers().map_err(|e| read_error(path, e))?;
    if !headers.iter().eq(CLEANSED_COLUMNS.iter().copied()) {
        return Err(read_error(
            path,
            format!("unexpected header {:?}", headers.iter().collect::<Vec<_>>()),
        ));
    }
    rdr.deserialize()
        .collect::<std::result::Result<Vec<CleansedSubscriberRecord>, _>>()
        .map_err(|e| read_error(path, e))
}
