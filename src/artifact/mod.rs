// src/artifact/mod.rs

pub mod flat;
pub mod relational;

pub use flat::{inspect_flat, read_flat};
pub use relational::{inspect_relational, read_relational};

use std::{
    fs,
    path::{Path, PathBuf},
};
use tempfile::{Builder, NamedTempFile, TempPath};
use tracing::{info, warn};

use crate::clean::CleansedSubscriberRecord;
use crate::config::ArtifactPaths;
use crate::error::{PipelineError, Result};

/// Shape of one written data artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSummary {
    pub columns: Vec<String>,
    pub rows: usize,
}

pub(crate) fn temp_in(dir: &Path, prefix: &str) -> Result<NamedTempFile> {
    Builder::new()
        .prefix(prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| PipelineError::write(dir, "creating temp file", e))
}

/// Write the relational snapshot and the flat export into temp files inside
/// `staging`, paired with the paths they replace.
///
/// Nothing is visible until the pairs go through `commit`, so staging ends
/// up with either the new set or the old one; dropping the pairs deletes the
/// temps.
#[tracing::instrument(level = "info", skip(records, staging), fields(dir = %staging.root.display(), rows = records.len()))]
pub fn stage_artifacts(
    records: &[CleansedSubscriberRecord],
    staging: &ArtifactPaths,
    table: &str,
) -> Result<Vec<(TempPath, PathBuf)>> {
    if !staging.root.is_dir() {
        return Err(PipelineError::WriteError {
            path: staging.root.clone(),
            reason: "staging directory does not exist".into(),
            source: None,
        });
    }

    let relational_tmp = relational::write_temp(records, &staging.root, table)?;
    let flat_tmp = flat::write_temp(records, &staging.root)?;
    info!(
        relational = %staging.relational.display(),
        flat = %staging.flat.display(),
        "artifacts staged"
    );
    Ok(vec![
        (relational_tmp, staging.relational.clone()),
        (flat_tmp, staging.flat.clone()),
    ])
}

struct SetAside {
    target: PathBuf,
    backup: Option<PathBuf>,
}

fn backup_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.bak", name))
}

/// Rename every staged temp file onto its target as one unit.
///
/// Existing targets are moved aside first. If any rename fails, targets
/// already replaced are removed and every set-aside file is moved back.
pub fn commit(staged: Vec<(TempPath, PathBuf)>) -> Result<()> {
    let mut aside: Vec<SetAside> = Vec::with_capacity(staged.len());
    for (_, target) in &staged {
        let backup = if target.exists() {
            let b = backup_path(target);
            if let Err(e) = fs::rename(target, &b) {
                rollback(&aside, 0);
                return Err(PipelineError::write(target, "setting previous artifact aside", e));
            }
            Some(b)
        } else {
            None
        };
        aside.push(SetAside {
            target: target.clone(),
            backup,
        });
    }

    let mut committed = 0;
    for (tmp, target) in staged {
        if let Err(e) = tmp.persist(&target) {
            rollback(&aside, committed);
            return Err(PipelineError::write(&target, "renaming temp file into place", e.error));
        }
        committed += 1;
    }

    for a in &aside {
        if let Some(b) = &a.backup {
            if let Err(e) = fs::remove_file(b) {
                warn!(backup = %b.display(), error = %e, "could not remove previous artifact");
            }
        }
    }
    Ok(())
}

fn rollback(aside: &[SetAside], committed: usize) {
    for (i, a) in aside.iter().enumerate() {
        if i < committed {
            if let Err(e) = fs::remove_file(&a.target) {
                warn!(target = %a.target.display(), error = %e, "rollback: removing new artifact failed");
            }
        }
        if let Some(b) = &a.backup {
            if let Err(e) = fs::rename(b, &a.target) {
                warn!(backup = %b.display(), error = %e, "rollback: restoring previous artifact failed");
            }
        }
    }
}
