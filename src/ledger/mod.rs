// src/ledger/mod.rs
//! Append-only, newest-first changelog that carries the dataset version.
//!
//! Each entry starts with a head line `<label> <version> [anything]`; only the
//! second whitespace-delimited token matters to readers.

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use std::{
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tempfile::TempPath;
use tracing::{debug, info};

use crate::artifact::{commit, temp_in};
use crate::clean::TransformStats;
use crate::error::{PipelineError, Result};

pub const VERSION_LABEL: &str = "Version";

static HEAD_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\S+)\s+(\S+)").expect("valid regex"));
static ROWS_WRITTEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^- (\d+) cleansed rows written\b").expect("valid regex"));

/// A dataset version as recorded in a changelog, or the absence of one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerVersion {
    None,
    Version(Version),
}

impl LedgerVersion {
    /// Next version: bump the least-significant component. The first
    /// version ever written is `0.0.0`. `None` when the patch component
    /// cannot grow any further.
    pub fn next(&self) -> Option<Version> {
        match self {
            LedgerVersion::None => Some(Version::new(0, 0, 0)),
            LedgerVersion::Version(v) => v
                .patch
                .checked_add(1)
                .map(|patch| Version::new(v.major, v.minor, patch)),
        }
    }
}

impl fmt::Display for LedgerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerVersion::None => write!(f, "none"),
            LedgerVersion::Version(v) => write!(f, "{}", v),
        }
    }
}

/// The newest entry's head line plus the row count it recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogHead {
    pub version: Version,
    pub line: String,
    /// `cleansed rows written` from the entry body, when present.
    pub rows_written: Option<usize>,
}

/// Extract the version token (second token) from a head line.
pub fn parse_version_line(line: &str) -> std::result::Result<Version, String> {
    let caps = HEAD_LINE
        .captures(line.trim_start())
        .ok_or_else(|| format!("expected `<label> <version>`, found {:?}", line))?;
    let token = &caps[2];
    Version::parse(token).map_err(|e| format!("bad version token {:?}: {}", token, e))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangelogEntry {
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub input_rows: usize,
    pub output_rows: usize,
    pub duplicates_collapsed: usize,
    pub flagged_rows: usize,
    pub missing_dates: usize,
    pub dangling_references: usize,
    pub reference_duplicates_collapsed: usize,
    pub description: Option<String>,
}

impl ChangelogEntry {
    pub fn render(&self) -> String {
        let mut out = format!(
            "{} {} {}\n### Added\n- {} cleansed rows written\n- {} input rows read\n- {} duplicate rows collapsed\n- {} rows flagged\n- {} rows missing a date\n- {} dangling references\n- {} duplicate reference rows collapsed\n",
            VERSION_LABEL,
            self.version,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.output_rows,
            self.input_rows,
            self.duplicates_collapsed,
            self.flagged_rows,
            self.missing_dates,
            self.dangling_references,
            self.reference_duplicates_collapsed,
        );
        if let Some(d) = self.description.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            // keep the entry body line-oriented
            out.push_str(&format!("- {}\n", d.replace('\n', " ")));
        }
        out.push('\n');
        out
    }
}

/// The changelog file of one artifact set.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::ledger_corrupt(
                &self.path,
                format!("unreadable: {}", e),
            )),
        }
    }

    /// Newest entry, `None` when the changelog is absent or empty.
    pub fn head(&self) -> Result<Option<ChangelogHead>> {
        let Some(text) = self.read()? else {
            return Ok(None);
        };
        let mut lines = text.lines();
        let Some(first) = lines.next() else {
            return Ok(None);
        };
        let version =
            parse_version_line(first).map_err(|r| PipelineError::ledger_corrupt(&self.path, r))?;
        let rows_written = lines
            .take_while(|l| !l.trim().is_empty())
            .find_map(|l| ROWS_WRITTEN.captures(l.trim()))
            .and_then(|c| c[1].parse().ok());
        Ok(Some(ChangelogHead {
            version,
            line: first.to_string(),
            rows_written,
        }))
    }

    pub fn latest_version(&self) -> Result<LedgerVersion> {
        Ok(match self.head()? {
            Some(h) => LedgerVersion::Version(h.version),
            None => LedgerVersion::None,
        })
    }

    /// Render the next entry ahead of the existing history into a temp file
    /// beside the changelog. Nothing is visible until the returned path is
    /// committed onto `self.path()`.
    ///
    /// Fails with `LedgerCorrupt` if the current head line cannot be parsed
    /// or its version cannot be bumped.
    pub fn prepare(
        &self,
        stats: &TransformStats,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(ChangelogEntry, TempPath)> {
        let prior = self.latest_version()?;
        let existing = self.read()?.unwrap_or_default();
        let version = prior.next().ok_or_else(|| {
            PipelineError::ledger_corrupt(
                &self.path,
                format!("version {} cannot be incremented", prior),
            )
        })?;

        let entry = ChangelogEntry {
            version,
            timestamp: now,
            input_rows: stats.input_rows,
            output_rows: stats.output_rows,
            duplicates_collapsed: stats.duplicates_collapsed,
            flagged_rows: stats.flagged_rows,
            missing_dates: stats.missing_dates,
            dangling_references: stats.dangling_references(),
            reference_duplicates_collapsed: stats.reference_duplicates_collapsed,
            description: description.map(str::to_string),
        };
        debug!(%prior, next = %entry.version, "computed next version");

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = temp_in(dir, ".changelog-")?;
        let tmp_path = tmp.path().to_path_buf();
        let written = tmp
            .write_all(entry.render().as_bytes())
            .and_then(|_| tmp.write_all(existing.as_bytes()))
            .and_then(|_| tmp.as_file().sync_all());
        if let Err(e) = written {
            return Err(PipelineError::write(&tmp_path, "writing changelog", e));
        }
        Ok((entry, tmp.into_temp_path()))
    }

    /// Prepend a new entry for this run and return it.
    #[tracing::instrument(level = "info", skip(self, stats, description), fields(path = %self.path.display()))]
    pub fn append(
        &self,
        stats: &TransformStats,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ChangelogEntry> {
        let (entry, tmp) = self.prepare(stats, description, now)?;
        commit(vec![(tmp, self.path.clone())])?;
        info!(version = %entry.version, "changelog entry appended");
        Ok(entry)
    }
}
