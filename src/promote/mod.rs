// src/promote/mod.rs
//! Version-gated promotion of the staging artifact set into production.

use semver::Version;
use std::{
    fmt, fs,
    io::{self, BufRead, Write},
    path::Path,
};
use tracing::{debug, info, warn};

use crate::artifact::{commit, inspect_flat, inspect_relational, temp_in};
use crate::clean::CLEANSED_COLUMNS;
use crate::config::ArtifactPaths;
use crate::error::{PipelineError, Result};
use crate::ledger::{ChangelogHead, Ledger, LedgerVersion};

/// Asks the operator a yes/no question.
pub trait ConfirmationPort {
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Prompts on stdout and reads one line from stdin. Anything other than
/// `y`/`yes` (including EOF) is a no.
pub struct StdinConfirmation;

impl ConfirmationPort for StdinConfirmation {
    fn confirm(&mut self, prompt: &str) -> bool {
        print!("{} [y/N] ", prompt);
        if let Err(e) = io::stdout().flush() {
            warn!(error = %e, "flushing prompt failed");
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) => false,
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(e) => {
                warn!(error = %e, "reading confirmation failed");
                false
            }
        }
    }
}

/// Answers yes without asking (`--yes`).
pub struct AssumeYes;

impl ConfirmationPort for AssumeYes {
    fn confirm(&mut self, prompt: &str) -> bool {
        info!(prompt, "auto-confirmed");
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Checking,
    Promotable,
    UpToDate,
    Promoted,
    Cancelled,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateState::Idle => "idle",
            GateState::Checking => "checking",
            GateState::Promotable => "promotable",
            GateState::UpToDate => "up to date",
            GateState::Promoted => "promoted",
            GateState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Both changelog heads, as read without deciding anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStatus {
    pub staging: Option<ChangelogHead>,
    pub production: Option<ChangelogHead>,
}

impl VersionStatus {
    pub fn staging_version(&self) -> LedgerVersion {
        as_version(&self.staging)
    }

    pub fn production_version(&self) -> LedgerVersion {
        as_version(&self.production)
    }
}

fn as_version(head: &Option<ChangelogHead>) -> LedgerVersion {
    match head {
        Some(h) => LedgerVersion::Version(h.version.clone()),
        None => LedgerVersion::None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOutcome {
    /// `Promoted`, `UpToDate` or `Cancelled`.
    pub state: GateState,
    pub staging_version: Version,
    pub production_version: LedgerVersion,
    pub files_copied: usize,
}

pub struct PromotionGate {
    staging: ArtifactPaths,
    production: ArtifactPaths,
    table: String,
    state: GateState,
}

impl PromotionGate {
    pub fn new(staging: ArtifactPaths, production: ArtifactPaths, table: impl Into<String>) -> Self {
        Self {
            staging,
            production,
            table: table.into(),
            state: GateState::Idle,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Read both changelog heads. Production problems read as no version.
    pub fn status(&self) -> Result<VersionStatus> {
        Ok(VersionStatus {
            staging: Ledger::open(&self.staging.changelog).head()?,
            production: self.production_head(),
        })
    }

    fn production_head(&self) -> Option<ChangelogHead> {
        match Ledger::open(&self.production.changelog).head() {
            Ok(head) => head,
            Err(e) => {
                warn!(error = %e, "production changelog unusable; treating as no prior version");
                None
            }
        }
    }

    fn staging_head(&self) -> Result<ChangelogHead> {
        Ledger::open(&self.staging.changelog).head()?.ok_or_else(|| {
            PipelineError::ledger_corrupt(
                &self.staging.changelog,
                "staging changelog is missing or empty",
            )
        })
    }

    /// Decide between `Promotable` and `UpToDate`, validating the artifact
    /// sets on the way. Returns the staging head and production version.
    pub fn check(&mut self) -> Result<(ChangelogHead, LedgerVersion)> {
        self.state = GateState::Checking;

        // 1) read both heads
        let staging = self.staging_head()?;
        let production = as_version(&self.production_head());
        debug!(staging = %staging.version, %production, "versions read");

        // 2) decide
        if production == LedgerVersion::Version(staging.version.clone()) {
            self.verify_production_matches_staging()?;
            self.state = GateState::UpToDate;
        } else {
            self.validate_staging(&staging)?;
            self.state = GateState::Promotable;
        }
        info!(state = %self.state, staging = %staging.version, %production, "promotion check");
        Ok((staging, production))
    }

    /// Run the whole gate: check, confirm, copy.
    #[tracing::instrument(level = "info", skip_all, fields(staging = %self.staging.root.display(), production = %self.production.root.display()))]
    pub fn run(&mut self, confirm: &mut dyn ConfirmationPort) -> Result<GateOutcome> {
        let (staging, production) = self.check()?;
        let mut outcome = GateOutcome {
            state: self.state,
            staging_version: staging.version.clone(),
            production_version: production.clone(),
            files_copied: 0,
        };
        if self.state == GateState::UpToDate {
            return Ok(outcome);
        }

        let prompt = format!(
            "Promote staging {} over production {}?",
            staging.version, production
        );
        if !confirm.confirm(&prompt) {
            self.state = GateState::Cancelled;
            info!("promotion cancelled by operator");
            outcome.state = self.state;
            return Ok(outcome);
        }

        outcome.files_copied = self.copy_staging()?;
        self.state = GateState::Promoted;
        outcome.state = self.state;
        info!(version = %staging.version, files = outcome.files_copied, "promoted to production");
        Ok(outcome)
    }

    /// Changelog, relational file, flat file; in that order. Each file lands
    /// by rename, but the set as a whole is not atomic.
    fn copy_staging(&self) -> Result<usize> {
        if !self.production.root.is_dir() {
            return Err(PipelineError::WriteError {
                path: self.production.root.clone(),
                reason: "production directory does not exist".into(),
                source: None,
            });
        }
        let pairs = [
            (&self.staging.changelog, &self.production.changelog),
            (&self.staging.relational, &self.production.relational),
            (&self.staging.flat, &self.production.flat),
        ];
        for (src, dst) in pairs {
            copy_into_place(src, dst, &self.production.root)?;
            debug!(from = %src.display(), to = %dst.display(), "copied");
        }
        Ok(pairs.len())
    }

    /// Both staging data files exist, have the canonical columns and agree on
    /// row count with each other and with the changelog head.
    fn validate_staging(&self, head: &ChangelogHead) -> Result<()> {
        let rel = inspect_relational(&self.staging.relational, &self.table)?;
        let flat = inspect_flat(&self.staging.flat)?;

        for (what, summary) in [("relational", &rel), ("flat", &flat)] {
            if !summary
                .columns
                .iter()
                .map(String::as_str)
                .eq(CLEANSED_COLUMNS.iter().copied())
            {
                return Err(PipelineError::PromotionConsistencyError(format!(
                    "staging {} artifact has columns {:?}",
                    what, summary.columns
                )));
            }
        }
        if rel.rows != flat.rows {
            return Err(PipelineError::PromotionConsistencyError(format!(
                "staging row counts differ: relational {} vs flat {}",
                rel.rows, flat.rows
            )));
        }
        match head.rows_written {
            Some(n) if n == rel.rows => Ok(()),
            Some(n) => Err(PipelineError::PromotionConsistencyError(format!(
                "staging changelog {} records {} rows but artifacts hold {}",
                head.version, n, rel.rows
            ))),
            None => Err(PipelineError::PromotionConsistencyError(format!(
                "staging changelog {} records no row count",
                head.version
            ))),
        }
    }

    /// Same version on both sides: the production data files must be
    /// byte-identical to staging, or an earlier copy was interrupted.
    fn verify_production_matches_staging(&self) -> Result<()> {
        let pairs = [
            (&self.staging.relational, &self.production.relational),
            (&self.staging.flat, &self.production.flat),
        ];
        for (src, dst) in pairs {
            let same = match (fs::read(src), fs::read(dst)) {
                (Ok(a), Ok(b)) => a == b,
                (_, Err(e)) if e.kind() == io::ErrorKind::NotFound => false,
                (Err(e), _) | (_, Err(e)) => {
                    return Err(PipelineError::PromotionConsistencyError(format!(
                        "comparing {} with {}: {}",
                        src.display(),
                        dst.display(),
                        e
                    )))
                }
            };
            if !same {
                return Err(PipelineError::PromotionConsistencyError(format!(
                    "production changelog is current but {} does not match staging; \
                     a previous promotion was interrupted, rerun the pipeline and promote again",
                    dst.display()
                )));
            }
        }
        Ok(())
    }
}

fn copy_into_place(src: &Path, dst: &Path, dir: &Path) -> Result<()> {
    let tmp = temp_in(dir, ".promote-")?;
    let tmp_path = tmp.into_temp_path();
    fs::copy(src, &tmp_path)
        .and_then(|_| fs::File::open(&tmp_path)?.sync_all())
        .map_err(|e| PipelineError::write(src, "copying into production", e))?;
    commit(vec![(tmp_path, dst.to_path_buf())])
}
