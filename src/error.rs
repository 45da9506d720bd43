//! Error taxonomy shared by every pipeline stage and the promotion gate.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which part of the system raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Source,
    Transform,
    Write,
    Ledger,
    Promotion,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Source => "source",
            Stage::Transform => "transform",
            Stage::Write => "write",
            Stage::Ledger => "ledger",
            Stage::Promotion => "promotion",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("[source] snapshot {path:?} unavailable: {reason}")]
    SourceUnavailable {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("[source] schema mismatch in table `{table}`: {reason}")]
    SchemaMismatch { table: String, reason: String },

    #[error("[transform] {0}")]
    TransformError(String),

    #[error("[write] {path:?}: {reason}")]
    WriteError {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[ledger] changelog {path:?} is corrupt: {reason}")]
    LedgerCorrupt { path: PathBuf, reason: String },

    #[error("[promotion] staging/production inconsistent: {0}")]
    PromotionConsistencyError(String),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::SourceUnavailable { .. } | PipelineError::SchemaMismatch { .. } => {
                Stage::Source
            }
            PipelineError::TransformError(_) => Stage::Transform,
            PipelineError::WriteError { .. } => Stage::Write,
            PipelineError::LedgerCorrupt { .. } => Stage::Ledger,
            PipelineError::PromotionConsistencyError(_) => Stage::Promotion,
        }
    }

    pub(crate) fn source_unavailable(
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
        source: Option<rusqlite::Error>,
    ) -> Self {
        PipelineError::SourceUnavailable {
            path: path.into(),
            reason: reason.into(),
            source,
        }
    }

    pub(crate) fn schema_mismatch(table: &str, reason: impl Into<String>) -> Self {
        PipelineError::SchemaMismatch {
            table: table.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn write(
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PipelineError::WriteError {
            path: path.into(),
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn ledger_corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::LedgerCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
