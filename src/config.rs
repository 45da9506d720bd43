// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

pub const ENV_SOURCE_DB: &str = "SUBSCRIBER_PIPELINE_SOURCE_DB";
pub const ENV_STAGING_DIR: &str = "SUBSCRIBER_PIPELINE_STAGING_DIR";
pub const ENV_PRODUCTION_DIR: &str = "SUBSCRIBER_PIPELINE_PRODUCTION_DIR";

/// Names of the raw tables in the source snapshot and of the cleansed output table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TableNames {
    pub students: String,
    pub career_paths: String,
    pub jobs: String,
    pub cleansed: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            students: "cademycode_students".into(),
            career_paths: "cademycode_courses".into(),
            jobs: "cademycode_student_jobs".into(),
            cleansed: "cademycode_aggregated".into(),
        }
    }
}

/// File names of the artifact set. Staging and production use the same names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArtifactNames {
    pub relational: String,
    pub flat: String,
    pub changelog: String,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            relational: "cademycode_cleansed.db".into(),
            flat: "cademycode_cleansed.csv".into(),
            changelog: "changelog.md".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    pub source_db: PathBuf,
    pub staging_dir: PathBuf,
    pub production_dir: PathBuf,
    /// When set, logs are also appended to `<log_dir>/cleanse_db.log`.
    pub log_dir: Option<PathBuf>,
    pub tables: TableNames,
    pub artifacts: ArtifactNames,
    /// Free text recorded in every changelog entry.
    pub description: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_db: PathBuf::from("dev/cademycode.db"),
            staging_dir: PathBuf::from("staging"),
            production_dir: PathBuf::from("prod"),
            log_dir: None,
            tables: TableNames::default(),
            artifacts: ArtifactNames::default(),
            description: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a YAML file when given, else defaults; then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let text = fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                Self::from_yaml(&text).with_context(|| format!("parsing config {}", p.display()))?
            }
            None => Self::default(),
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        // an empty document deserializes to unit, not to a map
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var(ENV_SOURCE_DB) {
            self.source_db = PathBuf::from(v);
        }
        if let Ok(v) = env::var(ENV_STAGING_DIR) {
            self.staging_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var(ENV_PRODUCTION_DIR) {
            self.production_dir = PathBuf::from(v);
        }
    }

    pub fn staging_paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.staging_dir, &self.artifacts)
    }

    pub fn production_paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.production_dir, &self.artifacts)
    }
}

/// Concrete locations of one artifact set (staging or production).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub root: PathBuf,
    pub relational: PathBuf,
    pub flat: PathBuf,
    pub changelog: PathBuf,
}

impl ArtifactPaths {
    pub fn new(root: impl AsRef<Path>, names: &ArtifactNames) -> Self {
        let root = root.as_ref();
        Self {
            root: root.to_path_buf(),
            relational: root.join(&names.relational),
            flat: root.join(&names.flat),
            changelog: root.join(&names.changelog),
        }
    }
}
