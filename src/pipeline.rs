// src/pipeline.rs
//! One pipeline invocation: read, clean, write and record.
//!
//! The two data files and the changelog entry land in staging as one unit;
//! a failure at any point leaves the previous staging set in place.

use chrono::Utc;
use tracing::info;

use crate::artifact::{commit, stage_artifacts};
use crate::clean::{transform, TransformOptions, TransformStats};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ledger::{ChangelogEntry, Ledger};
use crate::source::read_source;

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub stats: TransformStats,
    pub entry: ChangelogEntry,
}

/// Run every stage against the configured snapshot and staging directory.
/// Stops at the first failing stage.
#[tracing::instrument(level = "info", skip_all, fields(source = %cfg.source_db.display(), staging = %cfg.staging_dir.display()))]
pub fn run_pipeline(cfg: &PipelineConfig, opts: &TransformOptions) -> Result<PipelineReport> {
    let staging = cfg.staging_paths();
    let ledger = Ledger::open(&staging.changelog);

    // 0) refuse early if the changelog is unusable, before any artifact changes
    let prior = ledger.latest_version()?;
    info!(%prior, "staging changelog");

    // 1) read
    let raw = read_source(&cfg.source_db, &cfg.tables)?;

    // 2) clean
    let cleaned = transform(&raw, opts)?;

    // 3) write data and changelog to temps, then swap all three in together
    let mut staged = stage_artifacts(&cleaned.records, &staging, &cfg.tables.cleansed)?;
    let (entry, changelog_tmp) =
        ledger.prepare(&cleaned.stats, cfg.description.as_deref(), Utc::now())?;
    staged.push((changelog_tmp, staging.changelog.clone()));
    commit(staged)?;

    info!(
        version = %entry.version,
        rows = cleaned.stats.output_rows,
        flagged = cleaned.stats.flagged_rows,
        "pipeline finished"
    );
    Ok(PipelineReport {
        stats: cleaned.stats,
        entry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{read_flat, read_relational};
    use crate::error::{PipelineError, Stage};
    use crate::test_support::{init_test_logging, write_fixture_db, FixtureStudent};
    use anyhow::Result;
    use chrono::NaiveDate;
    use semver::Version;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn setup() -> Result<(TempDir, PipelineConfig)> {
        let tmp = tempdir()?;
        let cfg = PipelineConfig {
            source_db: tmp.path().join("cademycode.db"),
            staging_dir: tmp.path().join("staging"),
            production_dir: tmp.path().join("prod"),
            description: Some("test run".into()),
            ..PipelineConfig::default()
        };
        fs::create_dir_all(&cfg.staging_dir)?;
        Ok((tmp, cfg))
    }

    fn opts() -> TransformOptions {
        TransformOptions {
            reference_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        }
    }

    #[test]
    fn end_to_end_writes_artifacts_and_changelog() -> Result<()> {
        init_test_logging();
        let (_tmp, cfg) = setup()?;
        write_fixture_db(
            &cfg.source_db,
            &[
                FixtureStudent::new("1").dob("1980-05-17"),
                FixtureStudent::new("2").career_path_id(None).job_id(Some("9")),
                FixtureStudent::new("1").dob("1985-01-01").name("Later Row"),
                FixtureStudent::new("3").num_course_taken("n/a").time_spent_hrs(None),
                FixtureStudent::new("a7f3-19").no_dob().contact_info(None),
            ],
            &[("1", "data scientist", Some("20"))],
            &[("1", "analytics", Some("86000"))],
        )?;

        let report = run_pipeline(&cfg, &opts())?;
        assert_eq!(report.entry.version, Version::new(0, 0, 0));
        assert_eq!(report.stats.input_rows, 5);
        assert_eq!(report.stats.output_rows, 4);
        assert_eq!(report.stats.duplicates_collapsed, 1);

        let staging = cfg.staging_paths();
        let flat = read_flat(&staging.flat)?;
        assert_eq!(flat, read_relational(&staging.relational, &cfg.tables.cleansed)?);
        let ids: Vec<&str> = flat.iter().map(|r| r.uuid.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "a7f3-19"]);

        assert_eq!(flat[0].name.as_deref(), Some("Later Row"));
        assert_eq!(flat[1].career_path_name.as_deref(), Some("not_applicable"));
        assert!(flat[1].dangling_job);
        assert!(flat[2].missing_progress);
        assert!(flat[3].missing_dob && flat[3].missing_contact_info);
        assert_eq!((flat[3].dob, flat[3].email.as_deref()), (None, None));

        let log = fs::read_to_string(&staging.changelog)?;
        assert!(log.starts_with("Version 0.0.0 "));
        assert!(log.contains("- 4 cleansed rows written\n"));
        assert!(log.contains("- 1 rows missing a date\n"));
        assert!(log.contains("- test run\n"));

        let again = run_pipeline(&cfg, &opts())?;
        assert_eq!(again.entry.version, Version::new(0, 0, 1));
        Ok(())
    }

    #[test]
    fn failed_changelog_commit_keeps_previous_staging_set() -> Result<()> {
        init_test_logging();
        let (tmp, cfg) = setup()?;
        write_fixture_db(&cfg.source_db, &[FixtureStudent::new("1").name("OLD")], &[], &[])?;
        run_pipeline(&cfg, &opts())?;

        let next_source = tmp.path().join("next.db");
        write_fixture_db(&next_source, &[FixtureStudent::new("1").name("NEW")], &[], &[])?;
        let cfg = PipelineConfig {
            source_db: next_source,
            ..cfg
        };
        let staging = cfg.staging_paths();
        let before_log = fs::read_to_string(&staging.changelog)?;
        let before_db = fs::read(&staging.relational)?;

        // the previous changelog cannot be set aside onto a non-empty directory
        let blocker = staging.root.join(".changelog.md.bak");
        fs::create_dir(&blocker)?;
        fs::write(blocker.join("keep"), b"x")?;

        let err = run_pipeline(&cfg, &opts()).unwrap_err();
        assert_eq!(err.stage(), Stage::Write, "{err}");

        let flat = read_flat(&staging.flat)?;
        assert_eq!(flat[0].name.as_deref(), Some("OLD"));
        assert_eq!(fs::read(&staging.relational)?, before_db);
        assert_eq!(fs::read_to_string(&staging.changelog)?, before_log);
        Ok(())
    }

    #[test]
    fn missing_source_fails_without_touching_staging() -> Result<()> {
        let (_tmp, cfg) = setup()?;
        let err = run_pipeline(&cfg, &opts()).unwrap_err();
        assert_eq!(err.stage(), Stage::Source);
        assert_eq!(fs::read_dir(&cfg.staging_dir)?.count(), 0);
        Ok(())
    }

    #[test]
    fn corrupt_changelog_stops_before_writing() -> Result<()> {
        let (_tmp, cfg) = setup()?;
        write_fixture_db(&cfg.source_db, &[FixtureStudent::new("1")], &[], &[])?;
        let staging = cfg.staging_paths();
        fs::write(&staging.changelog, "garbage\n")?;

        let err = run_pipeline(&cfg, &opts()).unwrap_err();
        assert!(matches!(err, PipelineError::LedgerCorrupt { .. }), "{err}");
        assert!(!staging.flat.exists());
        assert!(!staging.relational.exists());
        Ok(())
    }
}
