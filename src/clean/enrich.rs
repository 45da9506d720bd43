use std::collections::{hash_map::Entry, HashMap};
use tracing::{debug, warn};

use super::convert::{parse_f64, parse_id, Reference, StudentRow};
use super::utils::clean_opt;
use super::CleansedSubscriberRecord;
use crate::error::{PipelineError, Result};
use crate::source::{CareerPathRecord, JobIndustryRecord};

/// Career path name given to students enrolled in no career path.
pub const NOT_APPLICABLE: &str = "not_applicable";

#[derive(Debug, Clone, PartialEq)]
pub struct CareerPath {
    pub name: Option<String>,
    pub hours_to_complete: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobIndustry {
    pub category: Option<String>,
    pub avg_salary: Option<f64>,
}

/// Lookup tables for the enrichment join, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    pub career_paths: HashMap<i64, CareerPath>,
    pub jobs: HashMap<i64, JobIndustry>,
    /// Identical duplicate reference rows folded away while indexing.
    pub collapsed: usize,
}

impl ReferenceIndex {
    /// Validate and index both reference tables.
    ///
    /// Identical duplicate rows collapse; two rows sharing an id with
    /// different content would make the join ambiguous and fail the transform,
    /// as does a row whose id is missing or not an integer.
    pub fn build(career_paths: &[CareerPathRecord], jobs: &[JobIndustryRecord]) -> Result<Self> {
        let (career_paths, cp_collapsed) = index_by_id(
            "career path",
            career_paths.iter().map(|r| {
                (
                    r.row,
                    r.career_path_id.as_deref(),
                    CareerPath {
                        name: clean_opt(r.career_path_name.as_deref()),
                        hours_to_complete: parse_f64(r.hours_to_complete.as_deref()),
                    },
                )
            }),
        )?;
        let (jobs, job_collapsed) = index_by_id(
            "job",
            jobs.iter().map(|r| {
                (
                    r.row,
                    r.job_id.as_deref(),
                    JobIndustry {
                        category: clean_opt(r.job_category.as_deref()),
                        avg_salary: parse_f64(r.avg_salary.as_deref()),
                    },
                )
            }),
        )?;
        Ok(Self {
            career_paths,
            jobs,
            collapsed: cp_collapsed + job_collapsed,
        })
    }
}

fn index_by_id<'a, T, I>(kind: &str, rows: I) -> Result<(HashMap<i64, T>, usize)>
where
    T: PartialEq + std::fmt::Debug,
    I: Iterator<Item = (usize, Option<&'a str>, T)>,
{
    let mut map = HashMap::new();
    let mut collapsed = 0;
    for (row, raw_id, value) in rows {
        let id = clean_opt(raw_id)
            .and_then(|s| parse_id(&s))
            .ok_or_else(|| {
                PipelineError::TransformError(format!(
                    "{} at row {} has a missing or non-integer id ({:?})",
                    kind, row, raw_id
                ))
            })?;
        match map.entry(id) {
            Entry::Vacant(v) => {
                v.insert(value);
            }
            Entry::Occupied(o) if *o.get() == value => {
                debug!(kind, id, row, "identical duplicate reference row collapsed");
                collapsed += 1;
            }
            Entry::Occupied(o) => {
                return Err(PipelineError::TransformError(format!(
                    "duplicate {} id {} with conflicting rows: {:?} vs {:?}",
                    kind,
                    id,
                    o.get(),
                    value
                )));
            }
        }
    }
    Ok((map, collapsed))
}

/// Step 4: left-join each student onto its career path and job.
///
/// Unresolved references are nulled and flagged, never dropped. Derived
/// quality flags are left for `flags::derive_flags`.
pub fn enrich(rows: Vec<StudentRow>, index: &ReferenceIndex) -> Vec<CleansedSubscriberRecord> {
    rows.into_iter()
        .map(|r| {
            let (career, dangling_career_path) = match &r.career_path {
                Reference::Absent => (
                    Some(CareerPath {
                        name: Some(NOT_APPLICABLE.to_string()),
                        hours_to_complete: None,
                    }),
                    false,
                ),
                Reference::Id(id) => match index.career_paths.get(id) {
                    Some(cp) => (Some(cp.clone()), false),
                    None => (None, true),
                },
                Reference::Unparseable(_) => (None, true),
            };
            let (job, dangling_job) = match &r.job {
                Reference::Absent => (None, false),
                Reference::Id(id) => match index.jobs.get(id) {
                    Some(j) => (Some(j.clone()), false),
                    None => (None, true),
                },
                Reference::Unparseable(_) => (None, true),
            };

            if dangling_career_path {
                warn!(uuid = %r.uuid, reference = ?r.career_path, "dangling career path reference");
            }
            if dangling_job {
                warn!(uuid = %r.uuid, reference = ?r.job, "dangling job reference");
            }

            let (career_path_name, hours_to_complete) = career
                .map(|c| (c.name, c.hours_to_complete))
                .unwrap_or((None, None));
            let (job_category, avg_salary) =
                job.map(|j| (j.category, j.avg_salary)).unwrap_or((None, None));

            CleansedSubscriberRecord {
                uuid: r.uuid.to_string(),
                name: r.name,
                dob: r.dob,
                age: None,
                age_group: None,
                sex: r.sex,
                email: r.contact.email,
                street: r.contact.street,
                city: r.contact.city,
                state: r.contact.state,
                zip_code: r.contact.zip_code,
                job_id: r.job.id(),
                num_course_taken: r.num_course_taken,
                current_career_path_id: r.career_path.id(),
                time_spent_hrs: r.time_spent_hrs,
                career_path_name,
                hours_to_complete,
                job_category,
                avg_salary,
                missing_dob: r.missing_dob,
                missing_contact_info: false,
                missing_progress: false,
                dangling_career_path,
                dangling_job,
                incomplete: false,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::contact::Contact;
    use crate::clean::convert::SubscriberKey;

    fn cp(row: usize, id: &str, name: &str, hours: Option<&str>) -> CareerPathRecord {
        CareerPathRecord {
            row,
            career_path_id: Some(id.into()),
            career_path_name: Some(name.into()),
            hours_to_complete: hours.map(Into::into),
        }
    }

    fn job(row: usize, id: &str, category: &str) -> JobIndustryRecord {
        JobIndustryRecord {
            row,
            job_id: Some(id.into()),
            job_category: Some(category.into()),
            avg_salary: Some("50000".into()),
        }
    }

    fn student(uuid: i64, career_path: Reference, job: Reference) -> StudentRow {
        StudentRow {
            row: 0,
            uuid: SubscriberKey::Numeric(uuid),
            name: None,
            sex: None,
            dob_raw: None,
            dob: None,
            missing_dob: true,
            contact: Contact::default(),
            job,
            career_path,
            num_course_taken: Some(1.0),
            time_spent_hrs: Some(1.0),
        }
    }

    #[test]
    fn identical_duplicates_collapse() -> anyhow::Result<()> {
        let index = ReferenceIndex::build(
            &[cp(0, "1", "web", Some("20")), cp(1, "1.0", "web", Some("20"))],
            &[job(0, "3", "education"), job(1, "3", "education")],
        )?;
        assert_eq!(index.career_paths.len(), 1);
        assert_eq!(index.jobs.len(), 1);
        assert_eq!(index.collapsed, 2);
        Ok(())
    }

    #[test]
    fn conflicting_duplicate_ids_fail() {
        let err = ReferenceIndex::build(&[cp(0, "1", "web", None), cp(1, "1", "data", None)], &[])
            .unwrap_err();
        assert!(matches!(err, PipelineError::TransformError(ref m) if m.contains("duplicate career path id 1")));
    }

    #[test]
    fn reference_row_without_id_fails() {
        let mut bad = job(4, "x", "finance");
        bad.job_id = None;
        assert!(matches!(
            ReferenceIndex::build(&[], &[bad]),
            Err(PipelineError::TransformError(_))
        ));
    }

    #[test]
    fn join_resolves_nulls_and_flags() -> anyhow::Result<()> {
        let index = ReferenceIndex::build(&[cp(0, "1", "web", Some("20"))], &[job(0, "3", "education")])?;
        let out = enrich(
            vec![
                student(1, Reference::Id(1), Reference::Id(3)),
                student(2, Reference::Id(99), Reference::Unparseable("n/k".into())),
                student(3, Reference::Absent, Reference::Absent),
            ],
            &index,
        );

        assert_eq!(out[0].career_path_name.as_deref(), Some("web"));
        assert_eq!(out[0].hours_to_complete, Some(20.0));
        assert_eq!(out[0].job_category.as_deref(), Some("education"));
        assert!(!out[0].dangling_career_path && !out[0].dangling_job);

        assert_eq!(out[1].current_career_path_id, Some(99));
        assert_eq!(out[1].career_path_name, None);
        assert!(out[1].dangling_career_path);
        assert_eq!(out[1].job_id, None);
        assert!(out[1].dangling_job);

        assert_eq!(out[2].career_path_name.as_deref(), Some(NOT_APPLICABLE));
        assert!(!out[2].dangling_career_path && !out[2].dangling_job);
        Ok(())
    }
}
