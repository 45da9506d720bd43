use chrono::NaiveDate;

use super::date_parser::{age_group, age_on};
use super::CleansedSubscriberRecord;

/// Step 5: derived fields and quality flags. Never removes a record.
pub fn derive_flags(rec: &mut CleansedSubscriberRecord, reference_date: NaiveDate) {
    rec.age = rec.dob.and_then(|dob| age_on(dob, reference_date));
    rec.age_group = rec.age.map(age_group);

    rec.missing_contact_info = rec.email.is_none()
        || rec.street.is_none()
        || rec.city.is_none()
        || rec.state.is_none()
        || rec.zip_code.is_none();
    rec.missing_progress = rec.num_course_taken.is_none() || rec.time_spent_hrs.is_none();
    rec.incomplete = rec.missing_progress
        || rec.job_id.is_none()
        || rec.dangling_career_path
        || rec.dangling_job;
}

impl CleansedSubscriberRecord {
    /// True when any quality flag is raised.
    pub fn is_flagged(&self) -> bool {
        self.missing_dob
            || self.missing_contact_info
            || self.missing_progress
            || self.dangling_career_path
            || self.dangling_job
            || self.incomplete
    }
}
