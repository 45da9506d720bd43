use std::collections::BTreeMap;
use tracing::debug;

use super::convert::{StudentRow, SubscriberKey};

/// Does `candidate` replace `kept` as the surviving row for its uuid?
///
/// Most recent non-missing date wins; a dated row beats an undated one; on a
/// tie the row appearing later in the source wins.
fn supersedes(candidate: &StudentRow, kept: &StudentRow) -> bool {
    match (candidate.dob, kept.dob) {
        (Some(c), Some(k)) if c != k => c > k,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        _ => candidate.row > kept.row,
    }
}

/// Step 3: keep exactly one row per uuid. Output is ordered by uuid
/// ascending; the second value is how many rows were collapsed.
pub fn dedup_students(rows: Vec<StudentRow>) -> (Vec<StudentRow>, usize) {
    let input = rows.len();
    let mut by_uuid: BTreeMap<SubscriberKey, StudentRow> = BTreeMap::new();

    for row in rows {
        match by_uuid.get(&row.uuid) {
            Some(kept) if !supersedes(&row, kept) => {
                debug!(uuid = %row.uuid, dropped_row = row.row, kept_row = kept.row, "duplicate uuid");
            }
            _ => {
                by_uuid.insert(row.uuid.clone(), row);
            }
        }
    }

    let out: Vec<StudentRow> = by_uuid.into_values().collect();
    let collapsed = input - out.len();
    (out, collapsed)
}
