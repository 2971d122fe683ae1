use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::dates;
use crate::enrollment::EnrollmentStatus;
use crate::errors::BackendError;
use crate::normalization;

/// One presence or absence mark for one enrollment on one class date.
///
/// At most one record exists per (enrollment, class date) pair.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct AttendanceRecord {
    /// The ID of the record.
    pub id: Uuid,

    /// The enrollment the mark belongs to.
    pub enrollment_id: Uuid,

    /// The class date the mark is for.
    #[serde(with = "dates::date")]
    pub class_date: Date,

    /// Sequence of the class within the workshop, if tracked.
    pub class_number: Option<i32>,

    /// Whether the learner was present.
    pub present: bool,

    /// Justification text, normally used for absences.
    pub justification: Option<String>,

    /// Free-form remark by the recording tutor.
    pub tutor_remark: Option<String>,

    /// Who recorded the mark.
    pub recorded_by: Option<Uuid>,

    /// The date and time it was created.
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,

    /// The date and time it was last modified.
    #[serde(with = "time::serde::timestamp")]
    pub updated_at: OffsetDateTime,
}

/// One entry of a batch registration payload.
#[derive(Clone, Debug, Deserialize)]
pub struct AttendanceEntry {
    pub enrollment_id: Uuid,

    pub class_number: Option<i32>,

    pub present: bool,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub justification: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub tutor_remark: Option<String>,
}

/// A batch of attendance entries for one workshop on one class date.
#[derive(Clone, Debug, Deserialize)]
pub struct AttendanceBatch {
    #[serde(with = "dates::date")]
    pub class_date: Date,

    pub recorded_by: Uuid,

    pub entries: Vec<AttendanceEntry>,
}

/// A partial update to a single attendance record. Absent fields are
/// left untouched.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AttendancePatch {
    #[serde(default, with = "dates::date_option")]
    pub class_date: Option<Date>,

    pub class_number: Option<i32>,

    pub present: Option<bool>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub justification: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub tutor_remark: Option<String>,

    pub recorded_by: Option<Uuid>,
}

impl AttendancePatch {
    pub fn is_empty(&self) -> bool {
        self.class_date.is_none()
            && self.class_number.is_none()
            && self.present.is_none()
            && self.justification.is_none()
            && self.tutor_remark.is_none()
            && self.recorded_by.is_none()
    }
}

/// The full set of writable fields of one attendance row, as applied
/// by an upsert or a merged patch.
#[derive(Clone, Debug)]
pub struct AttendanceWrite {
    pub class_date: Date,
    pub class_number: Option<i32>,
    pub present: bool,
    pub justification: Option<String>,
    pub tutor_remark: Option<String>,
    pub recorded_by: Option<Uuid>,
}

/// The derived aggregate fields of one enrollment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aggregate {
    pub total_presences: i32,
    pub total_absences: i32,
    pub percent_attendance: f64,
    pub total_classes_expected: i32,
    pub eligible_for_certificate: bool,
}

impl Aggregate {
    /// The number of distinct class dates on file.
    pub fn total_recorded(&self) -> i32 {
        self.total_presences + self.total_absences
    }
}

/// Recomputes the aggregate for one enrollment from the full set of
/// its attendance records.
///
/// `total_classes_expected` is a watermark: deleting records must not
/// shrink the denominator shown to users, so it only ever grows. With
/// no records on file the percentage is defined as zero.
pub fn recompute(
    records: &[AttendanceRecord],
    previous_expected: i32,
    status: EnrollmentStatus,
    minimum_percent: f64,
) -> Aggregate {
    let total_recorded = records.len() as i32;
    let total_presences = records.iter().filter(|record| record.present).count() as i32;
    let total_absences = total_recorded - total_presences;

    let percent_attendance = if total_recorded > 0 {
        round_percent(f64::from(total_presences) / f64::from(total_recorded) * 100.0)
    } else {
        0.0
    };

    Aggregate {
        total_presences,
        total_absences,
        percent_attendance,
        total_classes_expected: total_recorded.max(previous_expected),
        eligible_for_certificate: status == EnrollmentStatus::Completed
            && percent_attendance >= minimum_percent,
    }
}

/// Rejects an empty batch.
pub fn ensure_entries_present(entries: &[AttendanceEntry]) -> Result<(), BackendError> {
    if entries.is_empty() {
        Err(BackendError::EmptyBatch)
    } else {
        Ok(())
    }
}

/// Rejects a batch naming the same enrollment more than once.
pub fn ensure_unique_enrollments(entries: &[AttendanceEntry]) -> Result<(), BackendError> {
    let mut seen = HashSet::with_capacity(entries.len());

    for entry in entries {
        if !seen.insert(entry.enrollment_id) {
            return Err(BackendError::DuplicateEnrollmentInBatch(entry.enrollment_id));
        }
    }

    Ok(())
}

fn round_percent(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use time::{Date, OffsetDateTime};
    use uuid::Uuid;

    use super::*;
    use crate::enrollment::EnrollmentStatus;

    fn record(day: u8, present: bool) -> AttendanceRecord {
        let now = OffsetDateTime::now_utc();

        AttendanceRecord {
            id: Uuid::new_v4(),
            enrollment_id: Uuid::new_v4(),
            class_date: Date::try_from_ymd(2026, 3, day).unwrap(),
            class_number: None,
            present,
            justification: None,
            tutor_remark: None,
            recorded_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn records(marks: &[bool]) -> Vec<AttendanceRecord> {
        marks
            .iter()
            .enumerate()
            .map(|(i, &present)| record(i as u8 + 1, present))
            .collect()
    }

    #[test]
    fn no_records_means_zero_percent() {
        let aggregate = recompute(&[], 0, EnrollmentStatus::Enrolled, 75.0);

        assert_eq!(aggregate.total_presences, 0);
        assert_eq!(aggregate.total_absences, 0);
        assert_eq!(aggregate.percent_attendance, 0.0);
        assert_eq!(aggregate.total_classes_expected, 0);
        assert!(!aggregate.eligible_for_certificate);
    }

    #[test]
    fn a_single_presence_counts_in_full() {
        let aggregate = recompute(&records(&[true]), 0, EnrollmentStatus::Enrolled, 75.0);

        assert_eq!(aggregate.total_presences, 1);
        assert_eq!(aggregate.total_absences, 0);
        assert_eq!(aggregate.percent_attendance, 100.0);
        assert_eq!(aggregate.total_classes_expected, 1);
    }

    #[test]
    fn percentages_are_rounded_to_two_decimals() {
        let aggregate = recompute(
            &records(&[true, false, false]),
            0,
            EnrollmentStatus::Enrolled,
            75.0,
        );

        assert_eq!(aggregate.percent_attendance, 33.33);

        let aggregate = recompute(
            &records(&[true, true, false]),
            0,
            EnrollmentStatus::Enrolled,
            75.0,
        );

        assert_eq!(aggregate.percent_attendance, 66.67);
    }

    #[test]
    fn the_watermark_never_shrinks() {
        let aggregate = recompute(&records(&[true, true]), 5, EnrollmentStatus::Enrolled, 75.0);
        assert_eq!(aggregate.total_classes_expected, 5);

        let aggregate = recompute(
            &records(&[true, true, false, true, true, false]),
            5,
            EnrollmentStatus::Enrolled,
            75.0,
        );
        assert_eq!(aggregate.total_classes_expected, 6);
    }

    #[test]
    fn eligibility_requires_completion_and_the_threshold() {
        let full = records(&[true, true, true, false]);

        let completed = recompute(&full, 0, EnrollmentStatus::Completed, 75.0);
        assert_eq!(completed.percent_attendance, 75.0);
        assert!(completed.eligible_for_certificate);

        let in_progress = recompute(&full, 0, EnrollmentStatus::InProgress, 75.0);
        assert!(!in_progress.eligible_for_certificate);

        let short = records(&[true, false]);
        let completed_short = recompute(&short, 0, EnrollmentStatus::Completed, 75.0);
        assert!(!completed_short.eligible_for_certificate);
    }

    #[test]
    fn duplicate_enrollments_are_rejected() {
        let id = Uuid::new_v4();
        let entry = |enrollment_id| AttendanceEntry {
            enrollment_id,
            class_number: None,
            present: true,
            justification: None,
            tutor_remark: None,
        };

        assert!(ensure_unique_enrollments(&[entry(id), entry(Uuid::new_v4())]).is_ok());
        assert!(matches!(
            ensure_unique_enrollments(&[entry(id), entry(id)]),
            Err(BackendError::DuplicateEnrollmentInBatch(dup)) if dup == id
        ));
    }

    #[test]
    fn empty_batches_are_rejected() {
        assert!(matches!(
            ensure_entries_present(&[]),
            Err(BackendError::EmptyBatch)
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 1000, ..ProptestConfig::default()
        })]

        #[test]
        fn aggregates_stay_consistent(marks in proptest::collection::vec(any::<bool>(), 0..30), previous in 0i32..40) {
            let records = records(&marks);
            let aggregate = recompute(&records, previous, EnrollmentStatus::InProgress, 75.0);

            prop_assert_eq!(aggregate.total_presences + aggregate.total_absences, records.len() as i32);
            prop_assert!(aggregate.total_absences >= 0);
            prop_assert!(aggregate.total_classes_expected >= previous);
            prop_assert!(aggregate.total_classes_expected >= records.len() as i32);
            prop_assert!(aggregate.percent_attendance >= 0.0 && aggregate.percent_attendance <= 100.0);
            prop_assert!(!aggregate.eligible_for_certificate);
        }
    }
}
