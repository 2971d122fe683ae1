use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::dates;
use crate::errors::BackendError;
use crate::normalization;

/// Lifecycle stages for an enrollment.
///
/// `Completed`, `Withdrawn` and `Cancelled` are terminal.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Enrolled,
    InProgress,
    Completed,
    Withdrawn,
    Cancelled,
}

impl EnrollmentStatus {
    /// The statuses reachable from this one.
    pub fn allowed_targets(self) -> &'static [EnrollmentStatus] {
        use EnrollmentStatus::*;

        match self {
            Enrolled => &[InProgress, Cancelled, Withdrawn],
            InProgress => &[Completed, Cancelled, Withdrawn],
            Completed | Withdrawn | Cancelled => &[],
        }
    }

    /// Whether the table permits moving from this status to `target`.
    pub fn permits(self, target: EnrollmentStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Whether attendance may still be recorded against this status.
    pub fn accepts_attendance(self) -> bool {
        !matches!(self, EnrollmentStatus::Cancelled | EnrollmentStatus::Withdrawn)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnrollmentStatus::Enrolled => "enrolled",
            EnrollmentStatus::InProgress => "in_progress",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Withdrawn => "withdrawn",
            EnrollmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A learner's registration in one workshop, carrying the derived
/// attendance aggregate.
///
/// `total_presences + total_absences` always equals the number of
/// attendance records on file; `total_classes_expected` is a watermark
/// that never decreases once grown.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Enrollment {
    /// The ID of the enrollment.
    pub id: Uuid,

    /// The workshop enrolled into.
    pub workshop_id: Uuid,

    /// The enrolled learner.
    pub learner_id: Uuid,

    /// The lifecycle status.
    pub status: EnrollmentStatus,

    /// The date and time the enrollment was requested.
    #[serde(with = "time::serde::timestamp")]
    pub enrolled_at: OffsetDateTime,

    /// Share of recorded classes attended, 0–100, two decimals.
    pub percent_attendance: f64,

    /// High-water mark of recorded classes, shown as the denominator.
    pub total_classes_expected: i32,

    /// Recorded classes the learner attended.
    pub total_presences: i32,

    /// Recorded classes the learner missed.
    pub total_absences: i32,

    /// Whether a completion certificate may currently be issued.
    pub eligible_for_certificate: bool,

    /// When the enrollment was completed, if it was.
    #[serde(with = "dates::timestamp_option")]
    pub completion_date: Option<OffsetDateTime>,

    /// Free-text notes.
    pub notes: Option<String>,

    /// The date and time it was created.
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,

    /// The date and time it was last modified.
    #[serde(with = "time::serde::timestamp")]
    pub updated_at: OffsetDateTime,
}

/// The payload to create an enrollment.
#[derive(Clone, Debug, Deserialize)]
pub struct NewEnrollment {
    pub learner_id: Uuid,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub notes: Option<String>,
}

/// The persistent effects of one accepted status change.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub status: EnrollmentStatus,
    pub completion_date: Option<OffsetDateTime>,
    pub eligible_for_certificate: bool,
}

/// Validates a requested status change against the transition table
/// and computes its effects.
///
/// Returns `Ok(None)` when the target equals the current status: the
/// re-application is an idempotent no-op and must not overwrite an
/// existing completion date. The completion guard reads the stored
/// percentage; callers are expected to have recomputed attendance
/// beforehand.
pub fn apply_transition(
    enrollment: &Enrollment,
    target: EnrollmentStatus,
    now: OffsetDateTime,
    minimum_percent: f64,
) -> Result<Option<Transition>, BackendError> {
    use EnrollmentStatus::*;

    if target == enrollment.status {
        return Ok(None);
    }

    if !enrollment.status.permits(target) {
        return Err(BackendError::TransitionNotPermitted {
            from: enrollment.status,
            to: target,
        });
    }

    if target == Completed && enrollment.percent_attendance < minimum_percent {
        return Err(BackendError::MinimumAttendanceNotMet {
            percent: enrollment.percent_attendance,
        });
    }

    let transition = match target {
        Completed => Transition {
            status: target,
            completion_date: enrollment.completion_date.or(Some(now)),
            eligible_for_certificate: true,
        },
        Withdrawn | Cancelled => Transition {
            status: target,
            completion_date: None,
            eligible_for_certificate: false,
        },
        _ => Transition {
            status: target,
            completion_date: enrollment.completion_date,
            eligible_for_certificate: false,
        },
    };

    Ok(Some(transition))
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::EnrollmentStatus::*;
    use super::*;
    use crate::errors::BackendError;

    const ALL: [EnrollmentStatus; 5] = [Enrolled, InProgress, Completed, Withdrawn, Cancelled];

    fn enrollment(status: EnrollmentStatus, percent: f64) -> Enrollment {
        let now = OffsetDateTime::now_utc();

        Enrollment {
            id: Uuid::new_v4(),
            workshop_id: Uuid::new_v4(),
            learner_id: Uuid::new_v4(),
            status,
            enrolled_at: now,
            percent_attendance: percent,
            total_classes_expected: 0,
            total_presences: 0,
            total_absences: 0,
            eligible_for_certificate: false,
            completion_date: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn table_matches_lifecycle() {
        assert_eq!(Enrolled.allowed_targets(), &[InProgress, Cancelled, Withdrawn]);
        assert_eq!(InProgress.allowed_targets(), &[Completed, Cancelled, Withdrawn]);
        assert!(Completed.allowed_targets().is_empty());
        assert!(Withdrawn.allowed_targets().is_empty());
        assert!(Cancelled.allowed_targets().is_empty());
    }

    #[test]
    fn disallowed_transitions_are_rejected() {
        let now = OffsetDateTime::now_utc();

        for &from in &ALL {
            for &to in &ALL {
                if from == to || from.permits(to) {
                    continue;
                }

                let result = apply_transition(&enrollment(from, 100.0), to, now, 75.0);

                assert!(
                    matches!(result, Err(BackendError::TransitionNotPermitted { .. })),
                    "{} -> {} must be rejected",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn reapplying_the_current_status_is_a_no_op() {
        let now = OffsetDateTime::now_utc();

        for &status in &ALL {
            let result = apply_transition(&enrollment(status, 0.0), status, now, 75.0).unwrap();
            assert!(result.is_none(), "{} -> {} must be a no-op", status, status);
        }
    }

    #[test]
    fn completion_requires_the_minimum_attendance() {
        let now = OffsetDateTime::now_utc();

        let below = apply_transition(&enrollment(InProgress, 40.0), Completed, now, 75.0);
        assert!(matches!(
            below,
            Err(BackendError::MinimumAttendanceNotMet { percent }) if percent == 40.0
        ));

        let at = apply_transition(&enrollment(InProgress, 75.0), Completed, now, 75.0)
            .unwrap()
            .unwrap();
        assert_eq!(at.status, Completed);
        assert_eq!(at.completion_date, Some(now));
        assert!(at.eligible_for_certificate);
    }

    #[test]
    fn completion_keeps_an_existing_completion_date() {
        let now = OffsetDateTime::now_utc();
        let earlier = OffsetDateTime::from_unix_timestamp(now.unix_timestamp() - 86_400);

        let mut enrollment = enrollment(InProgress, 90.0);
        enrollment.completion_date = Some(earlier);

        let transition = apply_transition(&enrollment, Completed, now, 75.0)
            .unwrap()
            .unwrap();

        assert_eq!(transition.completion_date, Some(earlier));
    }

    #[test]
    fn leaving_the_lifecycle_clears_completion_state() {
        let now = OffsetDateTime::now_utc();

        for &target in &[Withdrawn, Cancelled] {
            let mut enrollment = enrollment(InProgress, 90.0);
            enrollment.completion_date = Some(now);
            enrollment.eligible_for_certificate = true;

            let transition = apply_transition(&enrollment, target, now, 75.0)
                .unwrap()
                .unwrap();

            assert_eq!(transition.status, target);
            assert_eq!(transition.completion_date, None);
            assert!(!transition.eligible_for_certificate);
        }
    }

    #[test]
    fn starting_the_workshop_does_not_grant_eligibility() {
        let now = OffsetDateTime::now_utc();

        let transition = apply_transition(&enrollment(Enrolled, 100.0), InProgress, now, 75.0)
            .unwrap()
            .unwrap();

        assert_eq!(transition.status, InProgress);
        assert!(!transition.eligible_for_certificate);
    }
}
