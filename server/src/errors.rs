use rusoto_core::RusotoError;
use rusoto_s3::PutObjectError;
use sqlx;
use thiserror::Error;
use uuid::Uuid;

use crate::enrollment::EnrollmentStatus;
use crate::workshop::WorkshopStatus;

/// Enumerates high-level errors returned by this library.
///
/// Variants fall into four groups, mapped to HTTP statuses at the
/// routing boundary: missing entities, rejected preconditions,
/// malformed input, and internal failures.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents a reference to a workshop that does not exist.
    #[error("workshop {0} does not exist")]
    NonExistentWorkshop(Uuid),

    /// Represents a reference to a learner that does not exist.
    #[error("learner {0} does not exist")]
    NonExistentLearner(Uuid),

    /// Represents a reference to a tutor that does not exist.
    #[error("tutor {0} does not exist")]
    NonExistentTutor(Uuid),

    /// Represents a reference to an enrollment that does not exist.
    #[error("enrollment {0} does not exist")]
    NonExistentEnrollment(Uuid),

    /// Represents a reference to an attendance record that does not exist.
    #[error("attendance record {0} does not exist")]
    NonExistentAttendance(Uuid),

    /// Represents a reference to a certificate that does not exist.
    #[error("certificate {0} does not exist")]
    NonExistentCertificate(Uuid),

    /// Represents a verification lookup that matched no certificate.
    #[error("no certificate matches the supplied verification value")]
    UnknownVerificationValue,

    /// Represents a second enrollment of the same learner into the
    /// same workshop.
    #[error("learner is already enrolled in this workshop")]
    LearnerAlreadyEnrolled,

    /// Represents an enrollment attempt against a workshop whose
    /// status does not accept new entries.
    #[error("workshop in status {0} does not accept new enrollments")]
    EnrollmentClosed(WorkshopStatus),

    /// Represents an enrollment attempt after the workshop has ended.
    #[error("enrollment period has ended")]
    EnrollmentPeriodOver,

    /// Represents an enrollment attempt against a full workshop.
    #[error("workshop is at maximum capacity")]
    CapacityExceeded,

    /// Represents a class date outside the workshop period.
    #[error("class date falls outside the workshop period")]
    DateOutsidePeriod,

    /// Represents an attendance write against an enrollment whose
    /// status does not accept it.
    #[error("enrollment in status {0} does not accept attendance")]
    AttendanceNotRecordable(EnrollmentStatus),

    /// Represents a date move onto an already-occupied class date.
    #[error("an attendance record already exists for that class date")]
    AttendanceDateTaken,

    /// Represents a status change outside the allowed-transition table.
    #[error("transition from {from} to {to} is not permitted")]
    TransitionNotPermitted {
        from: EnrollmentStatus,
        to: EnrollmentStatus,
    },

    /// Represents a completion attempt below the attendance threshold.
    #[error("minimum attendance not met ({percent}%)")]
    MinimumAttendanceNotMet { percent: f64 },

    /// Represents a certificate request for an enrollment that has not
    /// earned one.
    #[error("enrollment is not eligible for a certificate")]
    EnrollmentNotEligible,

    /// Represents a tutor-certificate request before the workshop has
    /// completed.
    #[error("workshop must be completed before issuing tutor certificates")]
    WorkshopNotCompleted,

    /// Represents a tutor-certificate request for a tutor without an
    /// assignment to the workshop.
    #[error("tutor is not linked to this workshop")]
    TutorNotAssigned,

    /// Represents a duplicate certificate request.
    #[error("a certificate has already been issued")]
    CertificateAlreadyIssued,

    /// Represents a second revocation of the same certificate.
    #[error("certificate is already revoked")]
    CertificateAlreadyRevoked,

    /// Represents an attendance batch with no entries.
    #[error("no attendance entries in payload")]
    EmptyBatch,

    /// Represents an attendance batch naming the same enrollment twice.
    #[error("duplicate enrollment {0} in payload")]
    DuplicateEnrollmentInBatch(Uuid),

    /// Represents an unparseable ID.
    #[error("unable to parse {0} as an ID")]
    InvalidId(String),

    /// Represents an unparseable calendar date.
    #[error("unable to parse {0} as a calendar date")]
    InvalidDate(String),

    /// Represents a workshop capacity below one.
    #[error("workshop capacity must be at least one")]
    InvalidCapacity,

    /// Represents a workshop workload below one hour.
    #[error("workshop workload must be at least one hour")]
    InvalidWorkload,

    /// Represents a workshop whose end date precedes its start date.
    #[error("workshop end date precedes its start date")]
    InvalidPeriod,

    /// Represents an SQL error.
    #[error("SQLx error")]
    Sqlx { source: sqlx::Error },

    /// Represents a failure to render a certificate document.
    #[error("failed to render certificate document: {message}")]
    RenderFailed { message: String },

    /// Represents an error returned by the remote server when uploading.
    #[error("failed to upload document")]
    UploadFailed { source: RusotoError<PutObjectError> },

    /// Represents a document store that rejected a write.
    #[error("document store failed: {message}")]
    DocumentStoreFailed { message: String },

    /// Represents a failure to generate a URL for a stored document.
    #[error("unable to generate document URL")]
    FailedToGenerateUrl { source: url::ParseError },
}
