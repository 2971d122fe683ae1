use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::dates;
use crate::enrollment::{Enrollment, EnrollmentStatus};
use crate::errors::BackendError;
use crate::workshop::{Workshop, WorkshopStatus};

/// Supported certificate variants.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum CertificateKind {
    LearnerCompletion,
    TutorParticipation,
}

impl CertificateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CertificateKind::LearnerCompletion => "learner_completion",
            CertificateKind::TutorParticipation => "tutor_participation",
        }
    }
}

impl fmt::Display for CertificateKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An issued certificate. Immutable except for the revocation fields.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Certificate {
    /// The ID of the certificate.
    pub id: Uuid,

    /// The variant issued.
    pub kind: CertificateKind,

    /// The certified enrollment, for learner certificates.
    pub enrollment_id: Option<Uuid>,

    /// The certified tutor, for participation certificates.
    pub tutor_id: Option<Uuid>,

    /// The workshop the certificate refers to.
    pub workshop_id: Uuid,

    /// Globally unique opaque validation value.
    pub validation_hash: String,

    /// Globally unique short code for manual verification.
    pub verification_code: String,

    /// Where the rendered document lives. Falls back to a placeholder
    /// URL when the document pipeline fails.
    pub document_url: Option<String>,

    /// The name the document was stored under.
    pub document_name: Option<String>,

    /// The date and time of issuance.
    #[serde(with = "time::serde::timestamp")]
    pub issued_at: OffsetDateTime,

    /// The certified workload, in hours.
    pub certified_hours: Option<i32>,

    /// The attendance percentage at issuance, for learner certificates.
    pub certified_percent: Option<f64>,

    /// Whether the certificate has been revoked.
    pub revoked: bool,

    /// When it was revoked, if it was.
    #[serde(with = "dates::timestamp_option")]
    pub revoked_at: Option<OffsetDateTime>,

    /// Why it was revoked.
    pub revocation_reason: Option<String>,
}

/// The fields of a certificate about to be persisted.
#[derive(Clone, Debug)]
pub struct NewCertificate {
    pub kind: CertificateKind,
    pub enrollment_id: Option<Uuid>,
    pub tutor_id: Option<Uuid>,
    pub workshop_id: Uuid,
    pub validation_hash: String,
    pub verification_code: String,
    pub document_url: Option<String>,
    pub document_name: Option<String>,
    pub certified_hours: Option<i32>,
    pub certified_percent: Option<f64>,
}

/// Length of the human verification code.
pub const VERIFICATION_CODE_LENGTH: usize = 10;

/// Characters used in verification codes. Lookalikes (`0`/`O`, `1`/`I`)
/// are excluded so the code survives being read aloud or retyped.
const VERIFICATION_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generates a fresh opaque validation value.
pub fn validation_hash() -> String {
    Uuid::new_v4().to_simple().to_string()
}

/// Generates a fresh human verification code.
///
/// The code is drawn from the random payload of a v4 UUID; bytes 6 and
/// 8 carry the UUID version and variant bits and are skipped so every
/// character is uniform over the alphabet. Collisions are left to the
/// unique constraint on the certificates table.
pub fn verification_code() -> String {
    let id = Uuid::new_v4();

    id.as_bytes()
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != 6 && *index != 8)
        .take(VERIFICATION_CODE_LENGTH)
        .map(|(_, byte)| VERIFICATION_ALPHABET[(byte % 32) as usize] as char)
        .collect()
}

/// Checks that an enrollment has earned a completion certificate.
pub fn ensure_enrollment_ready(enrollment: &Enrollment) -> Result<(), BackendError> {
    if enrollment.status != EnrollmentStatus::Completed || !enrollment.eligible_for_certificate {
        return Err(BackendError::EnrollmentNotEligible);
    }

    Ok(())
}

/// Checks that a workshop has completed, for tutor certificates.
pub fn ensure_workshop_completed(workshop: &Workshop) -> Result<(), BackendError> {
    if workshop.status != WorkshopStatus::Completed {
        return Err(BackendError::WorkshopNotCompleted);
    }

    Ok(())
}

/// Checks that no live certificate already covers the same subject.
pub fn ensure_unissued(existing: Option<&Certificate>) -> Result<(), BackendError> {
    match existing {
        Some(certificate) if !certificate.revoked => Err(BackendError::CertificateAlreadyIssued),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn verification_codes_use_the_expected_shape() {
        for _ in 0..100 {
            let code = verification_code();

            assert_eq!(code.len(), VERIFICATION_CODE_LENGTH);
            assert!(code
                .bytes()
                .all(|byte| VERIFICATION_ALPHABET.contains(&byte)));
        }
    }

    #[test]
    fn validation_hashes_are_opaque_and_distinct() {
        let mut seen = HashSet::new();

        for _ in 0..100 {
            let hash = validation_hash();

            assert_eq!(hash.len(), 32);
            assert!(seen.insert(hash));
        }
    }
}
