use time::Date;
use uuid::Uuid;

use crate::certificate::CertificateKind;
use crate::dates;
use crate::errors::BackendError;

/// MIME type of documents produced by the built-in renderer.
pub const DOCUMENT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Everything a renderer needs to produce a certificate document.
#[derive(Clone, Debug)]
pub struct DocumentFields {
    pub kind: CertificateKind,
    pub recipient_name: String,
    pub workshop_title: String,
    pub workload_hours: i32,
    pub start_date: Date,
    pub end_date: Date,
    pub percent_attendance: Option<f64>,
    pub validation_hash: String,
    pub verification_code: String,
}

/// The storage name for a learner completion document.
pub fn completion_document_name(enrollment_id: &Uuid) -> String {
    format!("learner-{}.txt", enrollment_id)
}

/// The storage name for a tutor participation document.
pub fn participation_document_name(tutor_id: &Uuid, workshop_id: &Uuid) -> String {
    format!("tutor-{}-{}.txt", tutor_id, workshop_id)
}

/// Returns a renderer producing a plain-text certificate body.
///
/// Rendering is an external concern to the issuance flow: a failure
/// here degrades the certificate to a placeholder document URL, it
/// never blocks issuance.
pub fn make_text_renderer() -> impl Fn(&DocumentFields) -> Result<Vec<u8>, BackendError> + Send + Sync
{
    |fields: &DocumentFields| {
        let heading = match fields.kind {
            CertificateKind::LearnerCompletion => "CERTIFICATE OF COMPLETION",
            CertificateKind::TutorParticipation => "CERTIFICATE OF PARTICIPATION",
        };

        let mut lines = vec![
            heading.to_owned(),
            String::new(),
            format!("Awarded to: {}", fields.recipient_name),
            format!("Workshop: {}", fields.workshop_title),
            format!(
                "Period: {} to {}",
                dates::format_date(fields.start_date),
                dates::format_date(fields.end_date)
            ),
            format!("Workload: {} hours", fields.workload_hours),
        ];

        if let Some(percent) = fields.percent_attendance {
            lines.push(format!("Attendance: {}%", percent));
        }

        lines.push(String::new());
        lines.push(format!("Validation hash: {}", fields.validation_hash));
        lines.push(format!("Verification code: {}", fields.verification_code));

        Ok(lines.join("\n").into_bytes())
    }
}
