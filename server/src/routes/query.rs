use serde::Deserialize;
use uuid::Uuid;

use crate::enrollment::EnrollmentStatus;
use crate::workshop::WorkshopStatus;

/// Optional filter for attendance listings.
#[derive(Debug, Default, Deserialize)]
pub struct AttendanceQuery {
    pub class_date: Option<String>,
}

/// Body of a workshop status update.
#[derive(Debug, Deserialize)]
pub struct WorkshopStatusUpdate {
    pub status: WorkshopStatus,
}

/// Body of an enrollment status update.
#[derive(Debug, Deserialize)]
pub struct EnrollmentStatusUpdate {
    pub status: EnrollmentStatus,
}

/// Body of a certificate revocation.
#[derive(Debug, Default, Deserialize)]
pub struct RevocationRequest {
    pub reason: Option<String>,
    pub actor: Option<Uuid>,
}
