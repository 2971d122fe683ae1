use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        FlattenedRejection {
            context: self.context.clone(),
            message: format!("{}", self.error),
        }
    }
}

impl reject::Reject for Rejection {}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Context {
    CreateLearner,
    RetrieveLearner { id: String },
    LearnerHistory { learner: String },
    CreateTutor,
    RetrieveTutor { id: String },
    CreateWorkshop,
    ListWorkshops,
    RetrieveWorkshop { id: String },
    WorkshopStatus { id: String },
    AssignTutor { workshop: String, tutor: String },
    CreateEnrollment { workshop: String },
    ListEnrollments { workshop: String },
    RetrieveEnrollment { id: String },
    DeleteEnrollment { id: String },
    EnrollmentStatus { id: String },
    RegisterAttendance { workshop: String },
    ListAttendance { workshop: String },
    EnrollmentAttendance { enrollment: String },
    UpdateAttendance { id: String },
    DeleteAttendance { id: String },
    IssueCertificate { enrollment: String },
    IssueTutorCertificate { workshop: String, tutor: String },
    ListCertificates,
    RetrieveCertificate { id: String },
    VerifyCertificate { value: String },
    RevokeCertificate { id: String },
}

impl Context {
    pub fn create_learner() -> Context {
        Context::CreateLearner
    }

    pub fn retrieve_learner(id: String) -> Context {
        Context::RetrieveLearner { id }
    }

    pub fn learner_history(learner: String) -> Context {
        Context::LearnerHistory { learner }
    }

    pub fn create_tutor() -> Context {
        Context::CreateTutor
    }

    pub fn retrieve_tutor(id: String) -> Context {
        Context::RetrieveTutor { id }
    }

    pub fn create_workshop() -> Context {
        Context::CreateWorkshop
    }

    pub fn list_workshops() -> Context {
        Context::ListWorkshops
    }

    pub fn retrieve_workshop(id: String) -> Context {
        Context::RetrieveWorkshop { id }
    }

    pub fn workshop_status(id: String) -> Context {
        Context::WorkshopStatus { id }
    }

    pub fn assign_tutor(workshop: String, tutor: String) -> Context {
        Context::AssignTutor { workshop, tutor }
    }

    pub fn create_enrollment(workshop: String) -> Context {
        Context::CreateEnrollment { workshop }
    }

    pub fn list_enrollments(workshop: String) -> Context {
        Context::ListEnrollments { workshop }
    }

    pub fn retrieve_enrollment(id: String) -> Context {
        Context::RetrieveEnrollment { id }
    }

    pub fn delete_enrollment(id: String) -> Context {
        Context::DeleteEnrollment { id }
    }

    pub fn enrollment_status(id: String) -> Context {
        Context::EnrollmentStatus { id }
    }

    pub fn register_attendance(workshop: String) -> Context {
        Context::RegisterAttendance { workshop }
    }

    pub fn list_attendance(workshop: String) -> Context {
        Context::ListAttendance { workshop }
    }

    pub fn enrollment_attendance(enrollment: String) -> Context {
        Context::EnrollmentAttendance { enrollment }
    }

    pub fn update_attendance(id: String) -> Context {
        Context::UpdateAttendance { id }
    }

    pub fn delete_attendance(id: String) -> Context {
        Context::DeleteAttendance { id }
    }

    pub fn issue_certificate(enrollment: String) -> Context {
        Context::IssueCertificate { enrollment }
    }

    pub fn issue_tutor_certificate(workshop: String, tutor: String) -> Context {
        Context::IssueTutorCertificate { workshop, tutor }
    }

    pub fn list_certificates() -> Context {
        Context::ListCertificates
    }

    pub fn retrieve_certificate(id: String) -> Context {
        Context::RetrieveCertificate { id }
    }

    pub fn verify_certificate(value: String) -> Context {
        Context::VerifyCertificate { value }
    }

    pub fn revoke_certificate(id: String) -> Context {
        Context::RevokeCertificate { id }
    }
}
