use std::sync::Arc;

use log::{error, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, WithStatus};

use crate::errors::BackendError;

pub mod admin;
mod handlers;
mod query;
mod rejection;
mod response;

pub use internal::*;

/// The maximum JSON body size to accept. Attendance batches are the
/// largest payloads and stay well under this.
const MAX_CONTENT_LENGTH: u64 = 1024 * 1024;

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status_code_for(e), "message" => %r.error);
        let flattened = r.flatten();

        return Ok(with_status(json(&flattened), status_code_for(e)));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        NonExistentWorkshop(..)
        | NonExistentLearner(..)
        | NonExistentTutor(..)
        | NonExistentEnrollment(..)
        | NonExistentAttendance(..)
        | NonExistentCertificate(..)
        | UnknownVerificationValue => StatusCode::NOT_FOUND,
        LearnerAlreadyEnrolled
        | EnrollmentClosed(..)
        | EnrollmentPeriodOver
        | CapacityExceeded
        | DateOutsidePeriod
        | AttendanceNotRecordable(..)
        | AttendanceDateTaken
        | TransitionNotPermitted { .. }
        | MinimumAttendanceNotMet { .. }
        | EnrollmentNotEligible
        | WorkshopNotCompleted
        | TutorNotAssigned
        | CertificateAlreadyIssued
        | CertificateAlreadyRevoked => StatusCode::CONFLICT,
        EmptyBatch
        | DuplicateEnrollmentInBatch(..)
        | InvalidId(..)
        | InvalidDate(..)
        | InvalidCapacity
        | InvalidWorkload
        | InvalidPeriod => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use std::convert::Infallible;

    use uuid::Uuid;
    use warp::filters::BoxedFilter;
    use warp::Filter;
    use warp::Reply;
    use warp::{delete, get as g, patch, post, put, query};

    use super::{handlers, query as q, MAX_CONTENT_LENGTH};
    use crate::environment::{Environment, SafeStore};

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    fn with_environment<O: SafeStore + 'static>(
        environment: Environment<O>,
    ) -> impl Filter<Extract = (Environment<O>,), Error = Infallible> + Clone {
        warp::any().map(move || environment.clone())
    }

    fn body<T: serde::de::DeserializeOwned + Send>(
    ) -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone {
        warp::body::content_length_limit(MAX_CONTENT_LENGTH).and(warp::body::json())
    }

    pub fn make_learner_routes<O: SafeStore + 'static>(environment: Environment<O>) -> Route {
        let create = with_environment(environment.clone())
            .and(warp::path!("learners"))
            .and(post())
            .and(body::<crate::identity::NewLearner>())
            .and_then(handlers::create_learner);

        let retrieve = with_environment(environment.clone())
            .and(warp::path!("learners" / Uuid))
            .and(g())
            .and_then(handlers::retrieve_learner);

        let history = with_environment(environment)
            .and(warp::path!("learners" / Uuid / "enrollments"))
            .and(g())
            .and_then(handlers::learner_history);

        create.or(retrieve).unify().or(history).unify().boxed()
    }

    pub fn make_tutor_routes<O: SafeStore + 'static>(environment: Environment<O>) -> Route {
        let create = with_environment(environment.clone())
            .and(warp::path!("tutors"))
            .and(post())
            .and(body::<crate::identity::NewTutor>())
            .and_then(handlers::create_tutor);

        let retrieve = with_environment(environment)
            .and(warp::path!("tutors" / Uuid))
            .and(g())
            .and_then(handlers::retrieve_tutor);

        create.or(retrieve).unify().boxed()
    }

    pub fn make_workshop_routes<O: SafeStore + 'static>(environment: Environment<O>) -> Route {
        let create = with_environment(environment.clone())
            .and(warp::path!("workshops"))
            .and(post())
            .and(body::<crate::workshop::NewWorkshop>())
            .and_then(handlers::create_workshop);

        let list = with_environment(environment.clone())
            .and(warp::path!("workshops"))
            .and(g())
            .and_then(handlers::list_workshops);

        let retrieve = with_environment(environment.clone())
            .and(warp::path!("workshops" / Uuid))
            .and(g())
            .and_then(handlers::retrieve_workshop);

        let status = with_environment(environment.clone())
            .and(warp::path!("workshops" / Uuid / "status"))
            .and(patch())
            .and(body::<q::WorkshopStatusUpdate>())
            .and_then(handlers::update_workshop_status);

        let assign = with_environment(environment)
            .and(warp::path!("workshops" / Uuid / "tutors" / Uuid))
            .and(put())
            .and_then(handlers::assign_tutor);

        create
            .or(list)
            .unify()
            .or(retrieve)
            .unify()
            .or(status)
            .unify()
            .or(assign)
            .unify()
            .boxed()
    }

    pub fn make_enrollment_routes<O: SafeStore + 'static>(environment: Environment<O>) -> Route {
        let create = with_environment(environment.clone())
            .and(warp::path!("workshops" / Uuid / "enrollments"))
            .and(post())
            .and(body::<crate::enrollment::NewEnrollment>())
            .and_then(handlers::create_enrollment);

        let list = with_environment(environment.clone())
            .and(warp::path!("workshops" / Uuid / "enrollments"))
            .and(g())
            .and_then(handlers::list_enrollments);

        let retrieve = with_environment(environment.clone())
            .and(warp::path!("enrollments" / Uuid))
            .and(g())
            .and_then(handlers::retrieve_enrollment);

        let delete_route = with_environment(environment.clone())
            .and(warp::path!("enrollments" / Uuid))
            .and(delete())
            .and_then(handlers::delete_enrollment);

        let status = with_environment(environment)
            .and(warp::path!("enrollments" / Uuid / "status"))
            .and(patch())
            .and(body::<q::EnrollmentStatusUpdate>())
            .and_then(handlers::update_enrollment_status);

        create
            .or(list)
            .unify()
            .or(retrieve)
            .unify()
            .or(delete_route)
            .unify()
            .or(status)
            .unify()
            .boxed()
    }

    pub fn make_attendance_routes<O: SafeStore + 'static>(environment: Environment<O>) -> Route {
        let register = with_environment(environment.clone())
            .and(warp::path!("workshops" / Uuid / "attendance"))
            .and(post())
            .and(body::<crate::attendance::AttendanceBatch>())
            .and_then(handlers::register_attendance);

        let list = with_environment(environment.clone())
            .and(warp::path!("workshops" / Uuid / "attendance"))
            .and(g())
            .and(query::<q::AttendanceQuery>())
            .and_then(handlers::list_attendance);

        let by_enrollment = with_environment(environment.clone())
            .and(warp::path!("enrollments" / Uuid / "attendance"))
            .and(g())
            .and_then(handlers::enrollment_attendance);

        let update = with_environment(environment.clone())
            .and(warp::path!("attendance" / Uuid))
            .and(patch())
            .and(body::<crate::attendance::AttendancePatch>())
            .and_then(handlers::update_attendance);

        let delete_route = with_environment(environment)
            .and(warp::path!("attendance" / Uuid))
            .and(delete())
            .and_then(handlers::delete_attendance);

        register
            .or(list)
            .unify()
            .or(by_enrollment)
            .unify()
            .or(update)
            .unify()
            .or(delete_route)
            .unify()
            .boxed()
    }

    pub fn make_certificate_routes<O: SafeStore + 'static>(environment: Environment<O>) -> Route {
        let issue = with_environment(environment.clone())
            .and(warp::path!("enrollments" / Uuid / "certificate"))
            .and(post())
            .and_then(handlers::issue_certificate);

        let issue_tutor = with_environment(environment.clone())
            .and(warp::path!("workshops" / Uuid / "tutors" / Uuid / "certificate"))
            .and(post())
            .and_then(handlers::issue_tutor_certificate);

        let list = with_environment(environment.clone())
            .and(warp::path!("certificates"))
            .and(g())
            .and_then(handlers::list_certificates);

        let verify = with_environment(environment.clone())
            .and(warp::path!("certificates" / "verify" / String))
            .and(g())
            .and_then(handlers::verify_certificate);

        let retrieve = with_environment(environment.clone())
            .and(warp::path!("certificates" / Uuid))
            .and(g())
            .and_then(handlers::retrieve_certificate);

        let revoke = with_environment(environment)
            .and(warp::path!("certificates" / Uuid / "revoke"))
            .and(post())
            .and(body::<q::RevocationRequest>())
            .and_then(handlers::revoke_certificate);

        issue
            .or(issue_tutor)
            .unify()
            .or(list)
            .unify()
            .or(verify)
            .unify()
            .or(retrieve)
            .unify()
            .or(revoke)
            .unify()
            .boxed()
    }
}
