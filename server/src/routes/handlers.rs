use std::time::{Duration, Instant};

use log::debug;
use serde_json::json;
use uuid::Uuid;
use warp::{
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::attendance::{AttendanceBatch, AttendancePatch};
use crate::audit::{record_detached, AuditEvent};
use crate::dates;
use crate::enrollment::NewEnrollment;
use crate::environment::{Environment, SafeStore};
use crate::errors::BackendError;
use crate::identity::{NewLearner, NewTutor};
use crate::routes::{
    query::{AttendanceQuery, EnrollmentStatusUpdate, RevocationRequest, WorkshopStatusUpdate},
    rejection::{Context, Rejection},
};
use crate::services;
use crate::workshop::NewWorkshop;

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        let result = { $($expression)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn create_learner<O: SafeStore>(
    environment: Environment<O>,
    new: NewLearner,
) -> RouteResult {
    timed! {
        let learner = environment
            .db
            .create_learner(new)
            .await
            .map_err(|e: BackendError| Rejection::new(Context::create_learner(), e))?;

        record_detached(
            environment.logger.clone(),
            environment.audit.clone(),
            AuditEvent::new("learner", "created").on(learner.id),
        );

        with_status(json(&learner), StatusCode::CREATED)
    }
}

pub async fn retrieve_learner<O: SafeStore>(environment: Environment<O>, id: Uuid) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::retrieve_learner(id.to_string()), e);

        let option = environment.db.learner(&id).await.map_err(error_handler)?;

        match option {
            Some(learner) => with_status(json(&learner), StatusCode::OK),
            None => with_status(json(&()), StatusCode::NOT_FOUND),
        }
    }
}

pub async fn learner_history<O: SafeStore>(environment: Environment<O>, id: Uuid) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::learner_history(id.to_string()), e);

        let _ = environment
            .db
            .learner(&id)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| error_handler(BackendError::NonExistentLearner(id)))?;

        let enrollments = environment
            .db
            .enrollments_for_learner(&id)
            .await
            .map_err(error_handler)?;

        json(&enrollments)
    }
}

pub async fn create_tutor<O: SafeStore>(environment: Environment<O>, new: NewTutor) -> RouteResult {
    timed! {
        let tutor = environment
            .db
            .create_tutor(new)
            .await
            .map_err(|e: BackendError| Rejection::new(Context::create_tutor(), e))?;

        record_detached(
            environment.logger.clone(),
            environment.audit.clone(),
            AuditEvent::new("tutor", "created").on(tutor.id),
        );

        with_status(json(&tutor), StatusCode::CREATED)
    }
}

pub async fn retrieve_tutor<O: SafeStore>(environment: Environment<O>, id: Uuid) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::retrieve_tutor(id.to_string()), e);

        let option = environment.db.tutor(&id).await.map_err(error_handler)?;

        match option {
            Some(tutor) => with_status(json(&tutor), StatusCode::OK),
            None => with_status(json(&()), StatusCode::NOT_FOUND),
        }
    }
}

pub async fn create_workshop<O: SafeStore>(
    environment: Environment<O>,
    new: NewWorkshop,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::create_workshop(), e);

        new.validate().map_err(error_handler)?;

        let workshop = environment
            .db
            .create_workshop(new)
            .await
            .map_err(error_handler)?;

        record_detached(
            environment.logger.clone(),
            environment.audit.clone(),
            AuditEvent::new("workshop", "created").on(workshop.id),
        );

        with_status(json(&workshop), StatusCode::CREATED)
    }
}

pub async fn list_workshops<O: SafeStore>(environment: Environment<O>) -> RouteResult {
    timed! {
        let workshops = environment
            .db
            .workshops()
            .await
            .map_err(|e: BackendError| Rejection::new(Context::list_workshops(), e))?;

        json(&workshops)
    }
}

pub async fn retrieve_workshop<O: SafeStore>(environment: Environment<O>, id: Uuid) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::retrieve_workshop(id.to_string()), e);

        let option = environment.db.workshop(&id).await.map_err(error_handler)?;

        match option {
            Some(workshop) => with_status(json(&workshop), StatusCode::OK),
            None => with_status(json(&()), StatusCode::NOT_FOUND),
        }
    }
}

pub async fn update_workshop_status<O: SafeStore>(
    environment: Environment<O>,
    id: Uuid,
    update: WorkshopStatusUpdate,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::workshop_status(id.to_string()), e);

        debug!(environment.logger, "Updating workshop status..."; "id" => %id, "status" => %update.status);

        let workshop = environment
            .db
            .update_workshop_status(&id, update.status)
            .await
            .map_err(error_handler)?;

        record_detached(
            environment.logger.clone(),
            environment.audit.clone(),
            AuditEvent::new("workshop", "status_updated")
                .on(workshop.id)
                .with_details(json!({ "status": update.status })),
        );

        json(&workshop)
    }
}

pub async fn assign_tutor<O: SafeStore>(
    environment: Environment<O>,
    workshop_id: Uuid,
    tutor_id: Uuid,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| {
            Rejection::new(
                Context::assign_tutor(workshop_id.to_string(), tutor_id.to_string()),
                e,
            )
        };

        environment
            .db
            .assign_tutor(&workshop_id, &tutor_id)
            .await
            .map_err(error_handler)?;

        record_detached(
            environment.logger.clone(),
            environment.audit.clone(),
            AuditEvent::new("workshop", "tutor_assigned")
                .on(workshop_id)
                .with_details(json!({ "tutor_id": tutor_id })),
        );

        StatusCode::NO_CONTENT
    }
}

pub async fn create_enrollment<O: SafeStore>(
    environment: Environment<O>,
    workshop_id: Uuid,
    new: NewEnrollment,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::create_enrollment(workshop_id.to_string()), e);

        debug!(environment.logger, "Creating enrollment..."; "workshop" => %workshop_id, "learner" => %new.learner_id);

        let enrollment = environment
            .db
            .create_enrollment(&workshop_id, new)
            .await
            .map_err(error_handler)?;

        record_detached(
            environment.logger.clone(),
            environment.audit.clone(),
            AuditEvent::new("enrollment", "created").on(enrollment.id),
        );

        with_status(json(&enrollment), StatusCode::CREATED)
    }
}

pub async fn list_enrollments<O: SafeStore>(
    environment: Environment<O>,
    workshop_id: Uuid,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::list_enrollments(workshop_id.to_string()), e);

        let _ = environment
            .db
            .workshop(&workshop_id)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| error_handler(BackendError::NonExistentWorkshop(workshop_id)))?;

        let enrollments = environment
            .db
            .enrollments_for_workshop(&workshop_id)
            .await
            .map_err(error_handler)?;

        json(&enrollments)
    }
}

pub async fn retrieve_enrollment<O: SafeStore>(
    environment: Environment<O>,
    id: Uuid,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::retrieve_enrollment(id.to_string()), e);

        let option = environment.db.enrollment(&id).await.map_err(error_handler)?;

        match option {
            Some(enrollment) => with_status(json(&enrollment), StatusCode::OK),
            None => with_status(json(&()), StatusCode::NOT_FOUND),
        }
    }
}

pub async fn delete_enrollment<O: SafeStore>(environment: Environment<O>, id: Uuid) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::delete_enrollment(id.to_string()), e);

        debug!(environment.logger, "Deleting enrollment..."; "id" => %id);

        environment
            .db
            .delete_enrollment(&id)
            .await
            .map_err(error_handler)?;

        record_detached(
            environment.logger.clone(),
            environment.audit.clone(),
            AuditEvent::new("enrollment", "deleted").on(id),
        );

        StatusCode::NO_CONTENT
    }
}

pub async fn update_enrollment_status<O: SafeStore>(
    environment: Environment<O>,
    id: Uuid,
    update: EnrollmentStatusUpdate,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::enrollment_status(id.to_string()), e);

        debug!(environment.logger, "Applying status transition..."; "id" => %id, "target" => %update.status);

        let enrollment = environment
            .db
            .transition_enrollment(&id, update.status)
            .await
            .map_err(error_handler)?;

        record_detached(
            environment.logger.clone(),
            environment.audit.clone(),
            AuditEvent::new("enrollment", "status_updated")
                .on(enrollment.id)
                .with_details(json!({ "status": update.status })),
        );

        json(&enrollment)
    }
}

pub async fn register_attendance<O: SafeStore>(
    environment: Environment<O>,
    workshop_id: Uuid,
    batch: AttendanceBatch,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| {
            Rejection::new(Context::register_attendance(workshop_id.to_string()), e)
        };

        debug!(environment.logger, "Registering attendance batch..."; "workshop" => %workshop_id, "entries" => batch.entries.len(), "class_date" => %dates::format_date(batch.class_date));

        let recorded_by = batch.recorded_by;
        let count = batch.entries.len();
        let class_date = batch.class_date;

        let records = environment
            .db
            .register_attendance(&workshop_id, batch)
            .await
            .map_err(error_handler)?;

        record_detached(
            environment.logger.clone(),
            environment.audit.clone(),
            AuditEvent::new("attendance", "batch_registered")
                .on(workshop_id)
                .by(recorded_by)
                .with_details(json!({
                    "class_date": dates::format_date(class_date),
                    "entries": count,
                })),
        );

        with_status(json(&records), StatusCode::CREATED)
    }
}

pub async fn list_attendance<O: SafeStore>(
    environment: Environment<O>,
    workshop_id: Uuid,
    query: AttendanceQuery,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::list_attendance(workshop_id.to_string()), e);

        let class_date = match &query.class_date {
            Some(value) => Some(dates::parse_date(value).map_err(error_handler)?),
            None => None,
        };

        let _ = environment
            .db
            .workshop(&workshop_id)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| error_handler(BackendError::NonExistentWorkshop(workshop_id)))?;

        let records = environment
            .db
            .attendance_for_workshop(&workshop_id, class_date)
            .await
            .map_err(error_handler)?;

        json(&records)
    }
}

pub async fn enrollment_attendance<O: SafeStore>(
    environment: Environment<O>,
    enrollment_id: Uuid,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| {
            Rejection::new(Context::enrollment_attendance(enrollment_id.to_string()), e)
        };

        let _ = environment
            .db
            .enrollment(&enrollment_id)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| error_handler(BackendError::NonExistentEnrollment(enrollment_id)))?;

        let records = environment
            .db
            .attendance_for_enrollment(&enrollment_id)
            .await
            .map_err(error_handler)?;

        json(&records)
    }
}

pub async fn update_attendance<O: SafeStore>(
    environment: Environment<O>,
    id: Uuid,
    patch: AttendancePatch,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::update_attendance(id.to_string()), e);

        let record = environment
            .db
            .update_attendance(&id, patch)
            .await
            .map_err(error_handler)?;

        record_detached(
            environment.logger.clone(),
            environment.audit.clone(),
            AuditEvent::new("attendance", "updated").on(record.id),
        );

        json(&record)
    }
}

pub async fn delete_attendance<O: SafeStore>(environment: Environment<O>, id: Uuid) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::delete_attendance(id.to_string()), e);

        debug!(environment.logger, "Deleting attendance record..."; "id" => %id);

        environment
            .db
            .delete_attendance(&id)
            .await
            .map_err(error_handler)?;

        record_detached(
            environment.logger.clone(),
            environment.audit.clone(),
            AuditEvent::new("attendance", "deleted").on(id),
        );

        StatusCode::NO_CONTENT
    }
}

pub async fn issue_certificate<O: SafeStore + 'static>(
    environment: Environment<O>,
    enrollment_id: Uuid,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| {
            Rejection::new(Context::issue_certificate(enrollment_id.to_string()), e)
        };

        debug!(environment.logger, "Issuing completion certificate..."; "enrollment" => %enrollment_id);

        let certificate = services::issue_for_enrollment(
            &environment.logger,
            &environment.db,
            &environment.store,
            &environment.renderer,
            &environment.urls,
            &enrollment_id,
        )
        .await
        .map_err(error_handler)?;

        record_detached(
            environment.logger.clone(),
            environment.audit.clone(),
            AuditEvent::new("certificate", "issued")
                .on(certificate.id)
                .with_details(json!({ "kind": certificate.kind })),
        );

        with_header(
            with_status(json(&certificate), StatusCode::CREATED),
            "location",
            environment.urls.certificate(&certificate.id).as_str(),
        )
    }
}

pub async fn issue_tutor_certificate<O: SafeStore + 'static>(
    environment: Environment<O>,
    workshop_id: Uuid,
    tutor_id: Uuid,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| {
            Rejection::new(
                Context::issue_tutor_certificate(workshop_id.to_string(), tutor_id.to_string()),
                e,
            )
        };

        debug!(environment.logger, "Issuing participation certificate..."; "workshop" => %workshop_id, "tutor" => %tutor_id);

        let certificate = services::issue_for_tutor(
            &environment.logger,
            &environment.db,
            &environment.store,
            &environment.renderer,
            &environment.urls,
            &workshop_id,
            &tutor_id,
        )
        .await
        .map_err(error_handler)?;

        record_detached(
            environment.logger.clone(),
            environment.audit.clone(),
            AuditEvent::new("certificate", "issued")
                .on(certificate.id)
                .with_details(json!({ "kind": certificate.kind })),
        );

        with_header(
            with_status(json(&certificate), StatusCode::CREATED),
            "location",
            environment.urls.certificate(&certificate.id).as_str(),
        )
    }
}

pub async fn list_certificates<O: SafeStore>(environment: Environment<O>) -> RouteResult {
    timed! {
        let certificates = environment
            .db
            .certificates()
            .await
            .map_err(|e: BackendError| Rejection::new(Context::list_certificates(), e))?;

        json(&certificates)
    }
}

pub async fn retrieve_certificate<O: SafeStore>(
    environment: Environment<O>,
    id: Uuid,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::retrieve_certificate(id.to_string()), e);

        let option = environment
            .db
            .certificate(&id)
            .await
            .map_err(error_handler)?;

        match option {
            Some(certificate) => with_status(json(&certificate), StatusCode::OK),
            None => with_status(json(&()), StatusCode::NOT_FOUND),
        }
    }
}

pub async fn verify_certificate<O: SafeStore>(
    environment: Environment<O>,
    value: String,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::verify_certificate(value.clone()), e);

        debug!(environment.logger, "Verifying certificate..."; "value" => &value);

        let certificate = services::verify_certificate(&environment.db, &value)
            .await
            .map_err(error_handler)?;

        json(&certificate)
    }
}

pub async fn revoke_certificate<O: SafeStore>(
    environment: Environment<O>,
    id: Uuid,
    request: RevocationRequest,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::revoke_certificate(id.to_string()), e);

        debug!(environment.logger, "Revoking certificate..."; "id" => %id);

        let certificate = environment
            .db
            .revoke_certificate(&id, request.reason.clone())
            .await
            .map_err(error_handler)?;

        record_detached(
            environment.logger.clone(),
            environment.audit.clone(),
            revocation_event(certificate.id, &request),
        );

        json(&certificate)
    }
}

fn revocation_event(certificate_id: Uuid, request: &RevocationRequest) -> AuditEvent {
    let mut event = AuditEvent::new("certificate", "revoked").on(certificate_id);

    if let Some(actor) = request.actor {
        event = event.by(actor);
    }

    if let Some(reason) = &request.reason {
        event = event.with_details(json!({ "reason": reason }));
    }

    event
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
