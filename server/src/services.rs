//! The transactional workflows behind each mutating operation.
//!
//! Every function here runs inside a caller-provided [`Repo`] scope
//! (one database transaction, or one in-memory snapshot), so a failed
//! precondition leaves no partial state behind.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, error, Logger};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::attendance::{
    self, Aggregate, AttendanceBatch, AttendancePatch, AttendanceRecord, AttendanceWrite,
};
use crate::certificate::{self, Certificate, CertificateKind, NewCertificate};
use crate::db::{Db, Repo};
use crate::documents::{self, DocumentFields, DOCUMENT_CONTENT_TYPE};
use crate::enrollment::{self, Enrollment, EnrollmentStatus, NewEnrollment};
use crate::environment::{Config, Renderer, VecStore};
use crate::errors::BackendError;
use crate::urls::Urls;

/// Creates an enrollment after the workshop-side guards pass: the
/// workshop must accept new entries, must not have ended, and must
/// have capacity left. Uniqueness per (learner, workshop) is also
/// enforced by the storage layer.
pub async fn create_enrollment<R: Repo>(
    repo: &mut R,
    workshop_id: &Uuid,
    new: NewEnrollment,
    today: Date,
) -> Result<Enrollment, BackendError> {
    let workshop = repo
        .workshop(workshop_id)
        .await?
        .ok_or(BackendError::NonExistentWorkshop(*workshop_id))?;

    if !repo.learner_exists(&new.learner_id).await? {
        return Err(BackendError::NonExistentLearner(new.learner_id));
    }

    if repo.enrollment_exists(workshop_id, &new.learner_id).await? {
        return Err(BackendError::LearnerAlreadyEnrolled);
    }

    if !workshop.status.accepts_enrollments() {
        return Err(BackendError::EnrollmentClosed(workshop.status));
    }

    if workshop.end_date < today {
        return Err(BackendError::EnrollmentPeriodOver);
    }

    let current = repo.count_enrollments(workshop_id).await?;
    if current >= i64::from(workshop.capacity) {
        return Err(BackendError::CapacityExceeded);
    }

    repo.insert_enrollment(workshop_id, new).await
}

/// Applies an explicit status change through the state machine.
pub async fn transition_enrollment<R: Repo>(
    repo: &mut R,
    config: &Config,
    enrollment_id: &Uuid,
    target: EnrollmentStatus,
    now: OffsetDateTime,
) -> Result<Enrollment, BackendError> {
    let enrollment = repo
        .enrollment(enrollment_id)
        .await?
        .ok_or(BackendError::NonExistentEnrollment(*enrollment_id))?;

    match enrollment::apply_transition(
        &enrollment,
        target,
        now,
        config.minimum_attendance_percent,
    )? {
        Some(transition) => repo.store_transition(enrollment_id, &transition).await,
        None => Ok(enrollment),
    }
}

/// Durably applies a batch of attendance entries for one workshop on
/// one class date.
///
/// Rows are upserted per (enrollment, class date), so resubmitting the
/// same date overwrites instead of duplicating. The aggregate is then
/// recomputed exactly once per distinct touched enrollment, and the
/// auto-completion policy is applied to each.
pub async fn register_batch<R: Repo>(
    repo: &mut R,
    config: &Config,
    workshop_id: &Uuid,
    batch: &AttendanceBatch,
    now: OffsetDateTime,
) -> Result<Vec<AttendanceRecord>, BackendError> {
    attendance::ensure_entries_present(&batch.entries)?;

    let workshop = repo
        .workshop(workshop_id)
        .await?
        .ok_or(BackendError::NonExistentWorkshop(*workshop_id))?;

    if !workshop.contains(batch.class_date) {
        return Err(BackendError::DateOutsidePeriod);
    }

    attendance::ensure_unique_enrollments(&batch.entries)?;

    let ids: Vec<Uuid> = batch
        .entries
        .iter()
        .map(|entry| entry.enrollment_id)
        .collect();

    let enrollments = repo.enrollments_by_ids(workshop_id, &ids).await?;
    let by_id: std::collections::HashMap<Uuid, Enrollment> = enrollments
        .into_iter()
        .map(|enrollment| (enrollment.id, enrollment))
        .collect();

    for id in &ids {
        if !by_id.contains_key(id) {
            return Err(BackendError::NonExistentEnrollment(*id));
        }
    }

    for enrollment in by_id.values() {
        if !enrollment.status.accepts_attendance() {
            return Err(BackendError::AttendanceNotRecordable(enrollment.status));
        }
    }

    let mut written = Vec::with_capacity(batch.entries.len());

    for entry in &batch.entries {
        let write = AttendanceWrite {
            class_date: batch.class_date,
            class_number: entry.class_number,
            present: entry.present,
            justification: entry.justification.clone(),
            tutor_remark: entry.tutor_remark.clone(),
            recorded_by: Some(batch.recorded_by),
        };

        let record = match repo
            .attendance_on_date(&entry.enrollment_id, batch.class_date)
            .await?
        {
            Some(existing) => repo.overwrite_attendance(&existing.id, write).await?,
            None => repo.insert_attendance(&entry.enrollment_id, write).await?,
        };

        written.push(record.id);
    }

    // recompute keyed by the set of touched enrollments, not per row
    let touched: HashSet<Uuid> = ids.iter().copied().collect();

    for enrollment_id in &touched {
        let enrollment = &by_id[enrollment_id];
        let aggregate = recompute_enrollment(repo, config, enrollment).await?;
        apply_auto_completion_policy(repo, config, enrollment, &aggregate, now).await?;
    }

    repo.attendance_by_ids(&written).await
}

/// Applies a partial update to one attendance record, then recomputes
/// the owning enrollment's aggregate.
pub async fn update_attendance<R: Repo>(
    repo: &mut R,
    config: &Config,
    record_id: &Uuid,
    patch: AttendancePatch,
) -> Result<AttendanceRecord, BackendError> {
    let record = repo
        .attendance_record(record_id)
        .await?
        .ok_or(BackendError::NonExistentAttendance(*record_id))?;

    if patch.is_empty() {
        return Ok(record);
    }

    let enrollment = repo
        .enrollment(&record.enrollment_id)
        .await?
        .ok_or(BackendError::NonExistentEnrollment(record.enrollment_id))?;

    if let Some(new_date) = patch.class_date {
        let workshop = repo
            .workshop(&enrollment.workshop_id)
            .await?
            .ok_or(BackendError::NonExistentWorkshop(enrollment.workshop_id))?;

        if !workshop.contains(new_date) {
            return Err(BackendError::DateOutsidePeriod);
        }

        if let Some(existing) = repo
            .attendance_on_date(&record.enrollment_id, new_date)
            .await?
        {
            if existing.id != record.id {
                return Err(BackendError::AttendanceDateTaken);
            }
        }
    }

    let write = AttendanceWrite {
        class_date: patch.class_date.unwrap_or(record.class_date),
        class_number: patch.class_number.or(record.class_number),
        present: patch.present.unwrap_or(record.present),
        justification: patch.justification.or_else(|| record.justification.clone()),
        tutor_remark: patch.tutor_remark.or_else(|| record.tutor_remark.clone()),
        recorded_by: patch.recorded_by.or(record.recorded_by),
    };

    let updated = repo.overwrite_attendance(&record.id, write).await?;

    recompute_enrollment(repo, config, &enrollment).await?;

    Ok(updated)
}

/// Deletes one attendance record, then recomputes the owning
/// enrollment's aggregate. The watermark intentionally keeps its
/// previous value, so the visible denominator does not shrink.
pub async fn delete_attendance<R: Repo>(
    repo: &mut R,
    config: &Config,
    record_id: &Uuid,
) -> Result<(), BackendError> {
    let record = repo
        .attendance_record(record_id)
        .await?
        .ok_or(BackendError::NonExistentAttendance(*record_id))?;

    repo.delete_attendance(record_id).await?;

    // the enrollment may be gone when racing an administrative delete;
    // recomputation is then a no-op
    if let Some(enrollment) = repo.enrollment(&record.enrollment_id).await? {
        recompute_enrollment(repo, config, &enrollment).await?;
    }

    Ok(())
}

/// Recomputes and stores the aggregate for one enrollment, reading the
/// attendance rows freshly from the current scope.
async fn recompute_enrollment<R: Repo>(
    repo: &mut R,
    config: &Config,
    enrollment: &Enrollment,
) -> Result<Aggregate, BackendError> {
    let records = repo.attendance_for_enrollment(&enrollment.id).await?;

    let aggregate = attendance::recompute(
        &records,
        enrollment.total_classes_expected,
        enrollment.status,
        config.minimum_attendance_percent,
    );

    repo.store_aggregate(&enrollment.id, &aggregate).await?;

    Ok(aggregate)
}

/// The post-registration auto-completion policy: an in-progress
/// enrollment that has reached the attendance threshold with every
/// expected class recorded is promoted to completed through the
/// ordinary state machine.
async fn apply_auto_completion_policy<R: Repo>(
    repo: &mut R,
    config: &Config,
    enrollment: &Enrollment,
    aggregate: &Aggregate,
    now: OffsetDateTime,
) -> Result<(), BackendError> {
    if enrollment.status != EnrollmentStatus::InProgress {
        return Ok(());
    }

    if aggregate.percent_attendance < config.minimum_attendance_percent {
        return Ok(());
    }

    if aggregate.total_recorded() < aggregate.total_classes_expected {
        return Ok(());
    }

    let mut view = enrollment.clone();
    view.percent_attendance = aggregate.percent_attendance;

    if let Some(transition) = enrollment::apply_transition(
        &view,
        EnrollmentStatus::Completed,
        now,
        config.minimum_attendance_percent,
    )? {
        repo.store_transition(&enrollment.id, &transition).await?;
    }

    Ok(())
}

/// Issues a completion certificate for an eligible enrollment.
///
/// Document rendering and storage happen outside the insert and are
/// allowed to fail: the certificate row is still created, carrying the
/// placeholder URL instead. The unique constraints on the certificates
/// table close the race between concurrent issuance requests.
pub async fn issue_for_enrollment<O: Clone + Send + Sync>(
    logger: &Arc<Logger>,
    db: &Arc<dyn Db + Send + Sync>,
    store: &Arc<VecStore<O>>,
    renderer: &Arc<Renderer>,
    urls: &Urls,
    enrollment_id: &Uuid,
) -> Result<Certificate, BackendError> {
    let enrollment = db
        .enrollment(enrollment_id)
        .await?
        .ok_or(BackendError::NonExistentEnrollment(*enrollment_id))?;

    certificate::ensure_enrollment_ready(&enrollment)?;

    let existing = db.certificate_for_enrollment(enrollment_id).await?;
    certificate::ensure_unissued(existing.as_ref())?;

    let workshop = db
        .workshop(&enrollment.workshop_id)
        .await?
        .ok_or(BackendError::NonExistentWorkshop(enrollment.workshop_id))?;

    let learner = db
        .learner(&enrollment.learner_id)
        .await?
        .ok_or(BackendError::NonExistentLearner(enrollment.learner_id))?;

    let validation_hash = certificate::validation_hash();
    let verification_code = certificate::verification_code();

    let name = documents::completion_document_name(enrollment_id);
    let fields = DocumentFields {
        kind: CertificateKind::LearnerCompletion,
        recipient_name: learner.name,
        workshop_title: workshop.title.clone(),
        workload_hours: workshop.workload_hours,
        start_date: workshop.start_date,
        end_date: workshop.end_date,
        percent_attendance: Some(enrollment.percent_attendance),
        validation_hash: validation_hash.clone(),
        verification_code: verification_code.clone(),
    };

    let document_url = publish_document(logger, store, renderer, urls, &name, &fields).await;

    db.insert_certificate(NewCertificate {
        kind: CertificateKind::LearnerCompletion,
        enrollment_id: Some(*enrollment_id),
        tutor_id: None,
        workshop_id: workshop.id,
        validation_hash,
        verification_code,
        document_url: Some(document_url),
        document_name: Some(name),
        certified_hours: Some(workshop.workload_hours),
        certified_percent: Some(enrollment.percent_attendance),
    })
    .await
}

/// Issues a participation certificate for a tutor of a completed
/// workshop.
pub async fn issue_for_tutor<O: Clone + Send + Sync>(
    logger: &Arc<Logger>,
    db: &Arc<dyn Db + Send + Sync>,
    store: &Arc<VecStore<O>>,
    renderer: &Arc<Renderer>,
    urls: &Urls,
    workshop_id: &Uuid,
    tutor_id: &Uuid,
) -> Result<Certificate, BackendError> {
    let workshop = db
        .workshop(workshop_id)
        .await?
        .ok_or(BackendError::NonExistentWorkshop(*workshop_id))?;

    certificate::ensure_workshop_completed(&workshop)?;

    let tutor = db
        .tutor(tutor_id)
        .await?
        .ok_or(BackendError::NonExistentTutor(*tutor_id))?;

    if !db.tutor_assigned(workshop_id, tutor_id).await? {
        return Err(BackendError::TutorNotAssigned);
    }

    let existing = db.certificate_for_tutor(workshop_id, tutor_id).await?;
    certificate::ensure_unissued(existing.as_ref())?;

    let validation_hash = certificate::validation_hash();
    let verification_code = certificate::verification_code();

    let name = documents::participation_document_name(tutor_id, workshop_id);
    let fields = DocumentFields {
        kind: CertificateKind::TutorParticipation,
        recipient_name: tutor.name,
        workshop_title: workshop.title.clone(),
        workload_hours: workshop.workload_hours,
        start_date: workshop.start_date,
        end_date: workshop.end_date,
        percent_attendance: None,
        validation_hash: validation_hash.clone(),
        verification_code: verification_code.clone(),
    };

    let document_url = publish_document(logger, store, renderer, urls, &name, &fields).await;

    db.insert_certificate(NewCertificate {
        kind: CertificateKind::TutorParticipation,
        enrollment_id: None,
        tutor_id: Some(*tutor_id),
        workshop_id: workshop.id,
        validation_hash,
        verification_code,
        document_url: Some(document_url),
        document_name: Some(name),
        certified_hours: Some(workshop.workload_hours),
        certified_percent: None,
    })
    .await
}

/// Looks up a certificate by validation hash or, failing that, by
/// human verification code.
pub async fn verify_certificate(
    db: &Arc<dyn Db + Send + Sync>,
    value: &str,
) -> Result<Certificate, BackendError> {
    if let Some(certificate) = db.certificate_by_hash(value).await? {
        return Ok(certificate);
    }

    db.certificate_by_code(value)
        .await?
        .ok_or(BackendError::UnknownVerificationValue)
}

/// Renders and stores a certificate document, returning its URL.
///
/// The document is cosmetic relative to the issuance fact: any failure
/// here is logged and degraded to the placeholder URL so issuance can
/// proceed.
async fn publish_document<O: Clone + Send + Sync>(
    logger: &Arc<Logger>,
    store: &Arc<VecStore<O>>,
    renderer: &Arc<Renderer>,
    urls: &Urls,
    name: &str,
    fields: &DocumentFields,
) -> String {
    let result = async {
        let raw = renderer(fields)?;

        store
            .save(name, DOCUMENT_CONTENT_TYPE.to_owned(), raw)
            .await?;

        store
            .get_url(name)
            .map_err(|source| BackendError::FailedToGenerateUrl { source })
    }
    .await;

    match result {
        Ok(url) => {
            debug!(logger, "Stored certificate document"; "name" => name);
            url.to_string()
        }
        Err(e) => {
            error!(logger, "Falling back to placeholder document URL: {}", e; "name" => name);
            urls.fallback_document(name).to_string()
        }
    }
}
