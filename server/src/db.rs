use futures::future::BoxFuture;
use time::Date;
use uuid::Uuid;

use crate::attendance::{
    Aggregate, AttendanceBatch, AttendancePatch, AttendanceRecord, AttendanceWrite,
};
use crate::certificate::{Certificate, NewCertificate};
use crate::enrollment::{Enrollment, EnrollmentStatus, NewEnrollment, Transition};
use crate::errors::BackendError;
use crate::identity::{Learner, NewLearner, NewTutor, Tutor};
use crate::workshop::{NewWorkshop, Workshop, WorkshopStatus};

/// The handler-facing persistence interface: one method per operation,
/// each atomic. Mutating core operations run their reads, writes and
/// recomputation inside a single transaction.
pub trait Db {
    fn create_learner(&self, new: NewLearner) -> BoxFuture<Result<Learner, BackendError>>;

    fn learner(&self, id: &Uuid) -> BoxFuture<Result<Option<Learner>, BackendError>>;

    fn create_tutor(&self, new: NewTutor) -> BoxFuture<Result<Tutor, BackendError>>;

    fn tutor(&self, id: &Uuid) -> BoxFuture<Result<Option<Tutor>, BackendError>>;

    fn create_workshop(&self, new: NewWorkshop) -> BoxFuture<Result<Workshop, BackendError>>;

    fn workshop(&self, id: &Uuid) -> BoxFuture<Result<Option<Workshop>, BackendError>>;

    fn workshops(&self) -> BoxFuture<Result<Vec<Workshop>, BackendError>>;

    fn update_workshop_status(
        &self,
        id: &Uuid,
        status: WorkshopStatus,
    ) -> BoxFuture<Result<Workshop, BackendError>>;

    fn assign_tutor(
        &self,
        workshop_id: &Uuid,
        tutor_id: &Uuid,
    ) -> BoxFuture<Result<(), BackendError>>;

    fn tutor_assigned(
        &self,
        workshop_id: &Uuid,
        tutor_id: &Uuid,
    ) -> BoxFuture<Result<bool, BackendError>>;

    fn create_enrollment(
        &self,
        workshop_id: &Uuid,
        new: NewEnrollment,
    ) -> BoxFuture<Result<Enrollment, BackendError>>;

    fn enrollment(&self, id: &Uuid) -> BoxFuture<Result<Option<Enrollment>, BackendError>>;

    fn enrollments_for_workshop(
        &self,
        workshop_id: &Uuid,
    ) -> BoxFuture<Result<Vec<Enrollment>, BackendError>>;

    fn enrollments_for_learner(
        &self,
        learner_id: &Uuid,
    ) -> BoxFuture<Result<Vec<Enrollment>, BackendError>>;

    fn delete_enrollment(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>>;

    fn transition_enrollment(
        &self,
        id: &Uuid,
        target: EnrollmentStatus,
    ) -> BoxFuture<Result<Enrollment, BackendError>>;

    fn register_attendance(
        &self,
        workshop_id: &Uuid,
        batch: AttendanceBatch,
    ) -> BoxFuture<Result<Vec<AttendanceRecord>, BackendError>>;

    fn update_attendance(
        &self,
        id: &Uuid,
        patch: AttendancePatch,
    ) -> BoxFuture<Result<AttendanceRecord, BackendError>>;

    fn delete_attendance(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>>;

    fn attendance_for_workshop(
        &self,
        workshop_id: &Uuid,
        class_date: Option<Date>,
    ) -> BoxFuture<Result<Vec<AttendanceRecord>, BackendError>>;

    fn attendance_for_enrollment(
        &self,
        enrollment_id: &Uuid,
    ) -> BoxFuture<Result<Vec<AttendanceRecord>, BackendError>>;

    fn insert_certificate(
        &self,
        new: NewCertificate,
    ) -> BoxFuture<Result<Certificate, BackendError>>;

    fn certificate(&self, id: &Uuid) -> BoxFuture<Result<Option<Certificate>, BackendError>>;

    fn certificates(&self) -> BoxFuture<Result<Vec<Certificate>, BackendError>>;

    fn certificate_for_enrollment(
        &self,
        enrollment_id: &Uuid,
    ) -> BoxFuture<Result<Option<Certificate>, BackendError>>;

    fn certificate_for_tutor(
        &self,
        workshop_id: &Uuid,
        tutor_id: &Uuid,
    ) -> BoxFuture<Result<Option<Certificate>, BackendError>>;

    fn certificate_by_hash(
        &self,
        hash: &str,
    ) -> BoxFuture<Result<Option<Certificate>, BackendError>>;

    fn certificate_by_code(
        &self,
        code: &str,
    ) -> BoxFuture<Result<Option<Certificate>, BackendError>>;

    fn revoke_certificate(
        &self,
        id: &Uuid,
        reason: Option<String>,
    ) -> BoxFuture<Result<Certificate, BackendError>>;
}

/// Transaction-scoped data access used by the service workflows, so
/// that both backends run the same orchestration.
pub trait Repo: Send {
    fn workshop(&mut self, id: &Uuid) -> BoxFuture<Result<Option<Workshop>, BackendError>>;

    fn learner_exists(&mut self, id: &Uuid) -> BoxFuture<Result<bool, BackendError>>;

    fn enrollment(&mut self, id: &Uuid) -> BoxFuture<Result<Option<Enrollment>, BackendError>>;

    fn enrollment_exists(
        &mut self,
        workshop_id: &Uuid,
        learner_id: &Uuid,
    ) -> BoxFuture<Result<bool, BackendError>>;

    fn enrollments_by_ids(
        &mut self,
        workshop_id: &Uuid,
        ids: &[Uuid],
    ) -> BoxFuture<Result<Vec<Enrollment>, BackendError>>;

    fn count_enrollments(&mut self, workshop_id: &Uuid) -> BoxFuture<Result<i64, BackendError>>;

    fn insert_enrollment(
        &mut self,
        workshop_id: &Uuid,
        new: NewEnrollment,
    ) -> BoxFuture<Result<Enrollment, BackendError>>;

    fn attendance_record(
        &mut self,
        id: &Uuid,
    ) -> BoxFuture<Result<Option<AttendanceRecord>, BackendError>>;

    fn attendance_on_date(
        &mut self,
        enrollment_id: &Uuid,
        class_date: Date,
    ) -> BoxFuture<Result<Option<AttendanceRecord>, BackendError>>;

    fn attendance_for_enrollment(
        &mut self,
        enrollment_id: &Uuid,
    ) -> BoxFuture<Result<Vec<AttendanceRecord>, BackendError>>;

    fn attendance_by_ids(
        &mut self,
        ids: &[Uuid],
    ) -> BoxFuture<Result<Vec<AttendanceRecord>, BackendError>>;

    fn insert_attendance(
        &mut self,
        enrollment_id: &Uuid,
        write: AttendanceWrite,
    ) -> BoxFuture<Result<AttendanceRecord, BackendError>>;

    fn overwrite_attendance(
        &mut self,
        id: &Uuid,
        write: AttendanceWrite,
    ) -> BoxFuture<Result<AttendanceRecord, BackendError>>;

    fn delete_attendance(&mut self, id: &Uuid) -> BoxFuture<Result<(), BackendError>>;

    fn store_aggregate(
        &mut self,
        enrollment_id: &Uuid,
        aggregate: &Aggregate,
    ) -> BoxFuture<Result<(), BackendError>>;

    fn store_transition(
        &mut self,
        enrollment_id: &Uuid,
        transition: &Transition,
    ) -> BoxFuture<Result<Enrollment, BackendError>>;
}

pub mod mem;

pub use self::postgres::*;

mod postgres {
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::postgres::PgPool;
    use time::{Date, OffsetDateTime};
    use uuid::Uuid;

    use crate::attendance::{
        Aggregate, AttendanceBatch, AttendancePatch, AttendanceRecord, AttendanceWrite,
    };
    use crate::certificate::{Certificate, NewCertificate};
    use crate::enrollment::{Enrollment, EnrollmentStatus, NewEnrollment, Transition};
    use crate::environment::Config;
    use crate::errors::BackendError;
    use crate::identity::{Learner, NewLearner, NewTutor, Tutor};
    use crate::services;
    use crate::workshop::{NewWorkshop, Workshop, WorkshopStatus};

    const ENROLLMENTS_LEARNER_WORKSHOP_CONSTRAINT: &str = "uq_enrollments_learner_workshop";
    const ATTENDANCE_ENROLLMENT_DATE_CONSTRAINT: &str = "uq_attendance_enrollment_date";
    const CERTIFICATES_ENROLLMENT_CONSTRAINT: &str = "uq_certificates_enrollment";
    const CERTIFICATES_TUTOR_WORKSHOP_CONSTRAINT: &str = "uq_certificates_tutor_workshop";

    pub struct PgDb {
        pool: PgPool,
        config: Config,
    }

    impl PgDb {
        pub fn new(pool: PgPool, config: Config) -> Self {
            PgDb { pool, config }
        }
    }

    /// A live transaction exposing the [`super::Repo`] interface.
    pub struct PgTx {
        tx: sqlx::Transaction<'static, sqlx::Postgres>,
    }

    impl PgTx {
        fn new(tx: sqlx::Transaction<'static, sqlx::Postgres>) -> Self {
            PgTx { tx }
        }

        async fn commit(self) -> Result<(), BackendError> {
            self.tx.commit().await.map_err(map_sqlx_error)
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn create_learner(&self, new: NewLearner) -> BoxFuture<Result<Learner, BackendError>> {
            async move {
                let query =
                    sqlx::query_as::<_, Learner>(include_str!("queries/create_learner.sql"));

                query
                    .bind(Uuid::new_v4())
                    .bind(new.name)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn learner(&self, id: &Uuid) -> BoxFuture<Result<Option<Learner>, BackendError>> {
            let id = *id;

            async move {
                let query =
                    sqlx::query_as::<_, Learner>(include_str!("queries/retrieve_learner.sql"));

                query
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn create_tutor(&self, new: NewTutor) -> BoxFuture<Result<Tutor, BackendError>> {
            async move {
                let query = sqlx::query_as::<_, Tutor>(include_str!("queries/create_tutor.sql"));

                query
                    .bind(Uuid::new_v4())
                    .bind(new.name)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn tutor(&self, id: &Uuid) -> BoxFuture<Result<Option<Tutor>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query_as::<_, Tutor>(include_str!("queries/retrieve_tutor.sql"));

                query
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn create_workshop(&self, new: NewWorkshop) -> BoxFuture<Result<Workshop, BackendError>> {
            async move {
                let query =
                    sqlx::query_as::<_, Workshop>(include_str!("queries/create_workshop.sql"));

                query
                    .bind(Uuid::new_v4())
                    .bind(new.title)
                    .bind(new.workload_hours)
                    .bind(new.capacity)
                    .bind(new.start_date)
                    .bind(new.end_date)
                    .bind(new.status)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn workshop(&self, id: &Uuid) -> BoxFuture<Result<Option<Workshop>, BackendError>> {
            let id = *id;

            async move {
                let query =
                    sqlx::query_as::<_, Workshop>(include_str!("queries/retrieve_workshop.sql"));

                query
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn workshops(&self) -> BoxFuture<Result<Vec<Workshop>, BackendError>> {
            async move {
                let query =
                    sqlx::query_as::<_, Workshop>(include_str!("queries/list_workshops.sql"));

                query.fetch_all(&self.pool).await.map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn update_workshop_status(
            &self,
            id: &Uuid,
            status: WorkshopStatus,
        ) -> BoxFuture<Result<Workshop, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query_as::<_, Workshop>(include_str!(
                    "queries/update_workshop_status.sql"
                ));

                query
                    .bind(id)
                    .bind(status)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .ok_or(BackendError::NonExistentWorkshop(id))
            }
            .boxed()
        }

        fn assign_tutor(
            &self,
            workshop_id: &Uuid,
            tutor_id: &Uuid,
        ) -> BoxFuture<Result<(), BackendError>> {
            let workshop_id = *workshop_id;
            let tutor_id = *tutor_id;

            async move {
                let (workshop_exists,): (bool,) =
                    sqlx::query_as(include_str!("queries/workshop_exists.sql"))
                        .bind(workshop_id)
                        .fetch_one(&self.pool)
                        .await
                        .map_err(map_sqlx_error)?;

                if !workshop_exists {
                    return Err(BackendError::NonExistentWorkshop(workshop_id));
                }

                let (tutor_exists,): (bool,) =
                    sqlx::query_as(include_str!("queries/tutor_exists.sql"))
                        .bind(tutor_id)
                        .fetch_one(&self.pool)
                        .await
                        .map_err(map_sqlx_error)?;

                if !tutor_exists {
                    return Err(BackendError::NonExistentTutor(tutor_id));
                }

                sqlx::query(include_str!("queries/assign_tutor.sql"))
                    .bind(workshop_id)
                    .bind(tutor_id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(())
            }
            .boxed()
        }

        fn tutor_assigned(
            &self,
            workshop_id: &Uuid,
            tutor_id: &Uuid,
        ) -> BoxFuture<Result<bool, BackendError>> {
            let workshop_id = *workshop_id;
            let tutor_id = *tutor_id;

            async move {
                let (assigned,): (bool,) =
                    sqlx::query_as(include_str!("queries/tutor_assigned.sql"))
                        .bind(workshop_id)
                        .bind(tutor_id)
                        .fetch_one(&self.pool)
                        .await
                        .map_err(map_sqlx_error)?;

                Ok(assigned)
            }
            .boxed()
        }

        fn create_enrollment(
            &self,
            workshop_id: &Uuid,
            new: NewEnrollment,
        ) -> BoxFuture<Result<Enrollment, BackendError>> {
            let workshop_id = *workshop_id;

            async move {
                let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
                let mut repo = PgTx::new(tx);

                let today = OffsetDateTime::now_utc().date();
                let enrollment =
                    services::create_enrollment(&mut repo, &workshop_id, new, today).await?;

                repo.commit().await?;

                Ok(enrollment)
            }
            .boxed()
        }

        fn enrollment(&self, id: &Uuid) -> BoxFuture<Result<Option<Enrollment>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query_as::<_, Enrollment>(include_str!(
                    "queries/retrieve_enrollment.sql"
                ));

                query
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn enrollments_for_workshop(
            &self,
            workshop_id: &Uuid,
        ) -> BoxFuture<Result<Vec<Enrollment>, BackendError>> {
            let workshop_id = *workshop_id;

            async move {
                let query = sqlx::query_as::<_, Enrollment>(include_str!(
                    "queries/list_enrollments_workshop.sql"
                ));

                query
                    .bind(workshop_id)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn enrollments_for_learner(
            &self,
            learner_id: &Uuid,
        ) -> BoxFuture<Result<Vec<Enrollment>, BackendError>> {
            let learner_id = *learner_id;

            async move {
                let query = sqlx::query_as::<_, Enrollment>(include_str!(
                    "queries/list_enrollments_learner.sql"
                ));

                query
                    .bind(learner_id)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn delete_enrollment(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/delete_enrollment.sql"));

                let count = query
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count == 0 {
                    Err(BackendError::NonExistentEnrollment(id))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn transition_enrollment(
            &self,
            id: &Uuid,
            target: EnrollmentStatus,
        ) -> BoxFuture<Result<Enrollment, BackendError>> {
            let id = *id;

            async move {
                let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
                let mut repo = PgTx::new(tx);

                let now = OffsetDateTime::now_utc();
                let enrollment =
                    services::transition_enrollment(&mut repo, &self.config, &id, target, now)
                        .await?;

                repo.commit().await?;

                Ok(enrollment)
            }
            .boxed()
        }

        fn register_attendance(
            &self,
            workshop_id: &Uuid,
            batch: AttendanceBatch,
        ) -> BoxFuture<Result<Vec<AttendanceRecord>, BackendError>> {
            let workshop_id = *workshop_id;

            async move {
                let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
                let mut repo = PgTx::new(tx);

                let now = OffsetDateTime::now_utc();
                let records =
                    services::register_batch(&mut repo, &self.config, &workshop_id, &batch, now)
                        .await?;

                repo.commit().await?;

                Ok(records)
            }
            .boxed()
        }

        fn update_attendance(
            &self,
            id: &Uuid,
            patch: AttendancePatch,
        ) -> BoxFuture<Result<AttendanceRecord, BackendError>> {
            let id = *id;

            async move {
                let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
                let mut repo = PgTx::new(tx);

                let record =
                    services::update_attendance(&mut repo, &self.config, &id, patch).await?;

                repo.commit().await?;

                Ok(record)
            }
            .boxed()
        }

        fn delete_attendance(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
            let id = *id;

            async move {
                let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
                let mut repo = PgTx::new(tx);

                services::delete_attendance(&mut repo, &self.config, &id).await?;

                repo.commit().await?;

                Ok(())
            }
            .boxed()
        }

        fn attendance_for_workshop(
            &self,
            workshop_id: &Uuid,
            class_date: Option<Date>,
        ) -> BoxFuture<Result<Vec<AttendanceRecord>, BackendError>> {
            let workshop_id = *workshop_id;

            async move {
                let query = sqlx::query_as::<_, AttendanceRecord>(include_str!(
                    "queries/attendance_for_workshop.sql"
                ));

                query
                    .bind(workshop_id)
                    .bind(class_date)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn attendance_for_enrollment(
            &self,
            enrollment_id: &Uuid,
        ) -> BoxFuture<Result<Vec<AttendanceRecord>, BackendError>> {
            let enrollment_id = *enrollment_id;

            async move {
                let query = sqlx::query_as::<_, AttendanceRecord>(include_str!(
                    "queries/attendance_for_enrollment.sql"
                ));

                query
                    .bind(enrollment_id)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn insert_certificate(
            &self,
            new: NewCertificate,
        ) -> BoxFuture<Result<Certificate, BackendError>> {
            async move {
                let query = sqlx::query_as::<_, Certificate>(include_str!(
                    "queries/insert_certificate.sql"
                ));

                query
                    .bind(Uuid::new_v4())
                    .bind(new.kind)
                    .bind(new.enrollment_id)
                    .bind(new.tutor_id)
                    .bind(new.workshop_id)
                    .bind(new.validation_hash)
                    .bind(new.verification_code)
                    .bind(new.document_url)
                    .bind(new.document_name)
                    .bind(new.certified_hours)
                    .bind(new.certified_percent)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn certificate(&self, id: &Uuid) -> BoxFuture<Result<Option<Certificate>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query_as::<_, Certificate>(include_str!(
                    "queries/retrieve_certificate.sql"
                ));

                query
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn certificates(&self) -> BoxFuture<Result<Vec<Certificate>, BackendError>> {
            async move {
                let query =
                    sqlx::query_as::<_, Certificate>(include_str!("queries/list_certificates.sql"));

                query.fetch_all(&self.pool).await.map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn certificate_for_enrollment(
            &self,
            enrollment_id: &Uuid,
        ) -> BoxFuture<Result<Option<Certificate>, BackendError>> {
            let enrollment_id = *enrollment_id;

            async move {
                let query = sqlx::query_as::<_, Certificate>(include_str!(
                    "queries/certificate_for_enrollment.sql"
                ));

                query
                    .bind(enrollment_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn certificate_for_tutor(
            &self,
            workshop_id: &Uuid,
            tutor_id: &Uuid,
        ) -> BoxFuture<Result<Option<Certificate>, BackendError>> {
            let workshop_id = *workshop_id;
            let tutor_id = *tutor_id;

            async move {
                let query = sqlx::query_as::<_, Certificate>(include_str!(
                    "queries/certificate_for_tutor.sql"
                ));

                query
                    .bind(workshop_id)
                    .bind(tutor_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn certificate_by_hash(
            &self,
            hash: &str,
        ) -> BoxFuture<Result<Option<Certificate>, BackendError>> {
            let hash = hash.to_owned();

            async move {
                let query = sqlx::query_as::<_, Certificate>(include_str!(
                    "queries/certificate_by_hash.sql"
                ));

                query
                    .bind(hash)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn certificate_by_code(
            &self,
            code: &str,
        ) -> BoxFuture<Result<Option<Certificate>, BackendError>> {
            let code = code.to_owned();

            async move {
                let query = sqlx::query_as::<_, Certificate>(include_str!(
                    "queries/certificate_by_code.sql"
                ));

                query
                    .bind(code)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn revoke_certificate(
            &self,
            id: &Uuid,
            reason: Option<String>,
        ) -> BoxFuture<Result<Certificate, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query_as::<_, Certificate>(include_str!(
                    "queries/revoke_certificate.sql"
                ));

                let revoked = query
                    .bind(id)
                    .bind(reason)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                match revoked {
                    Some(certificate) => Ok(certificate),
                    None => {
                        let existing = sqlx::query_as::<_, Certificate>(include_str!(
                            "queries/retrieve_certificate.sql"
                        ))
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(map_sqlx_error)?;

                        match existing {
                            Some(_) => Err(BackendError::CertificateAlreadyRevoked),
                            None => Err(BackendError::NonExistentCertificate(id)),
                        }
                    }
                }
            }
            .boxed()
        }
    }

    impl super::Repo for PgTx {
        fn workshop(&mut self, id: &Uuid) -> BoxFuture<Result<Option<Workshop>, BackendError>> {
            let id = *id;

            async move {
                sqlx::query_as::<_, Workshop>(include_str!("queries/retrieve_workshop.sql"))
                    .bind(id)
                    .fetch_optional(&mut self.tx)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn learner_exists(&mut self, id: &Uuid) -> BoxFuture<Result<bool, BackendError>> {
            let id = *id;

            async move {
                let (exists,): (bool,) = sqlx::query_as(include_str!("queries/learner_exists.sql"))
                    .bind(id)
                    .fetch_one(&mut self.tx)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(exists)
            }
            .boxed()
        }

        fn enrollment(&mut self, id: &Uuid) -> BoxFuture<Result<Option<Enrollment>, BackendError>> {
            let id = *id;

            async move {
                sqlx::query_as::<_, Enrollment>(include_str!("queries/retrieve_enrollment.sql"))
                    .bind(id)
                    .fetch_optional(&mut self.tx)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn enrollment_exists(
            &mut self,
            workshop_id: &Uuid,
            learner_id: &Uuid,
        ) -> BoxFuture<Result<bool, BackendError>> {
            let workshop_id = *workshop_id;
            let learner_id = *learner_id;

            async move {
                let (exists,): (bool,) =
                    sqlx::query_as(include_str!("queries/enrollment_exists.sql"))
                        .bind(workshop_id)
                        .bind(learner_id)
                        .fetch_one(&mut self.tx)
                        .await
                        .map_err(map_sqlx_error)?;

                Ok(exists)
            }
            .boxed()
        }

        fn enrollments_by_ids(
            &mut self,
            workshop_id: &Uuid,
            ids: &[Uuid],
        ) -> BoxFuture<Result<Vec<Enrollment>, BackendError>> {
            let workshop_id = *workshop_id;
            let ids = ids.to_vec();

            async move {
                sqlx::query_as::<_, Enrollment>(include_str!("queries/enrollments_by_ids.sql"))
                    .bind(workshop_id)
                    .bind(ids)
                    .fetch_all(&mut self.tx)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn count_enrollments(&mut self, workshop_id: &Uuid) -> BoxFuture<Result<i64, BackendError>> {
            let workshop_id = *workshop_id;

            async move {
                let (count,): (i64,) =
                    sqlx::query_as(include_str!("queries/count_enrollments.sql"))
                        .bind(workshop_id)
                        .fetch_one(&mut self.tx)
                        .await
                        .map_err(map_sqlx_error)?;

                Ok(count)
            }
            .boxed()
        }

        fn insert_enrollment(
            &mut self,
            workshop_id: &Uuid,
            new: NewEnrollment,
        ) -> BoxFuture<Result<Enrollment, BackendError>> {
            let workshop_id = *workshop_id;

            async move {
                sqlx::query_as::<_, Enrollment>(include_str!("queries/create_enrollment.sql"))
                    .bind(Uuid::new_v4())
                    .bind(workshop_id)
                    .bind(new.learner_id)
                    .bind(EnrollmentStatus::Enrolled)
                    .bind(new.notes)
                    .fetch_one(&mut self.tx)
                    .await
                    .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn attendance_record(
            &mut self,
            id: &Uuid,
        ) -> BoxFuture<Result<Option<AttendanceRecord>, BackendError>> {
            let id = *id;

            async move {
                sqlx::query_as::<_, AttendanceRecord>(include_str!(
                    "queries/retrieve_attendance.sql"
                ))
                .bind(id)
                .fetch_optional(&mut self.tx)
                .await
                .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn attendance_on_date(
            &mut self,
            enrollment_id: &Uuid,
            class_date: Date,
        ) -> BoxFuture<Result<Option<AttendanceRecord>, BackendError>> {
            let enrollment_id = *enrollment_id;

            async move {
                sqlx::query_as::<_, AttendanceRecord>(include_str!(
                    "queries/attendance_on_date.sql"
                ))
                .bind(enrollment_id)
                .bind(class_date)
                .fetch_optional(&mut self.tx)
                .await
                .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn attendance_for_enrollment(
            &mut self,
            enrollment_id: &Uuid,
        ) -> BoxFuture<Result<Vec<AttendanceRecord>, BackendError>> {
            let enrollment_id = *enrollment_id;

            async move {
                sqlx::query_as::<_, AttendanceRecord>(include_str!(
                    "queries/attendance_for_enrollment.sql"
                ))
                .bind(enrollment_id)
                .fetch_all(&mut self.tx)
                .await
                .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn attendance_by_ids(
            &mut self,
            ids: &[Uuid],
        ) -> BoxFuture<Result<Vec<AttendanceRecord>, BackendError>> {
            let ids = ids.to_vec();

            async move {
                sqlx::query_as::<_, AttendanceRecord>(include_str!(
                    "queries/attendance_by_ids.sql"
                ))
                .bind(ids)
                .fetch_all(&mut self.tx)
                .await
                .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn insert_attendance(
            &mut self,
            enrollment_id: &Uuid,
            write: AttendanceWrite,
        ) -> BoxFuture<Result<AttendanceRecord, BackendError>> {
            let enrollment_id = *enrollment_id;

            async move {
                sqlx::query_as::<_, AttendanceRecord>(include_str!(
                    "queries/insert_attendance.sql"
                ))
                .bind(Uuid::new_v4())
                .bind(enrollment_id)
                .bind(write.class_date)
                .bind(write.class_number)
                .bind(write.present)
                .bind(write.justification)
                .bind(write.tutor_remark)
                .bind(write.recorded_by)
                .fetch_one(&mut self.tx)
                .await
                .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn overwrite_attendance(
            &mut self,
            id: &Uuid,
            write: AttendanceWrite,
        ) -> BoxFuture<Result<AttendanceRecord, BackendError>> {
            let id = *id;

            async move {
                sqlx::query_as::<_, AttendanceRecord>(include_str!(
                    "queries/overwrite_attendance.sql"
                ))
                .bind(id)
                .bind(write.class_date)
                .bind(write.class_number)
                .bind(write.present)
                .bind(write.justification)
                .bind(write.tutor_remark)
                .bind(write.recorded_by)
                .fetch_one(&mut self.tx)
                .await
                .map_err(map_sqlx_error)
            }
            .boxed()
        }

        fn delete_attendance(&mut self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
            let id = *id;

            async move {
                sqlx::query(include_str!("queries/delete_attendance.sql"))
                    .bind(id)
                    .execute(&mut self.tx)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(())
            }
            .boxed()
        }

        fn store_aggregate(
            &mut self,
            enrollment_id: &Uuid,
            aggregate: &Aggregate,
        ) -> BoxFuture<Result<(), BackendError>> {
            let enrollment_id = *enrollment_id;
            let aggregate = *aggregate;

            async move {
                sqlx::query(include_str!("queries/update_enrollment_aggregate.sql"))
                    .bind(enrollment_id)
                    .bind(aggregate.total_presences)
                    .bind(aggregate.total_absences)
                    .bind(aggregate.percent_attendance)
                    .bind(aggregate.total_classes_expected)
                    .bind(aggregate.eligible_for_certificate)
                    .execute(&mut self.tx)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(())
            }
            .boxed()
        }

        fn store_transition(
            &mut self,
            enrollment_id: &Uuid,
            transition: &Transition,
        ) -> BoxFuture<Result<Enrollment, BackendError>> {
            let enrollment_id = *enrollment_id;
            let transition = transition.clone();

            async move {
                sqlx::query_as::<_, Enrollment>(include_str!(
                    "queries/update_enrollment_status.sql"
                ))
                .bind(enrollment_id)
                .bind(transition.status)
                .bind(transition.completion_date)
                .bind(transition.eligible_for_certificate)
                .fetch_one(&mut self.tx)
                .await
                .map_err(map_sqlx_error)
            }
            .boxed()
        }
    }

    fn map_sqlx_error(error: sqlx::Error) -> BackendError {
        use sqlx::Error;

        match error {
            Error::Database(ref e)
                if e.constraint() == Some(ENROLLMENTS_LEARNER_WORKSHOP_CONSTRAINT) =>
            {
                BackendError::LearnerAlreadyEnrolled
            }
            Error::Database(ref e)
                if e.constraint() == Some(ATTENDANCE_ENROLLMENT_DATE_CONSTRAINT) =>
            {
                BackendError::AttendanceDateTaken
            }
            Error::Database(ref e)
                if e.constraint() == Some(CERTIFICATES_ENROLLMENT_CONSTRAINT)
                    || e.constraint() == Some(CERTIFICATES_TUTOR_WORKSHOP_CONSTRAINT) =>
            {
                BackendError::CertificateAlreadyIssued
            }
            _ => BackendError::Sqlx { source: error },
        }
    }
}
