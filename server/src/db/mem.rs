//! An in-memory implementation of [`Db`](super::Db) for tests and
//! local development.
//!
//! Mutating operations run the same service workflows as the Postgres
//! backend, against a cloned snapshot of the state: the snapshot
//! replaces the live state only on success, which mirrors transaction
//! rollback semantics.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use futures::future::BoxFuture;
use futures::FutureExt;
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

#[derive(Clone, Default)]
struct State {
    learners: HashMap<Uuid, Learner>,
    tutors: HashMap<Uuid, Tutor>,
    workshops: HashMap<Uuid, Workshop>,
    workshop_tutors: HashSet<(Uuid, Uuid)>,
    enrollments: HashMap<Uuid, Enrollment>,
    attendance: HashMap<Uuid, AttendanceRecord>,
    certificates: HashMap<Uuid, Certificate>,
}

impl State {
    fn sorted_attendance(&self, mut records: Vec<AttendanceRecord>) -> Vec<AttendanceRecord> {
        records.sort_by(|a, b| {
            (a.class_date, a.created_at, a.id).cmp(&(b.class_date, b.created_at, b.id))
        });
        records
    }
}

/// The in-memory backend.
pub struct MemDb {
    config: Config,
    state: RwLock<State>,
}

impl MemDb {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: RwLock::new(State::default()),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        f(&self.state.read().unwrap())
    }

    fn snapshot(&self) -> State {
        self.state.read().unwrap().clone()
    }

    fn replace(&self, state: State) {
        *self.state.write().unwrap() = state;
    }
}

/// [`Repo`](super::Repo) over a snapshot of the in-memory state.
pub struct MemTx<'a> {
    state: &'a mut State,
}

impl super::Db for MemDb {
    fn create_learner(&self, new: NewLearner) -> BoxFuture<Result<Learner, BackendError>> {
        async move {
            let learner = Learner {
                id: Uuid::new_v4(),
                name: new.name,
                created_at: OffsetDateTime::now_utc(),
            };

            self.state
                .write()
                .unwrap()
                .learners
                .insert(learner.id, learner.clone());

            Ok(learner)
        }
        .boxed()
    }

    fn learner(&self, id: &Uuid) -> BoxFuture<Result<Option<Learner>, BackendError>> {
        let id = *id;

        async move { Ok(self.read(|state| state.learners.get(&id).cloned())) }.boxed()
    }

    fn create_tutor(&self, new: NewTutor) -> BoxFuture<Result<Tutor, BackendError>> {
        async move {
            let tutor = Tutor {
                id: Uuid::new_v4(),
                name: new.name,
                created_at: OffsetDateTime::now_utc(),
            };

            self.state
                .write()
                .unwrap()
                .tutors
                .insert(tutor.id, tutor.clone());

            Ok(tutor)
        }
        .boxed()
    }

    fn tutor(&self, id: &Uuid) -> BoxFuture<Result<Option<Tutor>, BackendError>> {
        let id = *id;

        async move { Ok(self.read(|state| state.tutors.get(&id).cloned())) }.boxed()
    }

    fn create_workshop(&self, new: NewWorkshop) -> BoxFuture<Result<Workshop, BackendError>> {
        async move {
            let now = OffsetDateTime::now_utc();
            let workshop = Workshop {
                id: Uuid::new_v4(),
                title: new.title,
                workload_hours: new.workload_hours,
                capacity: new.capacity,
                start_date: new.start_date,
                end_date: new.end_date,
                status: new.status,
                created_at: now,
                updated_at: now,
            };

            self.state
                .write()
                .unwrap()
                .workshops
                .insert(workshop.id, workshop.clone());

            Ok(workshop)
        }
        .boxed()
    }

    fn workshop(&self, id: &Uuid) -> BoxFuture<Result<Option<Workshop>, BackendError>> {
        let id = *id;

        async move { Ok(self.read(|state| state.workshops.get(&id).cloned())) }.boxed()
    }

    fn workshops(&self) -> BoxFuture<Result<Vec<Workshop>, BackendError>> {
        async move {
            let mut workshops = self.read(|state| state.workshops.values().cloned().collect::<Vec<_>>());
            workshops.sort_by(|a, b| {
                (a.start_date, a.title.clone()).cmp(&(b.start_date, b.title.clone()))
            });

            Ok(workshops)
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
            let mut state = self.state.write().unwrap();

            let workshop = state
                .workshops
                .get_mut(&id)
                .ok_or(BackendError::NonExistentWorkshop(id))?;

            workshop.status = status;
            workshop.updated_at = OffsetDateTime::now_utc();

            Ok(workshop.clone())
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
            let mut state = self.state.write().unwrap();

            if !state.workshops.contains_key(&workshop_id) {
                return Err(BackendError::NonExistentWorkshop(workshop_id));
            }

            if !state.tutors.contains_key(&tutor_id) {
                return Err(BackendError::NonExistentTutor(tutor_id));
            }

            state.workshop_tutors.insert((workshop_id, tutor_id));

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
            Ok(self.read(|state| state.workshop_tutors.contains(&(workshop_id, tutor_id))))
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
            let mut snapshot = self.snapshot();
            let today = OffsetDateTime::now_utc().date();

            let enrollment = {
                let mut tx = MemTx {
                    state: &mut snapshot,
                };

                services::create_enrollment(&mut tx, &workshop_id, new, today).await?
            };

            self.replace(snapshot);

            Ok(enrollment)
        }
        .boxed()
    }

    fn enrollment(&self, id: &Uuid) -> BoxFuture<Result<Option<Enrollment>, BackendError>> {
        let id = *id;

        async move { Ok(self.read(|state| state.enrollments.get(&id).cloned())) }.boxed()
    }

    fn enrollments_for_workshop(
        &self,
        workshop_id: &Uuid,
    ) -> BoxFuture<Result<Vec<Enrollment>, BackendError>> {
        let workshop_id = *workshop_id;

        async move {
            let mut enrollments = self.read(|state| {
                state
                    .enrollments
                    .values()
                    .filter(|enrollment| enrollment.workshop_id == workshop_id)
                    .cloned()
                    .collect::<Vec<_>>()
            });
            enrollments.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

            Ok(enrollments)
        }
        .boxed()
    }

    fn enrollments_for_learner(
        &self,
        learner_id: &Uuid,
    ) -> BoxFuture<Result<Vec<Enrollment>, BackendError>> {
        let learner_id = *learner_id;

        async move {
            let mut enrollments = self.read(|state| {
                state
                    .enrollments
                    .values()
                    .filter(|enrollment| enrollment.learner_id == learner_id)
                    .cloned()
                    .collect::<Vec<_>>()
            });
            enrollments.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

            Ok(enrollments)
        }
        .boxed()
    }

    fn delete_enrollment(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        let id = *id;

        async move {
            let mut state = self.state.write().unwrap();

            if state.enrollments.remove(&id).is_none() {
                return Err(BackendError::NonExistentEnrollment(id));
            }

            state.attendance.retain(|_, record| record.enrollment_id != id);

            for certificate in state.certificates.values_mut() {
                if certificate.enrollment_id == Some(id) {
                    certificate.enrollment_id = None;
                }
            }

            Ok(())
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
            let mut snapshot = self.snapshot();
            let now = OffsetDateTime::now_utc();

            let enrollment = {
                let mut tx = MemTx {
                    state: &mut snapshot,
                };

                services::transition_enrollment(&mut tx, &self.config, &id, target, now).await?
            };

            self.replace(snapshot);

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
            let mut snapshot = self.snapshot();
            let now = OffsetDateTime::now_utc();

            let records = {
                let mut tx = MemTx {
                    state: &mut snapshot,
                };

                services::register_batch(&mut tx, &self.config, &workshop_id, &batch, now).await?
            };

            self.replace(snapshot);

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
            let mut snapshot = self.snapshot();

            let record = {
                let mut tx = MemTx {
                    state: &mut snapshot,
                };

                services::update_attendance(&mut tx, &self.config, &id, patch).await?
            };

            self.replace(snapshot);

            Ok(record)
        }
        .boxed()
    }

    fn delete_attendance(&self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        let id = *id;

        async move {
            let mut snapshot = self.snapshot();

            {
                let mut tx = MemTx {
                    state: &mut snapshot,
                };

                services::delete_attendance(&mut tx, &self.config, &id).await?;
            }

            self.replace(snapshot);

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
            let records = self.read(|state| {
                let records = state
                    .attendance
                    .values()
                    .filter(|record| {
                        state
                            .enrollments
                            .get(&record.enrollment_id)
                            .map(|enrollment| enrollment.workshop_id == workshop_id)
                            .unwrap_or(false)
                    })
                    .filter(|record| class_date.map_or(true, |date| record.class_date == date))
                    .cloned()
                    .collect::<Vec<_>>();

                state.sorted_attendance(records)
            });

            Ok(records)
        }
        .boxed()
    }

    fn attendance_for_enrollment(
        &self,
        enrollment_id: &Uuid,
    ) -> BoxFuture<Result<Vec<AttendanceRecord>, BackendError>> {
        let enrollment_id = *enrollment_id;

        async move {
            let records = self.read(|state| {
                let records = state
                    .attendance
                    .values()
                    .filter(|record| record.enrollment_id == enrollment_id)
                    .cloned()
                    .collect::<Vec<_>>();

                state.sorted_attendance(records)
            });

            Ok(records)
        }
        .boxed()
    }

    fn insert_certificate(
        &self,
        new: NewCertificate,
    ) -> BoxFuture<Result<Certificate, BackendError>> {
        async move {
            let mut state = self.state.write().unwrap();

            if let Some(enrollment_id) = new.enrollment_id {
                let duplicate = state
                    .certificates
                    .values()
                    .any(|certificate| certificate.enrollment_id == Some(enrollment_id));

                if duplicate {
                    return Err(BackendError::CertificateAlreadyIssued);
                }
            }

            if let Some(tutor_id) = new.tutor_id {
                let duplicate = state.certificates.values().any(|certificate| {
                    certificate.tutor_id == Some(tutor_id)
                        && certificate.workshop_id == new.workshop_id
                });

                if duplicate {
                    return Err(BackendError::CertificateAlreadyIssued);
                }
            }

            let certificate = Certificate {
                id: Uuid::new_v4(),
                kind: new.kind,
                enrollment_id: new.enrollment_id,
                tutor_id: new.tutor_id,
                workshop_id: new.workshop_id,
                validation_hash: new.validation_hash,
                verification_code: new.verification_code,
                document_url: new.document_url,
                document_name: new.document_name,
                issued_at: OffsetDateTime::now_utc(),
                certified_hours: new.certified_hours,
                certified_percent: new.certified_percent,
                revoked: false,
                revoked_at: None,
                revocation_reason: None,
            };

            state
                .certificates
                .insert(certificate.id, certificate.clone());

            Ok(certificate)
        }
        .boxed()
    }

    fn certificate(&self, id: &Uuid) -> BoxFuture<Result<Option<Certificate>, BackendError>> {
        let id = *id;

        async move { Ok(self.read(|state| state.certificates.get(&id).cloned())) }.boxed()
    }

    fn certificates(&self) -> BoxFuture<Result<Vec<Certificate>, BackendError>> {
        async move {
            let mut certificates =
                self.read(|state| state.certificates.values().cloned().collect::<Vec<_>>());
            certificates.sort_by(|a, b| (b.issued_at, b.id).cmp(&(a.issued_at, a.id)));

            Ok(certificates)
        }
        .boxed()
    }

    fn certificate_for_enrollment(
        &self,
        enrollment_id: &Uuid,
    ) -> BoxFuture<Result<Option<Certificate>, BackendError>> {
        let enrollment_id = *enrollment_id;

        async move {
            Ok(self.read(|state| {
                state
                    .certificates
                    .values()
                    .find(|certificate| certificate.enrollment_id == Some(enrollment_id))
                    .cloned()
            }))
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
            Ok(self.read(|state| {
                state
                    .certificates
                    .values()
                    .find(|certificate| {
                        certificate.workshop_id == workshop_id
                            && certificate.tutor_id == Some(tutor_id)
                    })
                    .cloned()
            }))
        }
        .boxed()
    }

    fn certificate_by_hash(
        &self,
        hash: &str,
    ) -> BoxFuture<Result<Option<Certificate>, BackendError>> {
        let hash = hash.to_owned();

        async move {
            Ok(self.read(|state| {
                state
                    .certificates
                    .values()
                    .find(|certificate| certificate.validation_hash == hash)
                    .cloned()
            }))
        }
        .boxed()
    }

    fn certificate_by_code(
        &self,
        code: &str,
    ) -> BoxFuture<Result<Option<Certificate>, BackendError>> {
        let code = code.to_owned();

        async move {
            Ok(self.read(|state| {
                state
                    .certificates
                    .values()
                    .find(|certificate| certificate.verification_code == code)
                    .cloned()
            }))
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
            let mut state = self.state.write().unwrap();

            let certificate = state
                .certificates
                .get_mut(&id)
                .ok_or(BackendError::NonExistentCertificate(id))?;

            if certificate.revoked {
                return Err(BackendError::CertificateAlreadyRevoked);
            }

            certificate.revoked = true;
            certificate.revoked_at = Some(OffsetDateTime::now_utc());
            certificate.revocation_reason = reason;

            Ok(certificate.clone())
        }
        .boxed()
    }
}

impl<'s> super::Repo for MemTx<'s> {
    fn workshop(&mut self, id: &Uuid) -> BoxFuture<Result<Option<Workshop>, BackendError>> {
        let id = *id;

        async move { Ok(self.state.workshops.get(&id).cloned()) }.boxed()
    }

    fn learner_exists(&mut self, id: &Uuid) -> BoxFuture<Result<bool, BackendError>> {
        let id = *id;

        async move { Ok(self.state.learners.contains_key(&id)) }.boxed()
    }

    fn enrollment(&mut self, id: &Uuid) -> BoxFuture<Result<Option<Enrollment>, BackendError>> {
        let id = *id;

        async move { Ok(self.state.enrollments.get(&id).cloned()) }.boxed()
    }

    fn enrollment_exists(
        &mut self,
        workshop_id: &Uuid,
        learner_id: &Uuid,
    ) -> BoxFuture<Result<bool, BackendError>> {
        let workshop_id = *workshop_id;
        let learner_id = *learner_id;

        async move {
            Ok(self.state.enrollments.values().any(|enrollment| {
                enrollment.workshop_id == workshop_id && enrollment.learner_id == learner_id
            }))
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
            Ok(ids
                .iter()
                .filter_map(|id| self.state.enrollments.get(id))
                .filter(|enrollment| enrollment.workshop_id == workshop_id)
                .cloned()
                .collect())
        }
        .boxed()
    }

    fn count_enrollments(&mut self, workshop_id: &Uuid) -> BoxFuture<Result<i64, BackendError>> {
        let workshop_id = *workshop_id;

        async move {
            Ok(self
                .state
                .enrollments
                .values()
                .filter(|enrollment| enrollment.workshop_id == workshop_id)
                .count() as i64)
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
            let duplicate = self.state.enrollments.values().any(|enrollment| {
                enrollment.workshop_id == workshop_id && enrollment.learner_id == new.learner_id
            });

            if duplicate {
                return Err(BackendError::LearnerAlreadyEnrolled);
            }

            let now = OffsetDateTime::now_utc();
            let enrollment = Enrollment {
                id: Uuid::new_v4(),
                workshop_id,
                learner_id: new.learner_id,
                status: EnrollmentStatus::Enrolled,
                enrolled_at: now,
                percent_attendance: 0.0,
                total_classes_expected: 0,
                total_presences: 0,
                total_absences: 0,
                eligible_for_certificate: false,
                completion_date: None,
                notes: new.notes,
                created_at: now,
                updated_at: now,
            };

            self.state
                .enrollments
                .insert(enrollment.id, enrollment.clone());

            Ok(enrollment)
        }
        .boxed()
    }

    fn attendance_record(
        &mut self,
        id: &Uuid,
    ) -> BoxFuture<Result<Option<AttendanceRecord>, BackendError>> {
        let id = *id;

        async move { Ok(self.state.attendance.get(&id).cloned()) }.boxed()
    }

    fn attendance_on_date(
        &mut self,
        enrollment_id: &Uuid,
        class_date: Date,
    ) -> BoxFuture<Result<Option<AttendanceRecord>, BackendError>> {
        let enrollment_id = *enrollment_id;

        async move {
            Ok(self
                .state
                .attendance
                .values()
                .find(|record| {
                    record.enrollment_id == enrollment_id && record.class_date == class_date
                })
                .cloned())
        }
        .boxed()
    }

    fn attendance_for_enrollment(
        &mut self,
        enrollment_id: &Uuid,
    ) -> BoxFuture<Result<Vec<AttendanceRecord>, BackendError>> {
        let enrollment_id = *enrollment_id;

        async move {
            let records = self
                .state
                .attendance
                .values()
                .filter(|record| record.enrollment_id == enrollment_id)
                .cloned()
                .collect();

            Ok(self.state.sorted_attendance(records))
        }
        .boxed()
    }

    fn attendance_by_ids(
        &mut self,
        ids: &[Uuid],
    ) -> BoxFuture<Result<Vec<AttendanceRecord>, BackendError>> {
        let ids = ids.to_vec();

        async move {
            let records = ids
                .iter()
                .filter_map(|id| self.state.attendance.get(id))
                .cloned()
                .collect();

            Ok(self.state.sorted_attendance(records))
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
            let occupied = self.state.attendance.values().any(|record| {
                record.enrollment_id == enrollment_id && record.class_date == write.class_date
            });

            if occupied {
                return Err(BackendError::AttendanceDateTaken);
            }

            let now = OffsetDateTime::now_utc();
            let record = AttendanceRecord {
                id: Uuid::new_v4(),
                enrollment_id,
                class_date: write.class_date,
                class_number: write.class_number,
                present: write.present,
                justification: write.justification,
                tutor_remark: write.tutor_remark,
                recorded_by: write.recorded_by,
                created_at: now,
                updated_at: now,
            };

            self.state.attendance.insert(record.id, record.clone());

            Ok(record)
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
            let target_enrollment = self
                .state
                .attendance
                .get(&id)
                .map(|record| record.enrollment_id)
                .ok_or(BackendError::NonExistentAttendance(id))?;

            let occupied = self.state.attendance.values().any(|record| {
                record.id != id
                    && record.enrollment_id == target_enrollment
                    && record.class_date == write.class_date
            });

            if occupied {
                return Err(BackendError::AttendanceDateTaken);
            }

            let record = self
                .state
                .attendance
                .get_mut(&id)
                .ok_or(BackendError::NonExistentAttendance(id))?;

            record.class_date = write.class_date;
            record.class_number = write.class_number;
            record.present = write.present;
            record.justification = write.justification;
            record.tutor_remark = write.tutor_remark;
            record.recorded_by = write.recorded_by;
            record.updated_at = OffsetDateTime::now_utc();

            Ok(record.clone())
        }
        .boxed()
    }

    fn delete_attendance(&mut self, id: &Uuid) -> BoxFuture<Result<(), BackendError>> {
        let id = *id;

        async move {
            self.state.attendance.remove(&id);

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
            if let Some(enrollment) = self.state.enrollments.get_mut(&enrollment_id) {
                enrollment.total_presences = aggregate.total_presences;
                enrollment.total_absences = aggregate.total_absences;
                enrollment.percent_attendance = aggregate.percent_attendance;
                enrollment.total_classes_expected = aggregate.total_classes_expected;
                enrollment.eligible_for_certificate = aggregate.eligible_for_certificate;
                enrollment.updated_at = OffsetDateTime::now_utc();
            }

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
            let enrollment = self
                .state
                .enrollments
                .get_mut(&enrollment_id)
                .ok_or(BackendError::NonExistentEnrollment(enrollment_id))?;

            enrollment.status = transition.status;
            enrollment.completion_date = transition.completion_date;
            enrollment.eligible_for_certificate = transition.eligible_for_certificate;
            enrollment.updated_at = OffsetDateTime::now_utc();

            Ok(enrollment.clone())
        }
        .boxed()
    }
}
