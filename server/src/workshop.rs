use std::fmt;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::dates;
use crate::errors::BackendError;
use crate::normalization;

/// Lifecycle stages for a workshop.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum WorkshopStatus {
    Planned,
    EnrollmentOpen,
    InProgress,
    Completed,
    Cancelled,
}

impl WorkshopStatus {
    /// Whether new enrollments may be created while in this status.
    pub fn accepts_enrollments(self) -> bool {
        matches!(self, WorkshopStatus::Planned | WorkshopStatus::EnrollmentOpen)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkshopStatus::Planned => "planned",
            WorkshopStatus::EnrollmentOpen => "enrollment_open",
            WorkshopStatus::InProgress => "in_progress",
            WorkshopStatus::Completed => "completed",
            WorkshopStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkshopStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single workshop offering within the extension program.
///
/// The enrollment and attendance flows only read its date bounds,
/// capacity, workload and status; they never mutate it.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Workshop {
    /// The ID of the workshop.
    pub id: Uuid,

    /// The title, normalized on ingest.
    pub title: String,

    /// The certified workload, in hours.
    pub workload_hours: i32,

    /// The maximum number of enrollments accepted.
    pub capacity: i32,

    /// The first class date.
    #[serde(with = "dates::date")]
    pub start_date: Date,

    /// The last class date, inclusive.
    #[serde(with = "dates::date")]
    pub end_date: Date,

    /// The lifecycle status.
    pub status: WorkshopStatus,

    /// The date and time it was created.
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,

    /// The date and time it was last modified.
    #[serde(with = "time::serde::timestamp")]
    pub updated_at: OffsetDateTime,
}

impl Workshop {
    /// Whether the given class date falls within the workshop period,
    /// bounds inclusive.
    pub fn contains(&self, class_date: Date) -> bool {
        class_date >= self.start_date && class_date <= self.end_date
    }
}

/// The payload to create a workshop.
#[derive(Clone, Debug, Deserialize)]
pub struct NewWorkshop {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub title: String,

    pub workload_hours: i32,

    pub capacity: i32,

    #[serde(with = "dates::date")]
    pub start_date: Date,

    #[serde(with = "dates::date")]
    pub end_date: Date,

    #[serde(default = "default_status")]
    pub status: WorkshopStatus,
}

fn default_status() -> WorkshopStatus {
    WorkshopStatus::Planned
}

impl NewWorkshop {
    /// Checks the payload invariants mirrored by the table constraints.
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.capacity < 1 {
            return Err(BackendError::InvalidCapacity);
        }

        if self.workload_hours < 1 {
            return Err(BackendError::InvalidWorkload);
        }

        if self.end_date < self.start_date {
            return Err(BackendError::InvalidPeriod);
        }

        Ok(())
    }
}
