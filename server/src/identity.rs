use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::normalization;

/// A learner who can enroll in workshops.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Learner {
    /// The ID of the learner.
    pub id: Uuid,

    /// The display name, normalized on ingest.
    pub name: String,

    /// The date and time the learner was registered.
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
}

/// The payload to register a learner.
#[derive(Clone, Debug, Deserialize)]
pub struct NewLearner {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub name: String,
}

/// A tutor who can be assigned to workshops.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Tutor {
    /// The ID of the tutor.
    pub id: Uuid,

    /// The display name, normalized on ingest.
    pub name: String,

    /// The date and time the tutor was registered.
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
}

/// The payload to register a tutor.
#[derive(Clone, Debug, Deserialize)]
pub struct NewTutor {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub name: String,
}
