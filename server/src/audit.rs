use std::sync::{Arc, RwLock};

use futures::future::{BoxFuture, FutureExt};
use log::{error, Logger};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::errors::BackendError;

/// One recorded administrative action.
#[derive(Clone, Debug)]
pub struct AuditEvent {
    pub resource: String,
    pub resource_id: Option<Uuid>,
    pub action: String,
    pub actor: Option<Uuid>,
    pub details: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            resource_id: None,
            action: action.into(),
            actor: None,
            details: None,
        }
    }

    pub fn on(mut self, resource_id: Uuid) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    pub fn by(mut self, actor: Uuid) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Where audit events end up.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> BoxFuture<Result<(), BackendError>>;
}

/// A sink that appends events to the `audit_events` table.
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AuditSink for PgAuditSink {
    fn record(&self, event: AuditEvent) -> BoxFuture<Result<(), BackendError>> {
        async move {
            let details = match &event.details {
                Some(details) => {
                    Some(serde_json::to_string(details).unwrap_or_else(|_| "null".to_owned()))
                }
                None => None,
            };

            let query = sqlx::query(include_str!("queries/insert_audit_event.sql"));

            query
                .bind(Uuid::new_v4())
                .bind(&event.resource)
                .bind(event.resource_id)
                .bind(&event.action)
                .bind(event.actor)
                .bind(details)
                .execute(&self.pool)
                .await
                .map_err(|source| BackendError::Sqlx { source })?;

            Ok(())
        }
        .boxed()
    }
}

/// A sink that collects events in memory, for tests and local use.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().unwrap().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> BoxFuture<Result<(), BackendError>> {
        async move {
            self.events.write().unwrap().push(event);

            Ok(())
        }
        .boxed()
    }
}

/// Records an event on a detached task. The sink is fire-and-forget
/// from the caller's perspective; failures are logged and ignored.
pub fn record_detached(
    logger: Arc<Logger>,
    sink: Arc<dyn AuditSink + Send + Sync>,
    event: AuditEvent,
) {
    tokio::spawn(async move {
        if let Err(e) = sink.record(event).await {
            error!(logger, "Failed to record audit event: {}", e);
        }
    });
}
