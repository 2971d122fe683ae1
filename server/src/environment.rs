use std::sync::Arc;

use log::Logger;

use crate::audit::AuditSink;
use crate::db::Db;
use crate::documents::DocumentFields;
use crate::errors::BackendError;
use crate::store::Store;
use crate::urls::Urls;

/// Renders a certificate document into raw bytes.
pub type Renderer = dyn Fn(&DocumentFields) -> Result<Vec<u8>, BackendError> + Send + Sync;

pub type VecStore<O> = dyn Store<Output = O, Raw = Vec<u8>> + Send + Sync;

/// Marker bound for store output types that can travel through warp
/// filters.
pub trait SafeStore: Clone + Send + Sync {}

impl<T: Clone + Send + Sync> SafeStore for T {}

/// Everything a request handler needs, built once at startup and
/// cloned into each route.
#[derive(Clone)]
pub struct Environment<O: Clone + Send + Sync> {
    pub logger: Arc<Logger>,
    pub db: Arc<dyn Db + Send + Sync>,
    pub urls: Arc<Urls>,
    pub store: Arc<VecStore<O>>,
    pub renderer: Arc<Renderer>,
    pub audit: Arc<dyn AuditSink + Send + Sync>,
    pub config: Config,
}

impl<O: Clone + Send + Sync> Environment<O> {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<dyn Db + Send + Sync>,
        urls: Arc<Urls>,
        store: Arc<VecStore<O>>,
        renderer: Arc<Renderer>,
        audit: Arc<dyn AuditSink + Send + Sync>,
        config: Config,
    ) -> Self {
        Self {
            logger,
            db,
            urls,
            store,
            renderer,
            audit,
            config,
        }
    }
}

/// Process-wide immutable settings.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub(crate) minimum_attendance_percent: f64,
}

impl Config {
    pub fn new(minimum_attendance_percent: f64) -> Self {
        Self {
            minimum_attendance_percent,
        }
    }

    pub fn minimum_attendance_percent(&self) -> f64 {
        self.minimum_attendance_percent
    }
}
