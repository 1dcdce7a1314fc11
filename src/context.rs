//! Application context - everything an operation needs, built once in `main`.

use crate::{
    config::{Packages, Settings},
    core::session::SessionStore,
    media::MediaStore,
    processor::PaymentProcessor,
    providers::{ImageGenerator, VideoGenerator},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Shared collaborators passed by reference into every channel and session operation.
#[derive(Clone)]
pub struct AppContext {
    pub db: DatabaseConnection,
    pub settings: Arc<Settings>,
    pub packages: Arc<Packages>,
    /// `None` when the external processor is not configured
    pub processor: Option<Arc<dyn PaymentProcessor>>,
    pub image: Arc<dyn ImageGenerator>,
    pub video: Arc<dyn VideoGenerator>,
    pub media: Arc<dyn MediaStore>,
    pub sessions: Arc<SessionStore>,
}

impl AppContext {
    /// Chat accounts configured as admins.
    #[must_use]
    pub fn is_admin(&self, external_id: &str) -> bool {
        self.settings.is_admin(external_id)
    }
}
