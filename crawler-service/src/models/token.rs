use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::platform::{Platform, Service};

/// Durable per-(user, service) sync cursor.
///
/// The token string is opaque here; each connector defines its own
/// semantics (Drive page token, Gmail history ID, Notion edit-time
/// watermark, OneDrive delta URL).
#[derive(Debug, Clone, FromRow)]
pub struct RetrievalToken {
    pub id: i64,
    pub user_id: Uuid,
    pub platform: String,
    pub service: String,
    pub retrieval_token: String,
    pub requires_update: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RetrievalToken {
    pub fn platform_enum(&self) -> Option<Platform> {
        self.platform.parse().ok()
    }

    pub fn service_enum(&self) -> Option<Service> {
        self.service.parse().ok()
    }
}
