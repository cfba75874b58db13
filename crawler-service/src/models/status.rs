use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-(user, resource) processing record.
#[derive(Debug, Clone, FromRow)]
pub struct ProcessingStatus {
    pub id: i64,
    pub user_id: Uuid,
    pub resource_id: String,
    pub platform: String,
    pub is_processed: bool,
    pub crawling_done: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
