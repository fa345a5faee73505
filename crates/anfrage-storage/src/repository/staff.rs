//! Staff user repository

use crate::db::DatabasePool;
use crate::models::StaffUser;
use anfrage_common::{Error, Result};
use async_trait::async_trait;

/// Staff repository trait
#[async_trait]
pub trait StaffRepository: Send + Sync {
    /// Active staff members, who receive new-ticket notifications
    async fn list_active(&self) -> Result<Vec<StaffUser>>;
}

/// PostgreSQL staff repository implementation
pub struct DbStaffRepository {
    pool: DatabasePool,
}

impl DbStaffRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StaffRepository for DbStaffRepository {
    async fn list_active(&self) -> Result<Vec<StaffUser>> {
        sqlx::query_as::<_, StaffUser>(
            r#"
            SELECT id, name, email, active, created_at
            FROM staff_users
            WHERE active = true
            ORDER BY name
            "#,
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
