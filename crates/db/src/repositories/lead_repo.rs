//! Repository for the `leads` table.

use agency_core::types::DbId;
use sqlx::PgPool;

pub struct LeadRepo;

impl LeadRepo {
    /// Insert a lead, returning its generated id.
    pub async fn create(pool: &PgPool, name: &str, email: Option<&str>) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar("INSERT INTO leads (name, email) VALUES ($1, $2) RETURNING id")
            .bind(name)
            .bind(email)
            .fetch_one(pool)
            .await
    }

    pub async fn exists(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM leads WHERE id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await
    }
}
