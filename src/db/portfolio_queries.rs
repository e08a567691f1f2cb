use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Portfolio;

pub async fn fetch_all(pool: &PgPool) -> Result<Vec<Portfolio>, sqlx::Error> {
    sqlx::query_as::<_, Portfolio>(
        "SELECT id, owner_id, name, created_at
         FROM portfolios
         ORDER BY id",
    )
    .fetch_all(pool)
    .await
}

pub async fn fetch_one(pool: &PgPool, id: Uuid) -> Result<Option<Portfolio>, sqlx::Error> {
    sqlx::query_as::<_, Portfolio>(
        "SELECT id, owner_id, name, created_at
         FROM portfolios
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Portfolios with at least one position, ordered by id so batch processing
/// order is deterministic.
pub async fn fetch_ids_with_positions(pool: &PgPool) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        "SELECT DISTINCT p.id
         FROM portfolios p
         INNER JOIN positions pos ON pos.portfolio_id = p.id
         ORDER BY p.id",
    )
    .fetch_all(pool)
    .await
}

pub async fn exists(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM portfolios WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await
}
