use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// A portfolio groups positions under one owner. The batch engine only ever
// reads this table; creation and mutation belong to the entry layer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Portfolio {
    pub id: uuid::Uuid,
    pub owner_id: uuid::Uuid,
    pub name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
