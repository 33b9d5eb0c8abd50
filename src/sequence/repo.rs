use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::SequenceAllocator;
use crate::store::StoreResult;

/// Counter rows in the `sequences` table.
#[derive(Clone)]
pub struct PgSequences {
    db: PgPool,
}

impl PgSequences {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SequenceAllocator for PgSequences {
    async fn next_value(&self, name: &str) -> StoreResult<i64> {
        // Creation and increment are one statement; the row lock taken by the
        // upsert serialises concurrent callers on the same name.
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequences (name, value)
            VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE SET value = sequences.value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&self.db)
        .await?;
        debug!(sequence = name, value, "sequence advanced");
        Ok(value)
    }
}
