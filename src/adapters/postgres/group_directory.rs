//! PostgreSQL implementation of GroupDirectory.
//!
//! Group membership is owned by a separate system; the engine reads the
//! `groups` and `group_members` tables it maintains and writes back only
//! the per-group current-cycle pointer.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::foundation::{CycleId, DomainError, ErrorCode, GroupId, UserId};
use crate::ports::GroupDirectory;

/// PostgreSQL implementation of [`GroupDirectory`].
#[derive(Clone)]
pub struct PostgresGroupDirectory {
    pool: PgPool,
}

impl PostgresGroupDirectory {
    /// Creates a new PostgresGroupDirectory.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupDirectory for PostgresGroupDirectory {
    async fn members(&self, group_id: GroupId) -> Result<Option<Vec<UserId>>, DomainError> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM groups WHERE id = $1")
            .bind(group_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::StorageFailure,
                    format!("Failed to check group existence: {}", e),
                )
            })?;

        if result.0 == 0 {
            return Ok(None);
        }

        let rows = sqlx::query(
            r#"
            SELECT user_id FROM group_members
            WHERE group_id = $1
            ORDER BY user_id ASC
            "#,
        )
        .bind(group_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::StorageFailure,
                format!("Failed to fetch group members: {}", e),
            )
        })?;

        let members = rows
            .into_iter()
            .map(|row| {
                let user_id: String = row.get("user_id");
                UserId::new(user_id).map_err(DomainError::from)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(members))
    }

    async fn current_cycle(&self, group_id: GroupId) -> Result<Option<CycleId>, DomainError> {
        let row = sqlx::query("SELECT current_cycle_id FROM groups WHERE id = $1")
            .bind(group_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::StorageFailure,
                    format!("Failed to fetch current cycle: {}", e),
                )
            })?;

        Ok(row.and_then(|r| {
            r.get::<Option<Uuid>, _>("current_cycle_id")
                .map(CycleId::from_uuid)
        }))
    }

    async fn set_current_cycle(
        &self,
        group_id: GroupId,
        cycle_id: Option<CycleId>,
    ) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE groups SET current_cycle_id = $2 WHERE id = $1")
            .bind(group_id.as_uuid())
            .bind(cycle_id.map(|id| *id.as_uuid()))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::StorageFailure,
                    format!("Failed to update current cycle: {}", e),
                )
            })?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::GroupNotFound,
                format!("Group {} not found", group_id),
            ));
        }

        Ok(())
    }
}
