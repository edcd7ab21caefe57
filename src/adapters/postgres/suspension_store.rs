//! PostgreSQL implementation of SuspensionStore.
//!
//! One `suspensions` row per user, replaced on re-suspension; the
//! `suspension_audit` table grows append-only.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::suspension::{SuspensionAudit, SuspensionRecord};
use crate::ports::SuspensionStore;

/// PostgreSQL implementation of [`SuspensionStore`].
#[derive(Clone)]
pub struct PostgresSuspensionStore {
    pool: PgPool,
}

impl PostgresSuspensionStore {
    /// Creates a new PostgresSuspensionStore.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SuspensionStore for PostgresSuspensionStore {
    async fn get(&self, user_id: &UserId) -> Result<Option<SuspensionRecord>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, suspended_until, reason, suspension_count, created_at, updated_at
            FROM suspensions WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::StorageFailure,
                format!("Failed to fetch suspension: {}", e),
            )
        })?;

        row.map(row_to_record).transpose()
    }

    async fn upsert(&self, record: SuspensionRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO suspensions (
                user_id, suspended_until, reason, suspension_count, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                suspended_until = EXCLUDED.suspended_until,
                reason = EXCLUDED.reason,
                suspension_count = EXCLUDED.suspension_count,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.user_id().as_str())
        .bind(record.suspended_until().as_datetime())
        .bind(record.reason())
        .bind(record.suspension_count() as i32)
        .bind(record.created_at().as_datetime())
        .bind(record.updated_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::StorageFailure,
                format!("Failed to upsert suspension: {}", e),
            )
        })?;

        Ok(())
    }

    async fn clear(&self, user_id: &UserId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM suspensions WHERE user_id = $1")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::StorageFailure,
                    format!("Failed to clear suspension: {}", e),
                )
            })?;

        Ok(())
    }

    async fn append_audit(&self, entry: SuspensionAudit) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO suspension_audit (user_id, reason, suspended_until, recorded_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.user_id.as_str())
        .bind(&entry.reason)
        .bind(entry.suspended_until.as_datetime())
        .bind(entry.recorded_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::StorageFailure,
                format!("Failed to append suspension audit: {}", e),
            )
        })?;

        Ok(())
    }

    async fn audit_for_user(&self, user_id: &UserId) -> Result<Vec<SuspensionAudit>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, reason, suspended_until, recorded_at
            FROM suspension_audit
            WHERE user_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::StorageFailure,
                format!("Failed to fetch suspension audit: {}", e),
            )
        })?;

        rows.into_iter().map(row_to_audit).collect()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Helper Functions
// ════════════════════════════════════════════════════════════════════════════════

fn row_to_record(row: sqlx::postgres::PgRow) -> Result<SuspensionRecord, DomainError> {
    let user_id: String = row.get("user_id");
    let suspended_until: chrono::DateTime<chrono::Utc> = row.get("suspended_until");
    let reason: String = row.get("reason");
    let suspension_count: i32 = row.get("suspension_count");
    let created_at: chrono::DateTime<chrono::Utc> = row.get("created_at");
    let updated_at: chrono::DateTime<chrono::Utc> = row.get("updated_at");

    Ok(SuspensionRecord::reconstitute(
        UserId::new(user_id)?,
        Timestamp::from_datetime(suspended_until),
        reason,
        suspension_count as u32,
        Timestamp::from_datetime(created_at),
        Timestamp::from_datetime(updated_at),
    ))
}

fn row_to_audit(row: sqlx::postgres::PgRow) -> Result<SuspensionAudit, DomainError> {
    let user_id: String = row.get("user_id");
    let reason: String = row.get("reason");
    let suspended_until: chrono::DateTime<chrono::Utc> = row.get("suspended_until");
    let recorded_at: chrono::DateTime<chrono::Utc> = row.get("recorded_at");

    Ok(SuspensionAudit {
        user_id: UserId::new(user_id)?,
        reason,
        suspended_until: Timestamp::from_datetime(suspended_until),
        recorded_at: Timestamp::from_datetime(recorded_at),
    })
}
