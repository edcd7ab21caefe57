//! PostgreSQL implementation of CycleStore.
//!
//! Persists OrderCycle aggregates to PostgreSQL with the participant
//! ledger and product rollups stored as JSONB. Writes go through a
//! conditional UPDATE on the stored version; zero rows affected means a
//! concurrent writer won, and the mutation re-runs against fresh state.
//!
//! Subscriptions are in-process: each store fans committed snapshots out
//! over its own broadcast channels. Workers in other processes observe
//! changes by polling, not by subscription.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::cycle::{OrderCycle, Participant, ProductAggregate};
use crate::domain::foundation::{
    CycleId, CyclePhase, DomainError, ErrorCode, GroupId, ProductId, Timestamp,
};
use crate::ports::{CycleStore, Mutator, TxOutcome};

/// How many committed snapshots a slow subscriber may lag behind.
const CHANNEL_CAPACITY: usize = 64;

/// How many lost races a single transact call will absorb before
/// giving up.
const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Partial unique index enforcing one open cycle per group.
const ONE_OPEN_PER_GROUP: &str = "order_cycles_one_open_per_group";

/// PostgreSQL implementation of [`CycleStore`].
///
/// # Panics
///
/// `subscribe` and subscriber notification panic if the channel lock is
/// poisoned, which only happens after another thread panicked mid-write.
#[derive(Clone)]
pub struct PostgresCycleStore {
    pool: PgPool,
    channels: Arc<RwLock<HashMap<CycleId, broadcast::Sender<OrderCycle>>>>,
}

impl PostgresCycleStore {
    /// Creates a new PostgresCycleStore.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn notify(&self, cycle: &OrderCycle) {
        let channels = self
            .channels
            .read()
            .expect("PostgresCycleStore: channels lock poisoned");
        if let Some(sender) = channels.get(&cycle.id()) {
            // A send with no live receivers just drops the snapshot
            let _ = sender.send(cycle.clone());
        }
    }
}

#[async_trait]
impl CycleStore for PostgresCycleStore {
    async fn get(&self, id: CycleId) -> Result<Option<OrderCycle>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT id, group_id, phase,
                   collecting_started_at, collecting_ends_at,
                   payment_window_started_at, payment_window_ends_at,
                   participants, product_orders,
                   total_participants, total_amount_cents,
                   cancel_reason, confirmed_at, estimated_delivery,
                   default_min_quantity, version, created_at, updated_at
            FROM order_cycles WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::StorageFailure, format!("Failed to fetch cycle: {}", e))
        })?;

        row.map(row_to_cycle).transpose()
    }

    async fn insert(&self, cycle: OrderCycle) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO order_cycles (
                id, group_id, phase,
                collecting_started_at, collecting_ends_at,
                payment_window_started_at, payment_window_ends_at,
                participants, product_orders,
                total_participants, total_amount_cents,
                cancel_reason, confirmed_at, estimated_delivery,
                default_min_quantity, next_deadline, version,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                      $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(cycle.id().as_uuid())
        .bind(cycle.group_id().as_uuid())
        .bind(cycle.phase().as_str())
        .bind(cycle.collecting_started_at().as_datetime())
        .bind(cycle.collecting_ends_at().as_datetime())
        .bind(cycle.payment_window_started_at().map(|t| *t.as_datetime()))
        .bind(cycle.payment_window_ends_at().map(|t| *t.as_datetime()))
        .bind(to_jsonb(&cycle.participants(), "participants")?)
        .bind(to_jsonb(&cycle.product_orders(), "product orders")?)
        .bind(cycle.total_participants() as i32)
        .bind(cycle.total_amount_cents())
        .bind(cycle.cancel_reason())
        .bind(cycle.confirmed_at().map(|t| *t.as_datetime()))
        .bind(cycle.estimated_delivery().map(|t| *t.as_datetime()))
        .bind(cycle.default_min_quantity() as i32)
        .bind(cycle.next_deadline().map(|t| *t.as_datetime()))
        .bind(cycle.version() as i64)
        .bind(cycle.created_at().as_datetime())
        .bind(cycle.updated_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error().and_then(|db| db.constraint()) {
            Some(ONE_OPEN_PER_GROUP) => DomainError::new(
                ErrorCode::OpenCycleExists,
                format!("Group {} already has an open cycle", cycle.group_id()),
            ),
            _ => DomainError::new(
                ErrorCode::StorageFailure,
                format!("Failed to insert cycle: {}", e),
            ),
        })?;

        Ok(())
    }

    async fn find_open_by_group(
        &self,
        group_id: GroupId,
    ) -> Result<Option<OrderCycle>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT id, group_id, phase,
                   collecting_started_at, collecting_ends_at,
                   payment_window_started_at, payment_window_ends_at,
                   participants, product_orders,
                   total_participants, total_amount_cents,
                   cancel_reason, confirmed_at, estimated_delivery,
                   default_min_quantity, version, created_at, updated_at
            FROM order_cycles
            WHERE group_id = $1 AND phase IN ('collecting', 'payment_window')
            LIMIT 1
            "#,
        )
        .bind(group_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::StorageFailure,
                format!("Failed to fetch open cycle: {}", e),
            )
        })?;

        row.map(row_to_cycle).transpose()
    }

    async fn list_due(&self, now: Timestamp, limit: u32) -> Result<Vec<OrderCycle>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT id, group_id, phase,
                   collecting_started_at, collecting_ends_at,
                   payment_window_started_at, payment_window_ends_at,
                   participants, product_orders,
                   total_participants, total_amount_cents,
                   cancel_reason, confirmed_at, estimated_delivery,
                   default_min_quantity, version, created_at, updated_at
            FROM order_cycles
            WHERE next_deadline IS NOT NULL AND next_deadline <= $1
            ORDER BY next_deadline ASC
            LIMIT $2
            "#,
        )
        .bind(now.as_datetime())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::StorageFailure, format!("Failed to list due cycles: {}", e))
        })?;

        rows.into_iter().map(row_to_cycle).collect()
    }

    async fn transact(&self, id: CycleId, mutate: Mutator<'_>) -> Result<OrderCycle, DomainError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut working = self.get(id).await?.ok_or_else(|| {
                DomainError::new(ErrorCode::CycleNotFound, format!("Cycle {} not found", id))
            })?;
            let read_version = working.version();

            if mutate(&mut working)? == TxOutcome::Noop {
                return Ok(working);
            }
            working.check_invariants()?;
            working.set_version(read_version + 1);

            let result = sqlx::query(
                r#"
                UPDATE order_cycles SET
                    phase = $3,
                    payment_window_started_at = $4,
                    payment_window_ends_at = $5,
                    participants = $6,
                    product_orders = $7,
                    total_participants = $8,
                    total_amount_cents = $9,
                    cancel_reason = $10,
                    confirmed_at = $11,
                    estimated_delivery = $12,
                    next_deadline = $13,
                    version = $14,
                    updated_at = $15
                WHERE id = $1 AND version = $2
                "#,
            )
            .bind(id.as_uuid())
            .bind(read_version as i64)
            .bind(working.phase().as_str())
            .bind(working.payment_window_started_at().map(|t| *t.as_datetime()))
            .bind(working.payment_window_ends_at().map(|t| *t.as_datetime()))
            .bind(to_jsonb(&working.participants(), "participants")?)
            .bind(to_jsonb(&working.product_orders(), "product orders")?)
            .bind(working.total_participants() as i32)
            .bind(working.total_amount_cents())
            .bind(working.cancel_reason())
            .bind(working.confirmed_at().map(|t| *t.as_datetime()))
            .bind(working.estimated_delivery().map(|t| *t.as_datetime()))
            .bind(working.next_deadline().map(|t| *t.as_datetime()))
            .bind(working.version() as i64)
            .bind(working.updated_at().as_datetime())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::StorageFailure,
                    format!("Failed to update cycle: {}", e),
                )
            })?;

            if result.rows_affected() == 1 {
                self.notify(&working);
                return Ok(working);
            }
            // Lost the race; retry against fresh state
        }

        // Conflicts are an internal retry concern; exhaustion surfaces as a
        // generic transient failure.
        Err(DomainError::new(
            ErrorCode::StorageFailure,
            format!(
                "Gave up writing cycle {} after {} contended attempts",
                id, MAX_WRITE_ATTEMPTS
            ),
        ))
    }

    fn subscribe(&self, id: CycleId) -> broadcast::Receiver<OrderCycle> {
        let mut channels = self
            .channels
            .write()
            .expect("PostgresCycleStore: channels lock poisoned");
        channels
            .entry(id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Helper Functions
// ════════════════════════════════════════════════════════════════════════════════

fn to_jsonb<T: serde::Serialize>(value: &T, what: &str) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(value).map_err(|e| {
        DomainError::new(
            ErrorCode::StorageFailure,
            format!("Failed to encode {}: {}", what, e),
        )
    })
}

fn from_jsonb<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
    what: &str,
) -> Result<T, DomainError> {
    serde_json::from_value(value).map_err(|e| {
        DomainError::new(
            ErrorCode::InvalidFormat,
            format!("Failed to decode {}: {}", what, e),
        )
    })
}

fn row_to_cycle(row: sqlx::postgres::PgRow) -> Result<OrderCycle, DomainError> {
    let id: Uuid = row.get("id");
    let group_id: Uuid = row.get("group_id");
    let phase: String = row.get("phase");
    let collecting_started_at: chrono::DateTime<chrono::Utc> = row.get("collecting_started_at");
    let collecting_ends_at: chrono::DateTime<chrono::Utc> = row.get("collecting_ends_at");
    let payment_window_started_at: Option<chrono::DateTime<chrono::Utc>> =
        row.get("payment_window_started_at");
    let payment_window_ends_at: Option<chrono::DateTime<chrono::Utc>> =
        row.get("payment_window_ends_at");
    let participants: Vec<Participant> = from_jsonb(row.get("participants"), "participants")?;
    let product_orders: BTreeMap<ProductId, ProductAggregate> =
        from_jsonb(row.get("product_orders"), "product orders")?;
    let total_participants: i32 = row.get("total_participants");
    let total_amount_cents: i64 = row.get("total_amount_cents");
    let cancel_reason: Option<String> = row.get("cancel_reason");
    let confirmed_at: Option<chrono::DateTime<chrono::Utc>> = row.get("confirmed_at");
    let estimated_delivery: Option<chrono::DateTime<chrono::Utc>> = row.get("estimated_delivery");
    let default_min_quantity: i32 = row.get("default_min_quantity");
    let version: i64 = row.get("version");
    let created_at: chrono::DateTime<chrono::Utc> = row.get("created_at");
    let updated_at: chrono::DateTime<chrono::Utc> = row.get("updated_at");

    OrderCycle::reconstitute(
        CycleId::from_uuid(id),
        GroupId::from_uuid(group_id),
        phase.parse::<CyclePhase>()?,
        Timestamp::from_datetime(collecting_started_at),
        Timestamp::from_datetime(collecting_ends_at),
        payment_window_started_at.map(Timestamp::from_datetime),
        payment_window_ends_at.map(Timestamp::from_datetime),
        participants,
        product_orders,
        total_participants as u32,
        total_amount_cents,
        cancel_reason,
        confirmed_at.map(Timestamp::from_datetime),
        estimated_delivery.map(Timestamp::from_datetime),
        default_min_quantity as u32,
        version as u64,
        Timestamp::from_datetime(created_at),
        Timestamp::from_datetime(updated_at),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cycle::OrderItem;
    use crate::domain::foundation::UserId;

    fn cycle_with_orders() -> OrderCycle {
        let now = Timestamp::now();
        let mut cycle = OrderCycle::start(GroupId::new(), now, now.add_hours(4), 50);
        let item = OrderItem::new(
            ProductId::new("prod-rice").unwrap(),
            "Rice 5kg",
            60,
            250,
            Some(50),
        )
        .unwrap();
        let participant = Participant::new(
            UserId::new("u-alice").unwrap(),
            "Alice",
            "alice@example.com",
            "",
            vec![item],
            now,
        )
        .unwrap();
        cycle.upsert_participant(participant, now).unwrap();
        cycle
    }

    #[test]
    fn participants_round_trip_through_jsonb() {
        let cycle = cycle_with_orders();

        let encoded = to_jsonb(&cycle.participants(), "participants").unwrap();
        let decoded: Vec<Participant> = from_jsonb(encoded, "participants").unwrap();

        assert_eq!(decoded, cycle.participants());
    }

    #[test]
    fn product_orders_round_trip_through_jsonb() {
        let cycle = cycle_with_orders();

        let encoded = to_jsonb(&cycle.product_orders(), "product orders").unwrap();
        let decoded: BTreeMap<ProductId, ProductAggregate> =
            from_jsonb(encoded, "product orders").unwrap();

        assert_eq!(&decoded, cycle.product_orders());
    }

    #[test]
    fn jsonb_decode_failure_reports_invalid_format() {
        let err = from_jsonb::<Vec<Participant>>(
            serde_json::json!({"not": "a participant list"}),
            "participants",
        )
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidFormat);
    }
}
