//! In-memory cycle store.
//!
//! Backs integration tests and single-process development runs. State
//! lives in process memory; nothing survives a restart.
//!
//! The write path deliberately mirrors the SQL adapter's optimistic
//! concurrency: the mutation runs against a snapshot taken outside the
//! write lock, and the commit only lands if the stored version still
//! matches. A lost race re-runs the mutation against fresh state.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

use crate::domain::cycle::OrderCycle;
use crate::domain::foundation::{CycleId, DomainError, ErrorCode, GroupId, Timestamp};
use crate::ports::{CycleStore, Mutator, TxOutcome};

/// How many committed snapshots a slow subscriber may lag behind.
const CHANNEL_CAPACITY: usize = 64;

/// How many lost races a single transact call will absorb before
/// giving up.
const MAX_WRITE_ATTEMPTS: u32 = 5;

/// In-memory implementation of [`CycleStore`].
///
/// # Panics
///
/// Methods panic if an internal lock is poisoned, which only happens
/// after another thread panicked mid-write. Acceptable for tests and
/// development; the production store is the Postgres adapter.
pub struct InMemoryCycleStore {
    cycles: RwLock<HashMap<CycleId, OrderCycle>>,
    channels: RwLock<HashMap<CycleId, broadcast::Sender<OrderCycle>>>,
}

impl InMemoryCycleStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            cycles: RwLock::new(HashMap::new()),
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn notify(&self, cycle: &OrderCycle) {
        let channels = self
            .channels
            .read()
            .expect("InMemoryCycleStore: channels lock poisoned");
        if let Some(sender) = channels.get(&cycle.id()) {
            // A send with no live receivers just drops the snapshot
            let _ = sender.send(cycle.clone());
        }
    }
}

impl Default for InMemoryCycleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CycleStore for InMemoryCycleStore {
    async fn get(&self, id: CycleId) -> Result<Option<OrderCycle>, DomainError> {
        let cycles = self
            .cycles
            .read()
            .expect("InMemoryCycleStore: cycles lock poisoned");
        Ok(cycles.get(&id).cloned())
    }

    async fn insert(&self, cycle: OrderCycle) -> Result<(), DomainError> {
        let mut cycles = self
            .cycles
            .write()
            .expect("InMemoryCycleStore: cycles lock poisoned");
        if let Some(open) = cycles
            .values()
            .find(|c| c.group_id() == cycle.group_id() && c.phase().is_open())
        {
            return Err(DomainError::new(
                ErrorCode::OpenCycleExists,
                format!(
                    "Group {} already has open cycle {}",
                    cycle.group_id(),
                    open.id()
                ),
            ));
        }
        cycles.insert(cycle.id(), cycle);
        Ok(())
    }

    async fn find_open_by_group(
        &self,
        group_id: GroupId,
    ) -> Result<Option<OrderCycle>, DomainError> {
        let cycles = self
            .cycles
            .read()
            .expect("InMemoryCycleStore: cycles lock poisoned");
        Ok(cycles
            .values()
            .find(|c| c.group_id() == group_id && c.phase().is_open())
            .cloned())
    }

    async fn list_due(&self, now: Timestamp, limit: u32) -> Result<Vec<OrderCycle>, DomainError> {
        let cycles = self
            .cycles
            .read()
            .expect("InMemoryCycleStore: cycles lock poisoned");
        let mut due: Vec<OrderCycle> = cycles.values().filter(|c| c.is_due(now)).cloned().collect();
        // Oldest deadline first, so a backlog drains in deadline order
        due.sort_by_key(|c| c.next_deadline());
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn transact(&self, id: CycleId, mutate: Mutator<'_>) -> Result<OrderCycle, DomainError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut working = {
                let cycles = self
                    .cycles
                    .read()
                    .expect("InMemoryCycleStore: cycles lock poisoned");
                cycles.get(&id).cloned().ok_or_else(|| {
                    DomainError::new(ErrorCode::CycleNotFound, format!("Cycle {} not found", id))
                })?
            };
            let read_version = working.version();

            if mutate(&mut working)? == TxOutcome::Noop {
                return Ok(working);
            }
            working.check_invariants()?;

            let committed = {
                let mut cycles = self
                    .cycles
                    .write()
                    .expect("InMemoryCycleStore: cycles lock poisoned");
                match cycles.get_mut(&id) {
                    Some(stored) if stored.version() == read_version => {
                        working.set_version(read_version + 1);
                        *stored = working.clone();
                        Some(working)
                    }
                    // Lost the race; retry against fresh state
                    Some(_) => None,
                    None => {
                        return Err(DomainError::new(
                            ErrorCode::CycleNotFound,
                            format!("Cycle {} not found", id),
                        ))
                    }
                }
            };

            if let Some(cycle) = committed {
                self.notify(&cycle);
                return Ok(cycle);
            }
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
            .expect("InMemoryCycleStore: channels lock poisoned");
        channels
            .entry(id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cycle::{OrderItem, Participant};
    use crate::domain::foundation::{CyclePhase, ProductId, UserId};
    use std::sync::Arc;

    fn open_cycle(group_id: GroupId) -> OrderCycle {
        let now = Timestamp::now();
        OrderCycle::start(group_id, now, now.add_hours(4), 50)
    }

    fn due_cycle(group_id: GroupId, hours_overdue: i64) -> OrderCycle {
        let started = Timestamp::now().add_hours(-4 - hours_overdue);
        OrderCycle::start(group_id, started, started.add_hours(4), 50)
    }

    fn participant(user: &str, quantity: u32, joined_at: Timestamp) -> Participant {
        let item = OrderItem::new(
            ProductId::new("prod-rice").unwrap(),
            "Rice 5kg",
            quantity,
            250,
            Some(50),
        )
        .unwrap();
        Participant::new(
            UserId::new(user).unwrap(),
            user.to_string(),
            format!("{}@example.com", user),
            "",
            vec![item],
            joined_at,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn insert_then_get_roundtrips() {
        let store = InMemoryCycleStore::new();
        let cycle = open_cycle(GroupId::new());
        let id = cycle.id();

        store.insert(cycle).await.unwrap();

        let loaded = store.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.id(), id);
        assert_eq!(loaded.phase(), CyclePhase::Collecting);
    }

    #[tokio::test]
    async fn get_unknown_returns_none() {
        let store = InMemoryCycleStore::new();
        assert!(store.get(CycleId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_rejects_second_open_cycle_for_group() {
        let store = InMemoryCycleStore::new();
        let group_id = GroupId::new();

        store.insert(open_cycle(group_id)).await.unwrap();
        let err = store.insert(open_cycle(group_id)).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::OpenCycleExists);
    }

    #[tokio::test]
    async fn insert_allows_new_cycle_once_previous_closed() {
        let store = InMemoryCycleStore::new();
        let group_id = GroupId::new();

        // An empty cycle cancels when its collecting window closes
        let mut finished = open_cycle(group_id);
        let ends = finished.collecting_ends_at();
        finished.close_collecting(ends, ends.add_hours(4)).unwrap();
        assert_eq!(finished.phase(), CyclePhase::Cancelled);
        store.insert(finished).await.unwrap();

        store.insert(open_cycle(group_id)).await.unwrap();
    }

    #[tokio::test]
    async fn find_open_by_group_skips_other_groups_and_closed_cycles() {
        let store = InMemoryCycleStore::new();
        let group_id = GroupId::new();

        let mut cancelled = open_cycle(group_id);
        let ends = cancelled.collecting_ends_at();
        cancelled.close_collecting(ends, ends.add_hours(4)).unwrap();
        store.insert(cancelled).await.unwrap();
        store.insert(open_cycle(GroupId::new())).await.unwrap();

        assert!(store.find_open_by_group(group_id).await.unwrap().is_none());

        let open = open_cycle(group_id);
        let open_id = open.id();
        store.insert(open).await.unwrap();

        let found = store.find_open_by_group(group_id).await.unwrap().unwrap();
        assert_eq!(found.id(), open_id);
    }

    #[tokio::test]
    async fn list_due_orders_by_deadline_and_respects_limit() {
        let store = InMemoryCycleStore::new();
        let oldest = due_cycle(GroupId::new(), 3);
        let middle = due_cycle(GroupId::new(), 2);
        let newest = due_cycle(GroupId::new(), 1);
        let oldest_id = oldest.id();
        let middle_id = middle.id();
        store.insert(newest).await.unwrap();
        store.insert(oldest).await.unwrap();
        store.insert(middle).await.unwrap();
        // Not yet due
        store.insert(open_cycle(GroupId::new())).await.unwrap();

        let due = store.list_due(Timestamp::now(), 2).await.unwrap();

        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id(), oldest_id);
        assert_eq!(due[1].id(), middle_id);
    }

    #[tokio::test]
    async fn transact_commits_and_bumps_version() {
        let store = InMemoryCycleStore::new();
        let cycle = open_cycle(GroupId::new());
        let id = cycle.id();
        let joined_at = cycle.collecting_started_at();
        store.insert(cycle).await.unwrap();

        let committed = store
            .transact(id, &mut |cycle| {
                cycle.upsert_participant(participant("alice", 30, joined_at), joined_at)?;
                Ok(TxOutcome::Commit)
            })
            .await
            .unwrap();

        assert_eq!(committed.version(), 1);
        assert_eq!(committed.total_participants(), 1);
        assert_eq!(store.get(id).await.unwrap().unwrap().version(), 1);
    }

    #[tokio::test]
    async fn transact_noop_leaves_version_untouched() {
        let store = InMemoryCycleStore::new();
        let cycle = open_cycle(GroupId::new());
        let id = cycle.id();
        store.insert(cycle).await.unwrap();

        let result = store.transact(id, &mut |_| Ok(TxOutcome::Noop)).await.unwrap();

        assert_eq!(result.version(), 0);
        assert_eq!(store.get(id).await.unwrap().unwrap().version(), 0);
    }

    #[tokio::test]
    async fn transact_propagates_mutation_errors_without_committing() {
        let store = InMemoryCycleStore::new();
        let cycle = open_cycle(GroupId::new());
        let id = cycle.id();
        store.insert(cycle).await.unwrap();

        let err = store
            .transact(id, &mut |_| {
                Err(DomainError::new(ErrorCode::WindowClosed, "Closed"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::WindowClosed);
        assert_eq!(store.get(id).await.unwrap().unwrap().version(), 0);
    }

    #[tokio::test]
    async fn transact_rejects_a_mutation_that_breaks_invariants() {
        let store = InMemoryCycleStore::new();
        let cycle = open_cycle(GroupId::new());
        let id = cycle.id();
        store.insert(cycle).await.unwrap();

        let err = store
            .transact(id, &mut |cycle| {
                // Claims participants it does not have
                let broken = OrderCycle::reconstitute(
                    cycle.id(),
                    cycle.group_id(),
                    cycle.phase(),
                    cycle.collecting_started_at(),
                    cycle.collecting_ends_at(),
                    None,
                    None,
                    Vec::new(),
                    std::collections::BTreeMap::new(),
                    5,
                    0,
                    None,
                    None,
                    None,
                    50,
                    cycle.version(),
                    cycle.created_at(),
                    cycle.updated_at(),
                )?;
                *cycle = broken;
                Ok(TxOutcome::Commit)
            })
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::InvariantViolation);
        assert_eq!(store.get(id).await.unwrap().unwrap().version(), 0);
    }

    #[tokio::test]
    async fn transact_unknown_cycle_fails() {
        let store = InMemoryCycleStore::new();
        let err = store
            .transact(CycleId::new(), &mut |_| Ok(TxOutcome::Commit))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CycleNotFound);
    }

    #[tokio::test]
    async fn subscriber_receives_committed_snapshots() {
        let store = InMemoryCycleStore::new();
        let cycle = open_cycle(GroupId::new());
        let id = cycle.id();
        let joined_at = cycle.collecting_started_at();
        store.insert(cycle).await.unwrap();

        let mut updates = store.subscribe(id);

        store
            .transact(id, &mut |cycle| {
                cycle.upsert_participant(participant("alice", 30, joined_at), joined_at)?;
                Ok(TxOutcome::Commit)
            })
            .await
            .unwrap();

        let snapshot = updates.recv().await.unwrap();
        assert_eq!(snapshot.total_participants(), 1);
        assert_eq!(snapshot.version(), 1);
    }

    #[tokio::test]
    async fn noop_does_not_notify_subscribers() {
        let store = InMemoryCycleStore::new();
        let cycle = open_cycle(GroupId::new());
        let id = cycle.id();
        store.insert(cycle).await.unwrap();

        let mut updates = store.subscribe(id);
        store.transact(id, &mut |_| Ok(TxOutcome::Noop)).await.unwrap();

        assert!(matches!(
            updates.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transacts_all_land() {
        let store = Arc::new(InMemoryCycleStore::new());
        let cycle = open_cycle(GroupId::new());
        let id = cycle.id();
        let joined_at = cycle.collecting_started_at();
        store.insert(cycle).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let user = format!("user-{}", i);
                store
                    .transact(id, &mut |cycle| {
                        cycle.upsert_participant(participant(&user, 10, joined_at), joined_at)?;
                        Ok(TxOutcome::Commit)
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let final_state = store.get(id).await.unwrap().unwrap();
        assert_eq!(final_state.total_participants(), 4);
        assert_eq!(final_state.version(), 4);
    }
}
