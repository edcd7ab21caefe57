//! ClosePaymentWindowHandler - Command handler for ending the payment window.
//!
//! Invoked by the deadline worker when a payment window lapses. The close
//! commits first; suspensions for payment defaulters and the group pointer
//! update run afterward, each tolerating per-user failure so one bad write
//! cannot leave the cycle half-closed.

use std::sync::Arc;

use tracing::warn;

use crate::config::CycleConfig;
use crate::domain::cycle::{OrderCycle, PaymentOutcome};
use crate::domain::foundation::{CycleId, CyclePhase, DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::suspension::SuspensionRecord;
use crate::ports::{CycleStore, GroupDirectory, SuspensionStore, TxOutcome};

/// Command to close a cycle's payment window.
#[derive(Debug, Clone)]
pub struct ClosePaymentWindowCommand {
    /// Cycle to close.
    pub cycle_id: CycleId,
}

/// Result of a payment-window close.
#[derive(Debug, Clone)]
pub struct ClosePaymentWindowResult {
    /// The cycle as committed.
    pub cycle: OrderCycle,
    /// What the close decided; `None` when the cycle had already moved on.
    pub outcome: Option<PaymentOutcome>,
    /// Delinquents successfully suspended. Failures are logged, not fatal.
    pub suspended: Vec<UserId>,
}

/// Error type for payment-window close.
#[derive(Debug)]
pub enum ClosePaymentWindowError {
    /// Cycle not found.
    CycleNotFound(CycleId),
    /// Domain error.
    Domain(DomainError),
}

impl std::fmt::Display for ClosePaymentWindowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClosePaymentWindowError::CycleNotFound(id) => write!(f, "Cycle not found: {}", id),
            ClosePaymentWindowError::Domain(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ClosePaymentWindowError {}

impl From<DomainError> for ClosePaymentWindowError {
    fn from(err: DomainError) -> Self {
        ClosePaymentWindowError::Domain(err)
    }
}

/// Handler for closing payment windows.
pub struct ClosePaymentWindowHandler {
    cycle_store: Arc<dyn CycleStore>,
    suspension_store: Arc<dyn SuspensionStore>,
    group_directory: Arc<dyn GroupDirectory>,
    config: CycleConfig,
}

impl ClosePaymentWindowHandler {
    pub fn new(
        cycle_store: Arc<dyn CycleStore>,
        suspension_store: Arc<dyn SuspensionStore>,
        group_directory: Arc<dyn GroupDirectory>,
        config: CycleConfig,
    ) -> Self {
        Self {
            cycle_store,
            suspension_store,
            group_directory,
            config,
        }
    }

    pub async fn handle(
        &self,
        cmd: ClosePaymentWindowCommand,
    ) -> Result<ClosePaymentWindowResult, ClosePaymentWindowError> {
        let now = Timestamp::now();
        let estimated_delivery = now.add_hours(i64::from(self.config.delivery_lead_hours));

        // 1. Close under CAS. The closure may re-run, so the captured
        //    outcome is overwritten on every attempt.
        let mut outcome: Option<PaymentOutcome> = None;
        let committed = self
            .cycle_store
            .transact(cmd.cycle_id, &mut |cycle| {
                if cycle.phase() != CyclePhase::PaymentWindow {
                    outcome = None;
                    return Ok(TxOutcome::Noop);
                }
                outcome = Some(cycle.close_payment_window(now, estimated_delivery)?);
                Ok(TxOutcome::Commit)
            })
            .await
            .map_err(|err| match err.code {
                ErrorCode::CycleNotFound => ClosePaymentWindowError::CycleNotFound(cmd.cycle_id),
                _ => ClosePaymentWindowError::from(err),
            })?;

        // 2. Suspend every payment defaulter. Each suspension stands alone;
        //    a failed write is logged and the rest proceed.
        let delinquents: Vec<UserId> = outcome
            .as_ref()
            .map(|o| o.delinquents().to_vec())
            .unwrap_or_default();

        let results = futures::future::join_all(
            delinquents
                .iter()
                .map(|user_id| self.suspend_user(user_id, cmd.cycle_id, now)),
        )
        .await;

        let mut suspended = Vec::new();
        for (user_id, result) in delinquents.iter().zip(results) {
            match result {
                Ok(()) => suspended.push(user_id.clone()),
                Err(err) => warn!(
                    user_id = %user_id,
                    cycle_id = %cmd.cycle_id,
                    error = %err,
                    "Failed to suspend delinquent participant"
                ),
            }
        }

        // 3. A cancelled cycle releases the group; a confirmed one stays
        //    current until fulfillment completes.
        if matches!(outcome, Some(PaymentOutcome::Cancelled { .. })) {
            if let Err(err) = self
                .group_directory
                .set_current_cycle(committed.group_id(), None)
                .await
            {
                warn!(
                    cycle_id = %cmd.cycle_id,
                    error = %err,
                    "Failed to clear group cycle pointer after cancellation"
                );
            }
        }

        Ok(ClosePaymentWindowResult {
            cycle: committed,
            outcome,
            suspended,
        })
    }

    /// Creates or extends a user's suspension and appends the audit entry.
    async fn suspend_user(
        &self,
        user_id: &UserId,
        cycle_id: CycleId,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let until = now.add_days(i64::from(self.config.suspension_days));
        let reason = format!("Payment default in cycle {}", cycle_id);

        let record = match self.suspension_store.get(user_id).await? {
            Some(mut existing) => {
                existing.extend(reason, now, until);
                existing
            }
            None => SuspensionRecord::new(user_id.clone(), reason, now, until),
        };

        let audit = record.audit_entry();
        self.suspension_store.upsert(record).await?;
        self.suspension_store.append_audit(audit).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cycle::{OrderItem, Participant, CANCEL_REASON_NO_PAYMENTS};
    use crate::domain::foundation::{GroupId, PaymentStatus, ProductId};
    use crate::domain::suspension::SuspensionAudit;
    use crate::ports::Mutator;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    // ─────────────────────────────────────────────────────────────────────
    // Mock implementations
    // ─────────────────────────────────────────────────────────────────────

    struct MockCycleStore {
        cycles: Mutex<HashMap<CycleId, OrderCycle>>,
    }

    impl MockCycleStore {
        fn with_cycle(cycle: OrderCycle) -> Self {
            let mut cycles = HashMap::new();
            cycles.insert(cycle.id(), cycle);
            Self {
                cycles: Mutex::new(cycles),
            }
        }
    }

    #[async_trait]
    impl CycleStore for MockCycleStore {
        async fn get(&self, id: CycleId) -> Result<Option<OrderCycle>, DomainError> {
            Ok(self.cycles.lock().unwrap().get(&id).cloned())
        }

        async fn insert(&self, cycle: OrderCycle) -> Result<(), DomainError> {
            self.cycles.lock().unwrap().insert(cycle.id(), cycle);
            Ok(())
        }

        async fn find_open_by_group(
            &self,
            _group_id: GroupId,
        ) -> Result<Option<OrderCycle>, DomainError> {
            Ok(None)
        }

        async fn list_due(
            &self,
            _now: Timestamp,
            _limit: u32,
        ) -> Result<Vec<OrderCycle>, DomainError> {
            Ok(vec![])
        }

        async fn transact(
            &self,
            id: CycleId,
            mutate: Mutator<'_>,
        ) -> Result<OrderCycle, DomainError> {
            let mut cycles = self.cycles.lock().unwrap();
            let cycle = cycles
                .get_mut(&id)
                .ok_or_else(|| DomainError::new(ErrorCode::CycleNotFound, "Cycle not found"))?;
            if mutate(cycle)? == TxOutcome::Commit {
                let next = cycle.version() + 1;
                cycle.set_version(next);
            }
            Ok(cycle.clone())
        }

        fn subscribe(&self, _id: CycleId) -> broadcast::Receiver<OrderCycle> {
            broadcast::channel(8).1
        }
    }

    struct MockSuspensionStore {
        records: Mutex<HashMap<UserId, SuspensionRecord>>,
        audits: Mutex<Vec<SuspensionAudit>>,
        fail_for: Option<UserId>,
    }

    impl MockSuspensionStore {
        fn empty() -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
                audits: Mutex::new(Vec::new()),
                fail_for: None,
            }
        }

        fn failing_for(user_id: UserId) -> Self {
            Self {
                fail_for: Some(user_id),
                ..Self::empty()
            }
        }

        fn seeded(record: SuspensionRecord) -> Self {
            let store = Self::empty();
            store
                .records
                .lock()
                .unwrap()
                .insert(record.user_id().clone(), record);
            store
        }

        fn record(&self, user_id: &UserId) -> Option<SuspensionRecord> {
            self.records.lock().unwrap().get(user_id).cloned()
        }

        fn audit_count(&self) -> usize {
            self.audits.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SuspensionStore for MockSuspensionStore {
        async fn get(&self, user_id: &UserId) -> Result<Option<SuspensionRecord>, DomainError> {
            Ok(self.records.lock().unwrap().get(user_id).cloned())
        }

        async fn upsert(&self, record: SuspensionRecord) -> Result<(), DomainError> {
            if self.fail_for.as_ref() == Some(record.user_id()) {
                return Err(DomainError::new(
                    ErrorCode::StorageFailure,
                    "Simulated suspension write failure",
                ));
            }
            self.records
                .lock()
                .unwrap()
                .insert(record.user_id().clone(), record);
            Ok(())
        }

        async fn clear(&self, user_id: &UserId) -> Result<(), DomainError> {
            self.records.lock().unwrap().remove(user_id);
            Ok(())
        }

        async fn append_audit(&self, entry: SuspensionAudit) -> Result<(), DomainError> {
            self.audits.lock().unwrap().push(entry);
            Ok(())
        }

        async fn audit_for_user(
            &self,
            user_id: &UserId,
        ) -> Result<Vec<SuspensionAudit>, DomainError> {
            Ok(self
                .audits
                .lock()
                .unwrap()
                .iter()
                .filter(|a| &a.user_id == user_id)
                .cloned()
                .collect())
        }
    }

    struct MockGroupDirectory {
        pointers: Mutex<HashMap<GroupId, CycleId>>,
    }

    impl MockGroupDirectory {
        fn pointing_at(group_id: GroupId, cycle_id: CycleId) -> Self {
            let mut pointers = HashMap::new();
            pointers.insert(group_id, cycle_id);
            Self {
                pointers: Mutex::new(pointers),
            }
        }

        fn pointer(&self, group_id: GroupId) -> Option<CycleId> {
            self.pointers.lock().unwrap().get(&group_id).copied()
        }
    }

    #[async_trait]
    impl GroupDirectory for MockGroupDirectory {
        async fn members(&self, _group_id: GroupId) -> Result<Option<Vec<UserId>>, DomainError> {
            Ok(Some(vec![]))
        }

        async fn current_cycle(&self, group_id: GroupId) -> Result<Option<CycleId>, DomainError> {
            Ok(self.pointers.lock().unwrap().get(&group_id).copied())
        }

        async fn set_current_cycle(
            &self,
            group_id: GroupId,
            cycle_id: Option<CycleId>,
        ) -> Result<(), DomainError> {
            let mut pointers = self.pointers.lock().unwrap();
            match cycle_id {
                Some(id) => {
                    pointers.insert(group_id, id);
                }
                None => {
                    pointers.remove(&group_id);
                }
            }
            Ok(())
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Test helpers
    // ─────────────────────────────────────────────────────────────────────

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    fn rice_item(quantity: u32) -> OrderItem {
        OrderItem::new(
            ProductId::new("prod-rice").unwrap(),
            "Rice 5kg",
            quantity,
            250,
            Some(50),
        )
        .unwrap()
    }

    /// Cycle in payment window with alice (30), bob (25) and carol (10),
    /// where only the listed `payers` have paid.
    fn cycle_awaiting_close(payers: &[&str]) -> OrderCycle {
        let start = Timestamp::now().add_hours(-9);
        let mut cycle = OrderCycle::start(GroupId::new(), start, start.add_hours(4), 50);
        for (name, quantity) in [("alice", 30), ("bob", 25), ("carol", 10)] {
            let participant = Participant::new(
                user(name),
                name.to_string(),
                format!("{}@example.com", name),
                "",
                vec![rice_item(quantity)],
                start,
            )
            .unwrap();
            cycle.upsert_participant(participant, start).unwrap();
        }
        cycle
            .close_collecting(start.add_hours(4), start.add_hours(8))
            .unwrap();
        for name in payers {
            cycle
                .record_payment(&user(name), PaymentStatus::Paid, start.add_hours(5))
                .unwrap();
        }
        cycle
    }

    struct Fixture {
        handler: ClosePaymentWindowHandler,
        suspensions: Arc<MockSuspensionStore>,
        directory: Arc<MockGroupDirectory>,
        cycle_id: CycleId,
        group_id: GroupId,
    }

    fn fixture_with(cycle: OrderCycle, suspensions: MockSuspensionStore) -> Fixture {
        let cycle_id = cycle.id();
        let group_id = cycle.group_id();
        let suspensions = Arc::new(suspensions);
        let directory = Arc::new(MockGroupDirectory::pointing_at(group_id, cycle_id));
        let handler = ClosePaymentWindowHandler::new(
            Arc::new(MockCycleStore::with_cycle(cycle)),
            suspensions.clone(),
            directory.clone(),
            CycleConfig::default(),
        );
        Fixture {
            handler,
            suspensions,
            directory,
            cycle_id,
            group_id,
        }
    }

    fn fixture(cycle: OrderCycle) -> Fixture {
        fixture_with(cycle, MockSuspensionStore::empty())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tests
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn confirms_with_paid_participants_only() {
        let fx = fixture(cycle_awaiting_close(&["alice", "bob"]));

        let result = fx
            .handler
            .handle(ClosePaymentWindowCommand {
                cycle_id: fx.cycle_id,
            })
            .await
            .unwrap();

        assert_eq!(result.cycle.phase(), CyclePhase::Confirmed);
        assert_eq!(result.cycle.total_participants(), 2);
        assert!(result.cycle.participant(&user("carol")).is_none());
        assert!(result.cycle.estimated_delivery().is_some());
        // confirmed cycle remains the group's current cycle
        assert_eq!(fx.directory.pointer(fx.group_id), Some(fx.cycle_id));
    }

    #[tokio::test]
    async fn suspends_delinquents_on_confirmation() {
        let fx = fixture(cycle_awaiting_close(&["alice", "bob"]));

        let result = fx
            .handler
            .handle(ClosePaymentWindowCommand {
                cycle_id: fx.cycle_id,
            })
            .await
            .unwrap();

        assert_eq!(result.suspended, vec![user("carol")]);
        let record = fx.suspensions.record(&user("carol")).unwrap();
        assert_eq!(record.suspension_count(), 1);
        assert!(record.is_active(Timestamp::now()));
        assert_eq!(fx.suspensions.audit_count(), 1);
    }

    #[tokio::test]
    async fn cancels_and_suspends_everyone_when_nobody_paid() {
        let fx = fixture(cycle_awaiting_close(&[]));

        let result = fx
            .handler
            .handle(ClosePaymentWindowCommand {
                cycle_id: fx.cycle_id,
            })
            .await
            .unwrap();

        assert_eq!(result.cycle.phase(), CyclePhase::Cancelled);
        assert_eq!(result.cycle.cancel_reason(), Some(CANCEL_REASON_NO_PAYMENTS));
        assert_eq!(result.suspended.len(), 3);
        assert!(fx.directory.pointer(fx.group_id).is_none());
    }

    #[tokio::test]
    async fn repeat_default_extends_existing_suspension() {
        let earlier = Timestamp::now().add_days(-30);
        let existing = SuspensionRecord::new(
            user("carol"),
            "Payment default in cycle 0",
            earlier,
            earlier.add_days(3),
        );
        let fx = fixture_with(
            cycle_awaiting_close(&["alice", "bob"]),
            MockSuspensionStore::seeded(existing),
        );

        fx.handler
            .handle(ClosePaymentWindowCommand {
                cycle_id: fx.cycle_id,
            })
            .await
            .unwrap();

        let record = fx.suspensions.record(&user("carol")).unwrap();
        assert_eq!(record.suspension_count(), 2);
        assert!(record.is_active(Timestamp::now()));
    }

    #[tokio::test]
    async fn one_failed_suspension_does_not_block_others() {
        let fx = fixture_with(
            cycle_awaiting_close(&["alice"]),
            MockSuspensionStore::failing_for(user("bob")),
        );

        let result = fx
            .handler
            .handle(ClosePaymentWindowCommand {
                cycle_id: fx.cycle_id,
            })
            .await
            .unwrap();

        // close still succeeded and carol's suspension landed
        assert_eq!(result.cycle.phase(), CyclePhase::Confirmed);
        assert_eq!(result.suspended, vec![user("carol")]);
        assert!(fx.suspensions.record(&user("bob")).is_none());
        assert!(fx.suspensions.record(&user("carol")).is_some());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let fx = fixture(cycle_awaiting_close(&["alice"]));

        let first = fx
            .handler
            .handle(ClosePaymentWindowCommand {
                cycle_id: fx.cycle_id,
            })
            .await
            .unwrap();
        let second = fx
            .handler
            .handle(ClosePaymentWindowCommand {
                cycle_id: fx.cycle_id,
            })
            .await
            .unwrap();

        assert!(first.outcome.is_some());
        assert!(second.outcome.is_none());
        assert!(second.suspended.is_empty());
        // no double suspension for the original delinquents
        assert_eq!(
            fx.suspensions
                .record(&user("bob"))
                .unwrap()
                .suspension_count(),
            1
        );
    }

    #[tokio::test]
    async fn fails_for_unknown_cycle() {
        let fx = fixture(cycle_awaiting_close(&["alice"]));

        let result = fx
            .handler
            .handle(ClosePaymentWindowCommand {
                cycle_id: CycleId::new(),
            })
            .await;

        assert!(matches!(
            result,
            Err(ClosePaymentWindowError::CycleNotFound(_))
        ));
    }
}
