//! PlaceOrderHandler - Command handler for joining a cycle with an order.
//!
//! Placing an order upserts the caller's participant entry: ordering again
//! while the cycle is still collecting replaces the previous order.

use std::sync::Arc;

use crate::domain::cycle::{OrderCycle, OrderItem, Participant};
use crate::domain::foundation::{
    CycleId, DomainError, ErrorCode, ProductId, Timestamp, UserId,
};
use crate::ports::{CycleStore, GroupDirectory, SuspensionStore, TxOutcome};

/// One requested product line, as submitted by the caller.
#[derive(Debug, Clone)]
pub struct OrderLine {
    /// Product identifier.
    pub product_id: String,
    /// Display name for the product.
    pub product_name: String,
    /// Units requested; must be positive.
    pub quantity: u32,
    /// Unit price in cents, locked for this cycle at order time.
    pub unit_price_cents: i64,
    /// Product-specific minimum; falls back to the cycle default when absent.
    pub min_quantity: Option<u32>,
}

/// Command to place (or replace) a user's order in a cycle.
#[derive(Debug, Clone)]
pub struct PlaceOrderCommand {
    /// Cycle to order in.
    pub cycle_id: CycleId,
    /// Ordering user.
    pub user_id: UserId,
    /// Contact snapshot captured with the order.
    pub user_name: String,
    pub user_email: String,
    pub user_phone: String,
    /// Requested product lines; must be non-empty.
    pub items: Vec<OrderLine>,
}

/// Result of successfully placing an order.
#[derive(Debug, Clone)]
pub struct PlaceOrderResult {
    /// The cycle as committed, rollups already refreshed.
    pub cycle: OrderCycle,
}

/// Error type for order placement.
#[derive(Debug)]
pub enum PlaceOrderError {
    /// Cycle not found.
    CycleNotFound(CycleId),
    /// The user is suspended for a previous payment default.
    UserSuspended {
        user_id: UserId,
        until: Timestamp,
    },
    /// The user does not belong to the cycle's group.
    NotGroupMember(UserId),
    /// The collecting window is closed.
    WindowClosed,
    /// Domain error.
    Domain(DomainError),
}

impl std::fmt::Display for PlaceOrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaceOrderError::CycleNotFound(id) => write!(f, "Cycle not found: {}", id),
            PlaceOrderError::UserSuspended { user_id, until } => {
                write!(f, "User {} is suspended until {}", user_id, until)
            }
            PlaceOrderError::NotGroupMember(user_id) => {
                write!(f, "User {} is not a member of this group", user_id)
            }
            PlaceOrderError::WindowClosed => write!(f, "Order collection has closed"),
            PlaceOrderError::Domain(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for PlaceOrderError {}

impl From<DomainError> for PlaceOrderError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::WindowClosed => PlaceOrderError::WindowClosed,
            _ => PlaceOrderError::Domain(err),
        }
    }
}

/// Handler for placing orders.
pub struct PlaceOrderHandler {
    cycle_store: Arc<dyn CycleStore>,
    suspension_store: Arc<dyn SuspensionStore>,
    group_directory: Arc<dyn GroupDirectory>,
}

impl PlaceOrderHandler {
    pub fn new(
        cycle_store: Arc<dyn CycleStore>,
        suspension_store: Arc<dyn SuspensionStore>,
        group_directory: Arc<dyn GroupDirectory>,
    ) -> Self {
        Self {
            cycle_store,
            suspension_store,
            group_directory,
        }
    }

    pub async fn handle(
        &self,
        cmd: PlaceOrderCommand,
    ) -> Result<PlaceOrderResult, PlaceOrderError> {
        let now = Timestamp::now();

        // 1. Load the cycle (also resolves the group for the membership check)
        let cycle = self
            .cycle_store
            .get(cmd.cycle_id)
            .await?
            .ok_or(PlaceOrderError::CycleNotFound(cmd.cycle_id))?;

        // 2. Suspended users cannot order; a lapsed record is dropped (lazy expiry)
        if let Some(record) = self.suspension_store.get(&cmd.user_id).await? {
            if record.is_active(now) {
                return Err(PlaceOrderError::UserSuspended {
                    user_id: cmd.user_id,
                    until: record.suspended_until(),
                });
            }
            self.suspension_store.clear(&cmd.user_id).await?;
        }

        // 3. Only group members can order
        let members = self
            .group_directory
            .members(cycle.group_id())
            .await?
            .ok_or_else(|| {
                DomainError::new(ErrorCode::GroupNotFound, "Cycle's group no longer exists")
            })?;
        if !members.contains(&cmd.user_id) {
            return Err(PlaceOrderError::NotGroupMember(cmd.user_id));
        }

        // 4. Validate the requested lines into domain items
        let mut items = Vec::with_capacity(cmd.items.len());
        for line in &cmd.items {
            let product_id = ProductId::new(&line.product_id).map_err(DomainError::from)?;
            let item = OrderItem::new(
                product_id,
                line.product_name.clone(),
                line.quantity,
                line.unit_price_cents,
                line.min_quantity,
            )
            .map_err(DomainError::from)?;
            items.push(item);
        }

        let participant = Participant::new(
            cmd.user_id.clone(),
            cmd.user_name.clone(),
            cmd.user_email.clone(),
            cmd.user_phone.clone(),
            items,
            now,
        )
        .map_err(DomainError::from)?;

        // 5. Upsert under CAS; the aggregate re-checks phase and deadline
        let committed = self
            .cycle_store
            .transact(cmd.cycle_id, &mut |cycle| {
                cycle.upsert_participant(participant.clone(), now)?;
                Ok(TxOutcome::Commit)
            })
            .await?;

        Ok(PlaceOrderResult { cycle: committed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{GroupId, PaymentStatus};
    use crate::domain::suspension::{SuspensionAudit, SuspensionRecord};
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

        fn stored(&self, id: CycleId) -> Option<OrderCycle> {
            self.cycles.lock().unwrap().get(&id).cloned()
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
    }

    impl MockSuspensionStore {
        fn empty() -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
            }
        }

        fn with_record(record: SuspensionRecord) -> Self {
            let store = Self::empty();
            store
                .records
                .lock()
                .unwrap()
                .insert(record.user_id().clone(), record);
            store
        }
    }

    #[async_trait]
    impl SuspensionStore for MockSuspensionStore {
        async fn get(&self, user_id: &UserId) -> Result<Option<SuspensionRecord>, DomainError> {
            Ok(self.records.lock().unwrap().get(user_id).cloned())
        }

        async fn upsert(&self, record: SuspensionRecord) -> Result<(), DomainError> {
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

        async fn append_audit(&self, _entry: SuspensionAudit) -> Result<(), DomainError> {
            Ok(())
        }

        async fn audit_for_user(
            &self,
            _user_id: &UserId,
        ) -> Result<Vec<SuspensionAudit>, DomainError> {
            Ok(vec![])
        }
    }

    struct MockGroupDirectory {
        groups: Mutex<HashMap<GroupId, Vec<UserId>>>,
    }

    impl MockGroupDirectory {
        fn with_members(group_id: GroupId, members: Vec<UserId>) -> Self {
            let mut groups = HashMap::new();
            groups.insert(group_id, members);
            Self {
                groups: Mutex::new(groups),
            }
        }
    }

    #[async_trait]
    impl GroupDirectory for MockGroupDirectory {
        async fn members(&self, group_id: GroupId) -> Result<Option<Vec<UserId>>, DomainError> {
            Ok(self.groups.lock().unwrap().get(&group_id).cloned())
        }

        async fn current_cycle(&self, _group_id: GroupId) -> Result<Option<CycleId>, DomainError> {
            Ok(None)
        }

        async fn set_current_cycle(
            &self,
            _group_id: GroupId,
            _cycle_id: Option<CycleId>,
        ) -> Result<(), DomainError> {
            Ok(())
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Test helpers
    // ─────────────────────────────────────────────────────────────────────

    fn alice() -> UserId {
        UserId::new("alice").unwrap()
    }

    fn rice_line(quantity: u32) -> OrderLine {
        OrderLine {
            product_id: "prod-rice".to_string(),
            product_name: "Rice 5kg".to_string(),
            quantity,
            unit_price_cents: 250,
            min_quantity: Some(50),
        }
    }

    fn order_command(cycle_id: CycleId, user: &UserId, lines: Vec<OrderLine>) -> PlaceOrderCommand {
        PlaceOrderCommand {
            cycle_id,
            user_id: user.clone(),
            user_name: "Alice".to_string(),
            user_email: "alice@example.com".to_string(),
            user_phone: "+1-555-0100".to_string(),
            items: lines,
        }
    }

    struct Fixture {
        handler: PlaceOrderHandler,
        store: Arc<MockCycleStore>,
        suspensions: Arc<MockSuspensionStore>,
        cycle_id: CycleId,
    }

    fn fixture_with(suspensions: MockSuspensionStore, members: Vec<UserId>) -> Fixture {
        let group_id = GroupId::new();
        let now = Timestamp::now();
        let cycle = OrderCycle::start(group_id, now, now.add_hours(4), 50);
        let cycle_id = cycle.id();

        let store = Arc::new(MockCycleStore::with_cycle(cycle));
        let suspensions = Arc::new(suspensions);
        let handler = PlaceOrderHandler::new(
            store.clone(),
            suspensions.clone(),
            Arc::new(MockGroupDirectory::with_members(group_id, members)),
        );

        Fixture {
            handler,
            store,
            suspensions,
            cycle_id,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockSuspensionStore::empty(), vec![alice()])
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tests
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn places_order_for_member() {
        let fx = fixture();

        let result = fx
            .handler
            .handle(order_command(fx.cycle_id, &alice(), vec![rice_line(30)]))
            .await;

        assert!(result.is_ok());
        let cycle = result.unwrap().cycle;
        assert_eq!(cycle.total_participants(), 1);
        assert_eq!(cycle.total_amount_cents(), 30 * 250);

        let alice_entry = cycle.participant(&alice()).unwrap();
        assert_eq!(alice_entry.payment_status, PaymentStatus::Pending);
        assert_eq!(alice_entry.items.len(), 1);
    }

    #[tokio::test]
    async fn repeat_order_replaces_previous() {
        let fx = fixture();

        fx.handler
            .handle(order_command(fx.cycle_id, &alice(), vec![rice_line(30)]))
            .await
            .unwrap();
        let result = fx
            .handler
            .handle(order_command(fx.cycle_id, &alice(), vec![rice_line(45)]))
            .await
            .unwrap();

        assert_eq!(result.cycle.total_participants(), 1);
        assert_eq!(result.cycle.total_amount_cents(), 45 * 250);

        let stored = fx.store.stored(fx.cycle_id).unwrap();
        assert_eq!(stored.participant(&alice()).unwrap().items[0].quantity, 45);
    }

    #[tokio::test]
    async fn commit_bumps_stored_version() {
        let fx = fixture();

        fx.handler
            .handle(order_command(fx.cycle_id, &alice(), vec![rice_line(30)]))
            .await
            .unwrap();

        assert_eq!(fx.store.stored(fx.cycle_id).unwrap().version(), 1);
    }

    #[tokio::test]
    async fn fails_for_unknown_cycle() {
        let fx = fixture();

        let result = fx
            .handler
            .handle(order_command(CycleId::new(), &alice(), vec![rice_line(30)]))
            .await;

        assert!(matches!(result, Err(PlaceOrderError::CycleNotFound(_))));
    }

    #[tokio::test]
    async fn rejects_actively_suspended_user() {
        let now = Timestamp::now();
        let record = SuspensionRecord::new(alice(), "Payment default", now, now.add_days(3));
        let fx = fixture_with(MockSuspensionStore::with_record(record), vec![alice()]);

        let result = fx
            .handler
            .handle(order_command(fx.cycle_id, &alice(), vec![rice_line(30)]))
            .await;

        match result {
            Err(PlaceOrderError::UserSuspended { user_id, until }) => {
                assert_eq!(user_id, alice());
                assert_eq!(until, now.add_days(3));
            }
            other => panic!("Expected UserSuspended, got {:?}", other),
        }
        assert_eq!(fx.store.stored(fx.cycle_id).unwrap().total_participants(), 0);
    }

    #[tokio::test]
    async fn allows_user_whose_suspension_lapsed_and_clears_it() {
        let past = Timestamp::now().add_days(-10);
        let record = SuspensionRecord::new(alice(), "Payment default", past, past.add_days(3));
        let fx = fixture_with(MockSuspensionStore::with_record(record), vec![alice()]);

        let result = fx
            .handler
            .handle(order_command(fx.cycle_id, &alice(), vec![rice_line(30)]))
            .await;

        assert!(result.is_ok());
        assert!(fx.suspensions.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_non_member() {
        let member = UserId::new("bob").unwrap();
        let fx = fixture_with(MockSuspensionStore::empty(), vec![member]);

        let result = fx
            .handler
            .handle(order_command(fx.cycle_id, &alice(), vec![rice_line(30)]))
            .await;

        assert!(matches!(result, Err(PlaceOrderError::NotGroupMember(_))));
    }

    #[tokio::test]
    async fn rejects_order_after_window_closes() {
        let group_id = GroupId::new();
        // collecting window already over
        let started = Timestamp::now().add_hours(-5);
        let cycle = OrderCycle::start(group_id, started, started.add_hours(4), 50);
        let cycle_id = cycle.id();

        let store = Arc::new(MockCycleStore::with_cycle(cycle));
        let handler = PlaceOrderHandler::new(
            store,
            Arc::new(MockSuspensionStore::empty()),
            Arc::new(MockGroupDirectory::with_members(group_id, vec![alice()])),
        );

        let result = handler
            .handle(order_command(cycle_id, &alice(), vec![rice_line(30)]))
            .await;

        assert!(matches!(result, Err(PlaceOrderError::WindowClosed)));
    }

    #[tokio::test]
    async fn rejects_empty_order() {
        let fx = fixture();

        let result = fx
            .handler
            .handle(order_command(fx.cycle_id, &alice(), vec![]))
            .await;

        assert!(matches!(result, Err(PlaceOrderError::Domain(_))));
    }

    #[tokio::test]
    async fn rejects_zero_quantity_line() {
        let fx = fixture();

        let result = fx
            .handler
            .handle(order_command(fx.cycle_id, &alice(), vec![rice_line(0)]))
            .await;

        assert!(matches!(result, Err(PlaceOrderError::Domain(_))));
    }

    #[tokio::test]
    async fn rejects_blank_product_id() {
        let fx = fixture();
        let mut line = rice_line(30);
        line.product_id = "".to_string();

        let result = fx
            .handler
            .handle(order_command(fx.cycle_id, &alice(), vec![line]))
            .await;

        assert!(matches!(result, Err(PlaceOrderError::Domain(_))));
    }
}
