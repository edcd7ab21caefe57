//! OrderCycle aggregate - The root entity for group-purchase cycles.
//!
//! An OrderCycle owns its participants and product rollups and drives the
//! phase lifecycle: collecting -> payment_window -> confirmed -> processing
//! -> completed, with cancellation as a side exit while the cycle is open.
//! All derived fields (rollups, totals) are recomputed after every mutation.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::domain::foundation::{
    CycleId, CyclePhase, DomainError, ErrorCode, GroupId, PaymentStatus, ProductId, StateMachine,
    Timestamp, UserId,
};

use super::aggregator::{rebuild_aggregates, ProductAggregate};
use super::Participant;

/// Cancellation reason recorded when no product reaches its minimum.
pub const CANCEL_REASON_NO_MINIMUM: &str = "No products met minimum quantity";

/// Cancellation reason recorded when the payment window ends with no payers.
pub const CANCEL_REASON_NO_PAYMENTS: &str = "No payments received";

/// Outcome of closing the collecting window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectingOutcome {
    /// No product met its minimum; the cycle is cancelled.
    Cancelled,
    /// At least one product qualified; the cycle entered the payment window.
    Advanced {
        /// Products stripped for missing their minimum.
        dropped_products: Vec<ProductId>,
        /// Participants removed because all their items were stripped.
        dropped_participants: Vec<UserId>,
    },
}

/// Outcome of closing the payment window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Nobody paid; the cycle is cancelled.
    Cancelled {
        /// Participants who defaulted on payment.
        delinquents: Vec<UserId>,
    },
    /// At least one participant paid; the cycle is confirmed.
    Confirmed {
        /// Participants who defaulted and were dropped from the cycle.
        delinquents: Vec<UserId>,
    },
}

impl PaymentOutcome {
    /// The participants who failed to pay, whatever the outcome.
    pub fn delinquents(&self) -> &[UserId] {
        match self {
            PaymentOutcome::Cancelled { delinquents } => delinquents,
            PaymentOutcome::Confirmed { delinquents } => delinquents,
        }
    }
}

/// The OrderCycle aggregate root.
///
/// One bounded group-purchase event for a single group. A group has at
/// most one open cycle at a time; the store enforces that at creation.
#[derive(Debug, Clone)]
pub struct OrderCycle {
    id: CycleId,
    group_id: GroupId,
    phase: CyclePhase,
    collecting_started_at: Timestamp,
    collecting_ends_at: Timestamp,
    payment_window_started_at: Option<Timestamp>,
    payment_window_ends_at: Option<Timestamp>,
    participants: Vec<Participant>,
    product_orders: BTreeMap<ProductId, ProductAggregate>,
    total_participants: u32,
    total_amount_cents: i64,
    cancel_reason: Option<String>,
    confirmed_at: Option<Timestamp>,
    estimated_delivery: Option<Timestamp>,
    /// Threshold applied to items that do not declare their own minimum.
    /// Locked at cycle creation, like item prices.
    default_min_quantity: u32,
    /// Optimistic-concurrency token owned by the cycle store.
    version: u64,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl OrderCycle {
    /// Starts a new cycle for a group, collecting until `collecting_ends_at`.
    pub fn start(
        group_id: GroupId,
        now: Timestamp,
        collecting_ends_at: Timestamp,
        default_min_quantity: u32,
    ) -> Self {
        Self {
            id: CycleId::new(),
            group_id,
            phase: CyclePhase::Collecting,
            collecting_started_at: now,
            collecting_ends_at,
            payment_window_started_at: None,
            payment_window_ends_at: None,
            participants: Vec::new(),
            product_orders: BTreeMap::new(),
            total_participants: 0,
            total_amount_cents: 0,
            cancel_reason: None,
            confirmed_at: None,
            estimated_delivery: None,
            default_min_quantity,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstitutes a cycle from persisted data.
    ///
    /// This is used by store implementations to reconstruct domain objects
    /// from database records.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: CycleId,
        group_id: GroupId,
        phase: CyclePhase,
        collecting_started_at: Timestamp,
        collecting_ends_at: Timestamp,
        payment_window_started_at: Option<Timestamp>,
        payment_window_ends_at: Option<Timestamp>,
        participants: Vec<Participant>,
        product_orders: BTreeMap<ProductId, ProductAggregate>,
        total_participants: u32,
        total_amount_cents: i64,
        cancel_reason: Option<String>,
        confirmed_at: Option<Timestamp>,
        estimated_delivery: Option<Timestamp>,
        default_min_quantity: u32,
        version: u64,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id,
            group_id,
            phase,
            collecting_started_at,
            collecting_ends_at,
            payment_window_started_at,
            payment_window_ends_at,
            participants,
            product_orders,
            total_participants,
            total_amount_cents,
            cancel_reason,
            confirmed_at,
            estimated_delivery,
            default_min_quantity,
            version,
            created_at,
            updated_at,
        })
    }

    // ───────────────────────────────────────────────────────────────
    // Accessors
    // ───────────────────────────────────────────────────────────────

    /// Returns the cycle ID.
    pub fn id(&self) -> CycleId {
        self.id
    }

    /// Returns the group this cycle belongs to.
    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    /// Returns the current lifecycle phase.
    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Returns when order collection started.
    pub fn collecting_started_at(&self) -> Timestamp {
        self.collecting_started_at
    }

    /// Returns when order collection closes.
    pub fn collecting_ends_at(&self) -> Timestamp {
        self.collecting_ends_at
    }

    /// Returns when the payment window opened, if it has.
    pub fn payment_window_started_at(&self) -> Option<Timestamp> {
        self.payment_window_started_at
    }

    /// Returns when the payment window closes, if it has opened.
    pub fn payment_window_ends_at(&self) -> Option<Timestamp> {
        self.payment_window_ends_at
    }

    /// Returns the participants in join order.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Returns the participant for a user, if present.
    pub fn participant(&self, user_id: &UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.user_id == user_id)
    }

    /// Returns the per-product rollups.
    pub fn product_orders(&self) -> &BTreeMap<ProductId, ProductAggregate> {
        &self.product_orders
    }

    /// Returns the derived participant count.
    pub fn total_participants(&self) -> u32 {
        self.total_participants
    }

    /// Returns the derived cycle total in cents.
    pub fn total_amount_cents(&self) -> i64 {
        self.total_amount_cents
    }

    /// Returns the recorded cancellation reason, if cancelled.
    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    /// Returns when the cycle was confirmed, if it was.
    pub fn confirmed_at(&self) -> Option<Timestamp> {
        self.confirmed_at
    }

    /// Returns the estimated delivery time, once confirmed.
    pub fn estimated_delivery(&self) -> Option<Timestamp> {
        self.estimated_delivery
    }

    /// Returns the fallback minimum applied to items without one.
    pub fn default_min_quantity(&self) -> u32 {
        self.default_min_quantity
    }

    /// Returns the store's optimistic-concurrency token.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns when this cycle was created.
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Returns when this cycle was last updated.
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Returns the next deadline a scheduler must act on, if any.
    ///
    /// Collecting cycles are due at `collecting_ends_at`; payment-window
    /// cycles at `payment_window_ends_at`. Later phases have no deadline.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        match self.phase {
            CyclePhase::Collecting => Some(self.collecting_ends_at),
            CyclePhase::PaymentWindow => self.payment_window_ends_at,
            _ => None,
        }
    }

    /// Returns true if the next deadline has passed at `now`.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.next_deadline()
            .map(|deadline| !now.is_before(&deadline))
            .unwrap_or(false)
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    // ───────────────────────────────────────────────────────────────
    // Participant Ledger
    // ───────────────────────────────────────────────────────────────

    /// Adds or replaces a participant's order, then rebuilds all rollups.
    ///
    /// Upsert is keyed by `user_id`: a repeat order replaces the previous
    /// one wholesale, keeping the participant's original position in the
    /// list. Rejected with `WindowClosed` unless the cycle is collecting
    /// and `now` is within the collecting window.
    pub fn upsert_participant(
        &mut self,
        participant: Participant,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        if self.phase != CyclePhase::Collecting {
            return Err(DomainError::new(
                ErrorCode::WindowClosed,
                format!("Cycle is {}, not accepting orders", self.phase),
            ));
        }
        if now.is_after(&self.collecting_ends_at) {
            return Err(DomainError::new(
                ErrorCode::WindowClosed,
                "Order collection has closed",
            ));
        }

        match self
            .participants
            .iter_mut()
            .find(|p| p.user_id == participant.user_id)
        {
            Some(existing) => *existing = participant,
            None => self.participants.push(participant),
        }

        self.refresh_rollups();
        self.updated_at = now;
        Ok(())
    }

    /// Records the payment-gateway callback for one participant.
    ///
    /// Only legal during the payment window; the participant must already
    /// be part of the cycle.
    pub fn record_payment(
        &mut self,
        user_id: &UserId,
        status: PaymentStatus,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        if self.phase != CyclePhase::PaymentWindow {
            return Err(DomainError::new(
                ErrorCode::WindowClosed,
                format!("Cycle is {}, not accepting payments", self.phase),
            ));
        }

        let participant = self
            .participants
            .iter_mut()
            .find(|p| &p.user_id == user_id)
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::ParticipantNotFound,
                    format!("User {} has no order in this cycle", user_id),
                )
            })?;

        match status {
            PaymentStatus::Paid => participant.mark_paid(now),
            PaymentStatus::Failed => participant.mark_payment_failed(),
            PaymentStatus::Pending => {
                participant.payment_status = PaymentStatus::Pending;
                participant.paid_at = None;
            }
        }

        self.updated_at = now;
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────
    // Phase Transitions
    // ───────────────────────────────────────────────────────────────

    /// Closes the collecting window.
    ///
    /// Rebuilds the rollups, then either cancels the cycle (no product met
    /// its minimum) or strips non-qualifying products, drops participants
    /// left with nothing, and opens the payment window until
    /// `payment_window_ends_at`.
    pub fn close_collecting(
        &mut self,
        now: Timestamp,
        payment_window_ends_at: Timestamp,
    ) -> Result<CollectingOutcome, DomainError> {
        if self.phase != CyclePhase::Collecting {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Cannot close collecting from {}", self.phase),
            ));
        }

        self.refresh_rollups();

        let qualifying: BTreeSet<ProductId> = self
            .product_orders
            .values()
            .filter(|aggregate| aggregate.met_minimum)
            .map(|aggregate| aggregate.product_id.clone())
            .collect();

        if qualifying.is_empty() {
            self.phase = self.phase.transition_to(CyclePhase::Cancelled)?;
            self.cancel_reason = Some(CANCEL_REASON_NO_MINIMUM.to_string());
            self.updated_at = now;
            return Ok(CollectingOutcome::Cancelled);
        }

        let dropped_products: Vec<ProductId> = self
            .product_orders
            .keys()
            .filter(|product_id| !qualifying.contains(*product_id))
            .cloned()
            .collect();

        let mut dropped_participants = Vec::new();
        self.participants.retain_mut(|participant| {
            let survives = participant.retain_products(|pid| qualifying.contains(pid));
            if !survives {
                dropped_participants.push(participant.user_id.clone());
            }
            survives
        });

        self.refresh_rollups();
        self.phase = self.phase.transition_to(CyclePhase::PaymentWindow)?;
        self.payment_window_started_at = Some(now);
        self.payment_window_ends_at = Some(payment_window_ends_at);
        self.updated_at = now;

        Ok(CollectingOutcome::Advanced {
            dropped_products,
            dropped_participants,
        })
    }

    /// Closes the payment window.
    ///
    /// Either cancels the cycle (nobody paid) or restricts it to the paid
    /// participants and confirms it. The returned outcome names every
    /// delinquent; the caller owns suspending them.
    pub fn close_payment_window(
        &mut self,
        now: Timestamp,
        estimated_delivery: Timestamp,
    ) -> Result<PaymentOutcome, DomainError> {
        if self.phase != CyclePhase::PaymentWindow {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Cannot close payment window from {}", self.phase),
            ));
        }

        let delinquents: Vec<UserId> = self
            .participants
            .iter()
            .filter(|p| !p.has_paid())
            .map(|p| p.user_id.clone())
            .collect();

        let any_paid = self.participants.iter().any(Participant::has_paid);
        if !any_paid {
            self.phase = self.phase.transition_to(CyclePhase::Cancelled)?;
            self.cancel_reason = Some(CANCEL_REASON_NO_PAYMENTS.to_string());
            self.updated_at = now;
            return Ok(PaymentOutcome::Cancelled { delinquents });
        }

        self.participants.retain(Participant::has_paid);
        self.refresh_rollups();
        self.phase = self.phase.transition_to(CyclePhase::Confirmed)?;
        self.confirmed_at = Some(now);
        self.estimated_delivery = Some(estimated_delivery);
        self.updated_at = now;

        Ok(PaymentOutcome::Confirmed { delinquents })
    }

    /// Advances fulfillment one administrative step:
    /// confirmed -> processing -> completed.
    pub fn advance_fulfillment(&mut self, now: Timestamp) -> Result<CyclePhase, DomainError> {
        let target = match self.phase {
            CyclePhase::Confirmed => CyclePhase::Processing,
            CyclePhase::Processing => CyclePhase::Completed,
            other => {
                return Err(DomainError::new(
                    ErrorCode::InvalidStateTransition,
                    format!("Cannot advance fulfillment from {}", other),
                ));
            }
        };

        self.phase = self.phase.transition_to(target)?;
        self.updated_at = now;
        Ok(self.phase)
    }

    // ───────────────────────────────────────────────────────────────
    // Derived State & Invariants
    // ───────────────────────────────────────────────────────────────

    /// Rebuilds `product_orders` and the cycle totals from the
    /// participant list. Derivation is total: no counter survives a
    /// rebuild, so the rollups cannot drift from the items.
    fn refresh_rollups(&mut self) {
        self.product_orders = rebuild_aggregates(&self.participants, self.default_min_quantity);
        self.total_participants = self.participants.len() as u32;
        self.total_amount_cents = self
            .participants
            .iter()
            .map(|p| p.total_amount_cents)
            .sum();
    }

    /// Verifies the aggregate's internal consistency.
    ///
    /// Stores run this before committing a mutation; a violation means the
    /// mutation is rejected rather than persisted.
    pub fn check_invariants(&self) -> Result<(), DomainError> {
        let mut seen = HashSet::new();
        for participant in &self.participants {
            if !seen.insert(&participant.user_id) {
                return Err(DomainError::new(
                    ErrorCode::InvariantViolation,
                    format!("Duplicate participant {}", participant.user_id),
                ));
            }
        }

        if self.total_participants as usize != self.participants.len() {
            return Err(DomainError::new(
                ErrorCode::InvariantViolation,
                "total_participants does not match participant list",
            ));
        }

        let expected_total: i64 = self
            .participants
            .iter()
            .map(|p| p.total_amount_cents)
            .sum();
        if self.total_amount_cents != expected_total {
            return Err(DomainError::new(
                ErrorCode::InvariantViolation,
                "total_amount_cents does not match participant totals",
            ));
        }

        let expected_orders = rebuild_aggregates(&self.participants, self.default_min_quantity);
        if self.product_orders != expected_orders {
            return Err(DomainError::new(
                ErrorCode::InvariantViolation,
                "product_orders is not derivable from participants",
            ));
        }

        if self.phase == CyclePhase::Collecting && self.payment_window_started_at.is_some() {
            return Err(DomainError::new(
                ErrorCode::InvariantViolation,
                "Collecting cycle has an open payment window",
            ));
        }

        if self.phase == CyclePhase::Cancelled && self.cancel_reason.is_none() {
            return Err(DomainError::new(
                ErrorCode::InvariantViolation,
                "Cancelled cycle has no cancel reason",
            ));
        }

        if self.phase.is_confirmed_or_later() && self.confirmed_at.is_none() {
            return Err(DomainError::new(
                ErrorCode::InvariantViolation,
                "Confirmed cycle has no confirmation time",
            ));
        }

        Ok(())
    }
}
