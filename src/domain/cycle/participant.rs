//! Participant entity - one member's order within a cycle.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    PaymentStatus, ProductId, Timestamp, UserId, ValidationError,
};

/// A single line item in a participant's order.
///
/// `unit_price_cents` and `min_quantity` are captured from the catalog at
/// order time and stay locked for the life of the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    /// Per-product threshold; cycles fall back to the configured default
    /// when the catalog does not declare one.
    pub min_quantity: Option<u32>,
}

impl OrderItem {
    /// Creates a validated order item.
    pub fn new(
        product_id: ProductId,
        name: impl Into<String>,
        quantity: u32,
        unit_price_cents: i64,
        min_quantity: Option<u32>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::empty_field("item_name"));
        }
        if quantity == 0 {
            return Err(ValidationError::out_of_range("quantity", 1, u32::MAX as i64, 0));
        }
        if unit_price_cents < 0 {
            return Err(ValidationError::out_of_range(
                "unit_price_cents",
                0,
                i64::MAX,
                unit_price_cents,
            ));
        }
        Ok(Self {
            product_id,
            name,
            quantity,
            unit_price_cents,
            min_quantity,
        })
    }

    /// Line total in cents.
    pub fn line_total_cents(&self) -> i64 {
        self.quantity as i64 * self.unit_price_cents
    }
}

/// A group member's order inside one cycle.
///
/// Unique by `user_id` within the cycle; the aggregate enforces that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub user_name: String,
    pub user_email: String,
    pub user_phone: String,
    pub items: Vec<OrderItem>,
    /// Always Σ line totals over `items`; refreshed after every mutation.
    pub total_amount_cents: i64,
    pub payment_status: PaymentStatus,
    pub joined_at: Timestamp,
    pub paid_at: Option<Timestamp>,
}

impl Participant {
    /// Creates a participant joining at `now` with payment pending.
    pub fn new(
        user_id: UserId,
        user_name: impl Into<String>,
        user_email: impl Into<String>,
        user_phone: impl Into<String>,
        items: Vec<OrderItem>,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        if items.is_empty() {
            return Err(ValidationError::empty_field("items"));
        }
        let mut participant = Self {
            user_id,
            user_name: user_name.into(),
            user_email: user_email.into(),
            user_phone: user_phone.into(),
            items,
            total_amount_cents: 0,
            payment_status: PaymentStatus::Pending,
            joined_at: now,
            paid_at: None,
        };
        participant.recompute_total();
        Ok(participant)
    }

    /// Recomputes `total_amount_cents` from the current items.
    pub fn recompute_total(&mut self) {
        self.total_amount_cents = self.items.iter().map(OrderItem::line_total_cents).sum();
    }

    /// Keeps only items whose product satisfies the predicate, then
    /// refreshes the total. Returns true if any items remain.
    pub fn retain_products(&mut self, mut keep: impl FnMut(&ProductId) -> bool) -> bool {
        self.items.retain(|item| keep(&item.product_id));
        self.recompute_total();
        !self.items.is_empty()
    }

    /// Marks the payment settled at `now`.
    pub fn mark_paid(&mut self, now: Timestamp) {
        self.payment_status = PaymentStatus::Paid;
        self.paid_at = Some(now);
    }

    /// Marks the payment failed, clearing any earlier settlement stamp.
    pub fn mark_payment_failed(&mut self) {
        self.payment_status = PaymentStatus::Failed;
        self.paid_at = None;
    }

    /// Returns true once this participant has settled their payment.
    pub fn has_paid(&self) -> bool {
        self.payment_status.is_paid()
    }
}
