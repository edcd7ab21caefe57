//! Order aggregation - per-product rollups derived from participants.
//!
//! Aggregates are always rebuilt from the full participant list, never
//! patched incrementally. Stateless derivation keeps the rollup and the
//! participant items from drifting apart; at tens to low hundreds of
//! participants per cycle the O(participants x items) cost is irrelevant.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::foundation::{ProductId, UserId};

use super::Participant;

/// One participant's contribution to a product rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductContribution {
    pub user_id: UserId,
    pub user_name: String,
    pub quantity: u32,
}

/// Summed order state for one product across all participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAggregate {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price_cents: i64,
    pub min_quantity: u32,
    pub quantity: u32,
    pub total_value_cents: i64,
    pub participants: Vec<ProductContribution>,
    pub met_minimum: bool,
}

/// Rebuilds every product aggregate from the participant list.
///
/// The first item seen for a product fixes the aggregate's name, unit
/// price, and minimum quantity; later declarations only add quantity.
/// Items without a declared minimum fall back to `default_min_quantity`.
pub fn rebuild_aggregates(
    participants: &[Participant],
    default_min_quantity: u32,
) -> BTreeMap<ProductId, ProductAggregate> {
    let mut aggregates: BTreeMap<ProductId, ProductAggregate> = BTreeMap::new();

    for participant in participants {
        for item in &participant.items {
            let aggregate = aggregates
                .entry(item.product_id.clone())
                .or_insert_with(|| ProductAggregate {
                    product_id: item.product_id.clone(),
                    name: item.name.clone(),
                    unit_price_cents: item.unit_price_cents,
                    min_quantity: item.min_quantity.unwrap_or(default_min_quantity),
                    quantity: 0,
                    total_value_cents: 0,
                    participants: Vec::new(),
                    met_minimum: false,
                });

            aggregate.quantity += item.quantity;
            aggregate.participants.push(ProductContribution {
                user_id: participant.user_id.clone(),
                user_name: participant.user_name.clone(),
                quantity: item.quantity,
            });
        }
    }

    for aggregate in aggregates.values_mut() {
        aggregate.total_value_cents = aggregate.quantity as i64 * aggregate.unit_price_cents;
        aggregate.met_minimum = aggregate.quantity >= aggregate.min_quantity;
    }

    aggregates
}
