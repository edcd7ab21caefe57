//! Order cycle policy configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Policy knobs for the order cycle lifecycle.
///
/// Windows are wall-clock durations from the moment the phase opens;
/// once a cycle is started, its deadlines are fixed even if these values
/// change.
#[derive(Debug, Clone, Deserialize)]
pub struct CycleConfig {
    /// How long a cycle collects orders, in hours
    #[serde(default = "default_collecting_hours")]
    pub collecting_hours: u32,

    /// How long participants have to pay, in hours
    #[serde(default = "default_payment_window_hours")]
    pub payment_window_hours: u32,

    /// How long a payment default suspends a user, in days
    #[serde(default = "default_suspension_days")]
    pub suspension_days: u32,

    /// Minimum product quantity when an item declares none
    #[serde(default = "default_min_quantity")]
    pub default_min_quantity: u32,

    /// Estimated delivery lead time after confirmation, in hours
    #[serde(default = "default_delivery_lead_hours")]
    pub delivery_lead_hours: u32,
}

impl CycleConfig {
    /// Validate cycle policy configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.collecting_hours == 0 || self.payment_window_hours == 0 {
            return Err(ValidationError::InvalidCycleWindow);
        }
        if self.default_min_quantity == 0 {
            return Err(ValidationError::InvalidMinQuantity);
        }
        if self.suspension_days == 0 {
            return Err(ValidationError::InvalidSuspensionDuration);
        }
        Ok(())
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            collecting_hours: default_collecting_hours(),
            payment_window_hours: default_payment_window_hours(),
            suspension_days: default_suspension_days(),
            default_min_quantity: default_min_quantity(),
            delivery_lead_hours: default_delivery_lead_hours(),
        }
    }
}

fn default_collecting_hours() -> u32 {
    4
}

fn default_payment_window_hours() -> u32 {
    4
}

fn default_suspension_days() -> u32 {
    3
}

fn default_min_quantity() -> u32 {
    50
}

fn default_delivery_lead_hours() -> u32 {
    24
}
