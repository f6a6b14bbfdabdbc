use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// A checkout for one offer, paid through PayPal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub customer_email: String,
    pub profile_count: i32,
    pub amount_mga: i64,
    pub status: OrderStatus,
    pub paypal_order_id: Option<String>,
    pub subscription_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    /// Claimed by one capture call; PayPal is being asked to settle it.
    Capturing,
    Paid,
    Failed,
}

impl Order {
    pub fn new(offer_id: Uuid, customer_email: String, profile_count: i32, amount_mga: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            offer_id,
            customer_email: customer_email.trim().to_lowercase(),
            profile_count,
            amount_mga,
            status: OrderStatus::Pending,
            paypal_order_id: None,
            subscription_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}
