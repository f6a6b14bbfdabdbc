use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub customer_email: String,
    pub status: SubscriptionStatus,
    /// Profiles held on each of the offer's platforms.
    pub profile_count: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
}

/// Customer-facing record of one account profile held by a subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionProfile {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub platform_id: Uuid,
    pub account_id: Uuid,
    pub account_profile_id: Uuid,
    pub profile_name: String,
    pub created_at: DateTime<Utc>,
    /// Set once the account profile went back to the free pool.
    pub released_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn new(
        offer_id: Uuid,
        customer_email: String,
        profile_count: i32,
        duration_months: i32,
        starts_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            offer_id,
            customer_email: customer_email.trim().to_lowercase(),
            status: SubscriptionStatus::Active,
            profile_count,
            starts_at,
            ends_at: end_date(starts_at, duration_months),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_live() && self.ends_at <= now
    }
}

/// Adds calendar months, clamping to the end of shorter months.
pub fn end_date(starts_at: DateTime<Utc>, duration_months: i32) -> DateTime<Utc> {
    let months = Months::new(duration_months.max(0) as u32);
    starts_at.checked_add_months(months).unwrap_or(starts_at)
}
