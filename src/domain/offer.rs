use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A sellable bundle of profile slots on one or more platforms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Offer {
    pub id: Uuid,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(range(min = 0))]
    pub price_mga: i64,
    #[validate(range(min = 1, max = 36))]
    pub duration_months: i32,
    /// Profiles granted per platform.
    #[validate(range(min = 1, max = 10))]
    pub max_profiles: i32,
    #[validate(length(min = 1))]
    pub platform_ids: Vec<Uuid>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    pub fn new(
        name: String,
        price_mga: i64,
        duration_months: i32,
        max_profiles: i32,
        platform_ids: Vec<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            price_mga,
            duration_months,
            max_profiles,
            platform_ids,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Profile count a purchase receives when the buyer does not pick one.
    pub fn resolve_profile_count(&self, requested: Option<i32>) -> Option<i32> {
        let count = requested.unwrap_or(self.max_profiles);
        (1..=self.max_profiles).contains(&count).then_some(count)
    }
}
