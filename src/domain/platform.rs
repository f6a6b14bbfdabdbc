use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A streaming service whose accounts are resold by profile slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Platform {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Platform {
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            created_at: Utc::now(),
        }
    }
}
