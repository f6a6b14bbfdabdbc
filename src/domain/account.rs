use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Name of the profile handed out first on every account.
pub const PRINCIPAL_PROFILE_NAME: &str = "Principal";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub platform_id: Uuid,
    pub login: String,
    #[serde(with = "serde_bytes")]
    pub password_encrypted: Vec<u8>,
    /// Total number of profile slots on the account.
    pub max_profiles: i32,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountProfile {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub slot_number: i32,
    pub is_assigned: bool,
}

/// Slot usage of one account, as seen by the allocator.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountAvailability {
    pub account_id: Uuid,
    pub max_profiles: i32,
    pub assigned_profiles: i32,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(platform_id: Uuid, login: String, password_encrypted: Vec<u8>, max_profiles: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            platform_id,
            login,
            password_encrypted,
            max_profiles,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builds the profile rows for a freshly created account.
    ///
    /// Explicit names are used in order; missing ones fall back to
    /// [`AccountProfile::default_name`].
    pub fn build_profiles(&self, names: &[String]) -> Vec<AccountProfile> {
        (1..=self.max_profiles)
            .map(|slot| {
                let name = names
                    .get((slot - 1) as usize)
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| AccountProfile::default_name(slot));
                AccountProfile {
                    id: Uuid::new_v4(),
                    account_id: self.id,
                    name,
                    slot_number: slot,
                    is_assigned: false,
                }
            })
            .collect()
    }
}

impl AccountProfile {
    pub fn default_name(slot: i32) -> String {
        if slot == 1 {
            PRINCIPAL_PROFILE_NAME.to_string()
        } else {
            format!("Profile {}", slot)
        }
    }

    pub fn is_principal(&self) -> bool {
        self.name.trim().eq_ignore_ascii_case(PRINCIPAL_PROFILE_NAME)
    }
}

impl AccountAvailability {
    pub fn available_profiles(&self) -> i32 {
        (self.max_profiles - self.assigned_profiles).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_profiles_names_first_slot_principal() {
        let account = Account::new(Uuid::new_v4(), "a@example.com".to_string(), vec![], 3);
        let profiles = account.build_profiles(&[]);

        let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Principal", "Profile 2", "Profile 3"]);
        assert!(profiles.iter().all(|p| !p.is_assigned && p.account_id == account.id));
    }

    #[test]
    fn build_profiles_uses_explicit_names_then_defaults() {
        let account = Account::new(Uuid::new_v4(), "a@example.com".to_string(), vec![], 3);
        let profiles = account.build_profiles(&["Kids".to_string(), "  ".to_string()]);

        assert_eq!(profiles[0].name, "Kids");
        assert_eq!(profiles[1].name, "Profile 2");
        assert_eq!(profiles[2].slot_number, 3);
    }

    #[test]
    fn available_profiles_never_negative() {
        let availability = AccountAvailability {
            account_id: Uuid::new_v4(),
            max_profiles: 2,
            assigned_profiles: 3,
            created_at: Utc::now(),
        };
        assert_eq!(availability.available_profiles(), 0);
    }

    #[test]
    fn principal_match_ignores_case_and_padding() {
        let profile = AccountProfile {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            name: " principal ".to_string(),
            slot_number: 4,
            is_assigned: false,
        };
        assert!(profile.is_principal());
    }
}
