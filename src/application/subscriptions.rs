use crate::application::allocator::{plan_allocation, AllocationError, AllocationPlan};
use crate::domain::{Subscription, SubscriptionProfile, SubscriptionStatus};
use crate::infrastructure::{
    AccountRepository, CredentialCipher, OfferRepository, RepositoryError, SubscriptionRepository,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Offer not found: {0}")]
    OfferNotFound(Uuid),
    #[error("Offer is not on sale: {0}")]
    OfferInactive(Uuid),
    #[error("Invalid profile count {requested}: offer allows 1 to {max}")]
    InvalidProfileCount { requested: i32, max: i32 },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("No account on platform {platform_id} has {required} free profiles")]
    NoEligibleAccount { platform_id: Uuid, required: i32 },
    #[error("Profiles were taken by a concurrent purchase")]
    AllocationConflict,
    #[error("Invalid subscription state: {0}")]
    InvalidState(SubscriptionStatus),
    #[error("Encryption error: {0}")]
    Encryption(String),
}

/// Login details a buyer needs for one platform of a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformAccess {
    pub platform_id: Uuid,
    pub account_id: Uuid,
    pub login: String,
    pub password: String,
    pub profile_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SubscriptionDetails {
    pub subscription: Subscription,
    pub profiles: Vec<SubscriptionProfile>,
    pub access: Vec<PlatformAccess>,
}

pub struct SubscriptionService<A, S, O>
where
    A: AccountRepository,
    S: SubscriptionRepository,
    O: OfferRepository,
{
    account_repo: Arc<A>,
    subscription_repo: Arc<S>,
    offer_repo: Arc<O>,
    cipher: Arc<CredentialCipher>,
}

impl<A, S, O> SubscriptionService<A, S, O>
where
    A: AccountRepository,
    S: SubscriptionRepository,
    O: OfferRepository,
{
    pub fn new(
        account_repo: Arc<A>,
        subscription_repo: Arc<S>,
        offer_repo: Arc<O>,
        cipher: Arc<CredentialCipher>,
    ) -> Self {
        Self {
            account_repo,
            subscription_repo,
            offer_repo,
            cipher,
        }
    }

    /// Sells `profile_count` profiles (default: the offer maximum) on every
    /// platform of the offer and assigns them to a new subscription.
    pub async fn purchase(
        &self,
        offer_id: Uuid,
        customer_email: &str,
        profile_count: Option<i32>,
    ) -> Result<SubscriptionDetails, SubscriptionError> {
        validate_email(customer_email)?;

        let offer = match self.offer_repo.get_by_id(offer_id).await {
            Ok(offer) => offer,
            Err(RepositoryError::NotFound(_)) => return Err(SubscriptionError::OfferNotFound(offer_id)),
            Err(e) => return Err(e.into()),
        };
        if !offer.active {
            return Err(SubscriptionError::OfferInactive(offer_id));
        }

        let required = offer.resolve_profile_count(profile_count).ok_or(
            SubscriptionError::InvalidProfileCount {
                requested: profile_count.unwrap_or(offer.max_profiles),
                max: offer.max_profiles,
            },
        )?;

        let mut plans = Vec::with_capacity(offer.platform_ids.len());
        for platform_id in &offer.platform_ids {
            let availability = self.account_repo.list_availability(*platform_id).await?;
            let profiles = self.account_repo.list_platform_profiles(*platform_id).await?;
            let plan = plan_allocation(*platform_id, &availability, &profiles, required)
                .map_err(|e| match e {
                    AllocationError::NoEligibleAccount {
                        platform_id,
                        required,
                    } => SubscriptionError::NoEligibleAccount {
                        platform_id,
                        required,
                    },
                    AllocationError::InvalidProfileCount(n) => SubscriptionError::InvalidProfileCount {
                        requested: n,
                        max: offer.max_profiles,
                    },
                })?;
            plans.push(plan);
        }

        let subscription = Subscription::new(
            offer.id,
            customer_email.to_string(),
            required,
            offer.duration_months,
            Utc::now(),
        );
        let profiles = subscription_profiles(subscription.id, &plans);

        match self
            .subscription_repo
            .create_with_assignments(&subscription, &profiles)
            .await
        {
            Ok(()) => {}
            Err(RepositoryError::Conflict(reason)) => {
                warn!(offer_id = %offer.id, %reason, "Profile allocation lost a race");
                return Err(SubscriptionError::AllocationConflict);
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            subscription_id = %subscription.id,
            offer_id = %offer.id,
            profiles = profiles.len(),
            ends_at = %subscription.ends_at,
            "Created subscription"
        );

        let access = self.platform_access(&profiles).await?;
        Ok(SubscriptionDetails {
            subscription,
            profiles,
            access,
        })
    }

    pub async fn get(&self, subscription_id: Uuid) -> Result<SubscriptionDetails, SubscriptionError> {
        let subscription = self.subscription_repo.get_by_id(subscription_id).await?;
        let profiles = self.subscription_repo.list_profiles(subscription_id).await?;

        let held: Vec<SubscriptionProfile> = profiles
            .iter()
            .filter(|p| p.released_at.is_none())
            .cloned()
            .collect();
        let access = self.platform_access(&held).await?;

        Ok(SubscriptionDetails {
            subscription,
            profiles,
            access,
        })
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Subscription>, SubscriptionError> {
        Ok(self.subscription_repo.list(limit, offset).await?)
    }

    /// Cancels an active subscription and returns its profiles to the pool.
    pub async fn cancel(&self, subscription_id: Uuid) -> Result<(), SubscriptionError> {
        let subscription = self.subscription_repo.get_by_id(subscription_id).await?;
        if !subscription.is_live() {
            return Err(SubscriptionError::InvalidState(subscription.status));
        }

        match self
            .subscription_repo
            .release(subscription_id, SubscriptionStatus::Cancelled, Utc::now())
            .await
        {
            Ok(()) => {
                info!(%subscription_id, "Cancelled subscription and released profiles");
                Ok(())
            }
            Err(RepositoryError::Conflict(_)) => {
                let current = self.subscription_repo.get_by_id(subscription_id).await?;
                Err(SubscriptionError::InvalidState(current.status))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Expires every active subscription past its end date.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, SubscriptionError> {
        let due = self.subscription_repo.list_due(now).await?;
        let mut expired = Vec::with_capacity(due.len());

        for mut subscription in due {
            match self
                .subscription_repo
                .release(subscription.id, SubscriptionStatus::Expired, now)
                .await
            {
                Ok(()) => {
                    subscription.status = SubscriptionStatus::Expired;
                    subscription.updated_at = now;
                    expired.push(subscription);
                }
                Err(RepositoryError::Conflict(_)) => {
                    warn!(subscription_id = %subscription.id, "Subscription changed state before expiry, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Expired subscriptions and released their profiles");
        }
        Ok(expired)
    }

    async fn platform_access(
        &self,
        profiles: &[SubscriptionProfile],
    ) -> Result<Vec<PlatformAccess>, SubscriptionError> {
        let mut grouped: BTreeMap<(Uuid, Uuid), Vec<String>> = BTreeMap::new();
        for profile in profiles {
            grouped
                .entry((profile.platform_id, profile.account_id))
                .or_default()
                .push(profile.profile_name.clone());
        }

        let mut access = Vec::with_capacity(grouped.len());
        for ((platform_id, account_id), profile_names) in grouped {
            let account = self.account_repo.get_by_id(account_id).await?;
            let password = self
                .cipher
                .decrypt(&account.password_encrypted)
                .map_err(|e| SubscriptionError::Encryption(e.to_string()))?;
            access.push(PlatformAccess {
                platform_id,
                account_id,
                login: account.login,
                password,
                profile_names,
            });
        }
        Ok(access)
    }
}

fn subscription_profiles(subscription_id: Uuid, plans: &[AllocationPlan]) -> Vec<SubscriptionProfile> {
    let now = Utc::now();
    plans
        .iter()
        .flat_map(|plan| {
            plan.profiles.iter().map(move |p| SubscriptionProfile {
                id: Uuid::new_v4(),
                subscription_id,
                platform_id: plan.platform_id,
                account_id: plan.account_id,
                account_profile_id: p.account_profile_id,
                profile_name: p.profile_name.clone(),
                created_at: now,
                released_at: None,
            })
        })
        .collect()
}

pub(crate) fn validate_email(email: &str) -> Result<(), SubscriptionError> {
    let email = email.trim();
    let valid = email.len() <= 254
        && email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'))
            .unwrap_or(false);

    if valid {
        Ok(())
    } else {
        Err(SubscriptionError::InvalidInput(format!(
            "Invalid customer email: {}",
            email
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::allocator::PlannedProfile;

    #[test]
    fn validate_email_accepts_plain_addresses() {
        assert!(validate_email("buyer@example.mg").is_ok());
        assert!(validate_email("  buyer@example.mg ").is_ok());
    }

    #[test]
    fn validate_email_rejects_garbage() {
        for bad in ["", "buyer", "@example.com", "buyer@localhost", "buyer@.com"] {
            assert!(validate_email(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn subscription_profiles_cover_every_plan() {
        let subscription_id = Uuid::new_v4();
        let plans = vec![
            AllocationPlan {
                platform_id: Uuid::new_v4(),
                account_id: Uuid::new_v4(),
                profiles: vec![PlannedProfile {
                    account_profile_id: Uuid::new_v4(),
                    profile_name: "Principal".to_string(),
                }],
            },
            AllocationPlan {
                platform_id: Uuid::new_v4(),
                account_id: Uuid::new_v4(),
                profiles: vec![
                    PlannedProfile {
                        account_profile_id: Uuid::new_v4(),
                        profile_name: "Principal".to_string(),
                    },
                    PlannedProfile {
                        account_profile_id: Uuid::new_v4(),
                        profile_name: "Profile 2".to_string(),
                    },
                ],
            },
        ];

        let rows = subscription_profiles(subscription_id, &plans);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.subscription_id == subscription_id && r.released_at.is_none()));
        assert_eq!(rows[2].account_id, plans[1].account_id);
    }
}
