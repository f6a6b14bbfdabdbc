//! Matching of purchased offers to shared account profile slots.
//!
//! An account is picked by best fit: the smallest number of free slots that
//! still covers the request, so large accounts stay available for large
//! offers. Within the account the "Principal" profile goes first, then slots
//! in ascending order.

use crate::domain::{AccountAvailability, AccountProfile};
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq)]
pub enum AllocationError {
    #[error("Invalid profile count: {0}")]
    InvalidProfileCount(i32),
    #[error("No account on platform {platform_id} has {required} free profiles")]
    NoEligibleAccount { platform_id: Uuid, required: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedProfile {
    pub account_profile_id: Uuid,
    pub profile_name: String,
}

/// Profiles chosen on one platform for one purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    pub platform_id: Uuid,
    pub account_id: Uuid,
    pub profiles: Vec<PlannedProfile>,
}

/// Eligible accounts, best fit first.
///
/// Order: least slack (`available - required`), then fewer total profiles,
/// then oldest account, then id.
pub fn rank_accounts(candidates: &[AccountAvailability], required: i32) -> Vec<&AccountAvailability> {
    if required <= 0 {
        return Vec::new();
    }

    let mut eligible: Vec<&AccountAvailability> = candidates
        .iter()
        .filter(|c| c.available_profiles() >= required)
        .collect();

    eligible.sort_by(|a, b| compare_fit(a, b, required));
    eligible
}

fn compare_fit(a: &AccountAvailability, b: &AccountAvailability, required: i32) -> Ordering {
    let slack_a = a.available_profiles() - required;
    let slack_b = b.available_profiles() - required;
    slack_a
        .cmp(&slack_b)
        .then(a.max_profiles.cmp(&b.max_profiles))
        .then(a.created_at.cmp(&b.created_at))
        .then(a.account_id.cmp(&b.account_id))
}

pub fn select_account(candidates: &[AccountAvailability], required: i32) -> Option<&AccountAvailability> {
    rank_accounts(candidates, required).into_iter().next()
}

/// Picks `required` free profiles, "Principal" first then by slot number.
///
/// Returns `None` when the account has fewer free profiles than requested.
pub fn select_profiles(profiles: &[AccountProfile], required: i32) -> Option<Vec<&AccountProfile>> {
    if required <= 0 {
        return None;
    }

    let mut free: Vec<&AccountProfile> = profiles.iter().filter(|p| !p.is_assigned).collect();
    if free.len() < required as usize {
        return None;
    }

    free.sort_by(|a, b| {
        b.is_principal()
            .cmp(&a.is_principal())
            .then(a.slot_number.cmp(&b.slot_number))
    });
    free.truncate(required as usize);
    Some(free)
}

/// Builds a plan from the first ranked account whose profile rows can
/// actually satisfy the request.
///
/// `profiles` holds the profile rows of the platform's accounts. Slot
/// counters and rows can disagree on hand-edited accounts, so a ranked
/// account is skipped when its rows come up short.
pub fn plan_allocation(
    platform_id: Uuid,
    candidates: &[AccountAvailability],
    profiles: &[AccountProfile],
    required: i32,
) -> Result<AllocationPlan, AllocationError> {
    if required <= 0 {
        return Err(AllocationError::InvalidProfileCount(required));
    }

    let mut by_account: HashMap<Uuid, Vec<AccountProfile>> = HashMap::new();
    for profile in profiles {
        by_account
            .entry(profile.account_id)
            .or_default()
            .push(profile.clone());
    }

    for candidate in rank_accounts(candidates, required) {
        let Some(rows) = by_account.get(&candidate.account_id) else {
            continue;
        };
        if let Some(chosen) = select_profiles(rows, required) {
            return Ok(AllocationPlan {
                platform_id,
                account_id: candidate.account_id,
                profiles: chosen
                    .into_iter()
                    .map(|p| PlannedProfile {
                        account_profile_id: p.id,
                        profile_name: p.name.clone(),
                    })
                    .collect(),
            });
        }
    }

    Err(AllocationError::NoEligibleAccount {
        platform_id,
        required,
    })
}
