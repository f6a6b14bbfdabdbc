use crate::application::{CheckoutSession, ImportCostBreakdown, PlatformAccess, SubscriptionDetails};
use crate::domain::{Account, AccountProfile, Offer, Platform, Subscription, SubscriptionProfile, Warehouse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Serialize, ToSchema)]
pub(super) struct HealthResponse {
    pub(super) status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) error: Option<String>,
}

#[derive(Deserialize, Debug, IntoParams, ToSchema)]
pub(super) struct PaginationParams {
    #[serde(default = "default_limit")]
    #[param(default = 100, maximum = 1000)]
    pub(super) limit: i64,
    #[serde(default)]
    #[param(default = 0)]
    pub(super) offset: i64,
}

pub(super) fn default_limit() -> i64 {
    100
}

#[derive(Deserialize, Debug, IntoParams)]
pub(super) struct AccountListParams {
    /// Only accounts of this platform.
    pub(super) platform_id: Option<Uuid>,
}

/// JSON number or a decimal string such as `"12,50"`.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub(super) enum DecimalInput {
    Number(f64),
    Text(String),
}

impl DecimalInput {
    pub(super) fn value(&self) -> Option<f64> {
        match self {
            DecimalInput::Number(n) => Some(*n).filter(|v| v.is_finite()),
            DecimalInput::Text(s) => super::http_parse::parse_decimal(s),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct CreatePlatformRequest {
    #[schema(example = "Netflix")]
    pub(super) name: String,
}

#[derive(Serialize, ToSchema)]
pub(super) struct PlatformResponse {
    pub(super) id: Uuid,
    pub(super) name: String,
    pub(super) created_at: DateTime<Utc>,
}

impl From<Platform> for PlatformResponse {
    fn from(p: Platform) -> Self {
        Self {
            id: p.id,
            name: p.name,
            created_at: p.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct CreateAccountRequest {
    pub(super) platform_id: Uuid,
    #[schema(example = "family.netflix@example.com")]
    pub(super) login: String,
    pub(super) password: String,
    #[schema(example = 5)]
    pub(super) max_profiles: i32,
    /// Optional names by slot; unnamed slots get "Principal" / "Profile N".
    #[serde(default)]
    pub(super) profile_names: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct UpdateAccountStatusRequest {
    #[schema(example = "disabled")]
    pub(super) status: String,
}

#[derive(Serialize, ToSchema)]
pub(super) struct AccountProfileResponse {
    pub(super) id: Uuid,
    pub(super) name: String,
    pub(super) slot_number: i32,
    pub(super) is_assigned: bool,
}

impl From<AccountProfile> for AccountProfileResponse {
    fn from(p: AccountProfile) -> Self {
        Self {
            id: p.id,
            name: p.name,
            slot_number: p.slot_number,
            is_assigned: p.is_assigned,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct AccountResponse {
    pub(super) id: Uuid,
    pub(super) platform_id: Uuid,
    pub(super) login: String,
    pub(super) max_profiles: i32,
    pub(super) status: String,
    pub(super) created_at: DateTime<Utc>,
    pub(super) updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) profiles: Option<Vec<AccountProfileResponse>>,
}

impl From<Account> for AccountResponse {
    fn from(a: Account) -> Self {
        Self {
            id: a.id,
            platform_id: a.platform_id,
            login: a.login,
            max_profiles: a.max_profiles,
            status: a.status.to_string(),
            created_at: a.created_at,
            updated_at: a.updated_at,
            profiles: None,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct CreateOfferRequest {
    #[schema(example = "Netflix Premium 1 month")]
    pub(super) name: String,
    #[schema(example = 25000)]
    pub(super) price_mga: i64,
    #[schema(example = 1)]
    pub(super) duration_months: i32,
    #[schema(example = 1)]
    pub(super) max_profiles: i32,
    pub(super) platform_ids: Vec<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub(super) struct OfferResponse {
    pub(super) id: Uuid,
    pub(super) name: String,
    pub(super) price_mga: i64,
    pub(super) duration_months: i32,
    pub(super) max_profiles: i32,
    pub(super) platform_ids: Vec<Uuid>,
    pub(super) active: bool,
    pub(super) created_at: DateTime<Utc>,
}

impl From<Offer> for OfferResponse {
    fn from(o: Offer) -> Self {
        Self {
            id: o.id,
            name: o.name,
            price_mga: o.price_mga,
            duration_months: o.duration_months,
            max_profiles: o.max_profiles,
            platform_ids: o.platform_ids,
            active: o.active,
            created_at: o.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct PurchaseRequest {
    pub(super) offer_id: Uuid,
    #[schema(example = "buyer@example.mg")]
    pub(super) customer_email: String,
    /// Defaults to the offer maximum.
    pub(super) profile_count: Option<i32>,
}

#[derive(Serialize, ToSchema)]
pub(super) struct SubscriptionResponse {
    pub(super) id: Uuid,
    pub(super) offer_id: Uuid,
    pub(super) customer_email: String,
    pub(super) status: String,
    pub(super) profile_count: i32,
    pub(super) starts_at: DateTime<Utc>,
    pub(super) ends_at: DateTime<Utc>,
    pub(super) created_at: DateTime<Utc>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(s: Subscription) -> Self {
        Self {
            id: s.id,
            offer_id: s.offer_id,
            customer_email: s.customer_email,
            status: s.status.to_string(),
            profile_count: s.profile_count,
            starts_at: s.starts_at,
            ends_at: s.ends_at,
            created_at: s.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct SubscriptionProfileResponse {
    pub(super) platform_id: Uuid,
    pub(super) account_id: Uuid,
    pub(super) profile_name: String,
    pub(super) released_at: Option<DateTime<Utc>>,
}

impl From<SubscriptionProfile> for SubscriptionProfileResponse {
    fn from(p: SubscriptionProfile) -> Self {
        Self {
            platform_id: p.platform_id,
            account_id: p.account_id,
            profile_name: p.profile_name,
            released_at: p.released_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct PlatformAccessResponse {
    pub(super) platform_id: Uuid,
    pub(super) login: String,
    pub(super) password: String,
    pub(super) profiles: Vec<String>,
}

impl From<PlatformAccess> for PlatformAccessResponse {
    fn from(a: PlatformAccess) -> Self {
        Self {
            platform_id: a.platform_id,
            login: a.login,
            password: a.password,
            profiles: a.profile_names,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct SubscriptionDetailsResponse {
    pub(super) subscription: SubscriptionResponse,
    pub(super) profiles: Vec<SubscriptionProfileResponse>,
    pub(super) access: Vec<PlatformAccessResponse>,
}

impl From<SubscriptionDetails> for SubscriptionDetailsResponse {
    fn from(d: SubscriptionDetails) -> Self {
        Self {
            subscription: d.subscription.into(),
            profiles: d.profiles.into_iter().map(Into::into).collect(),
            access: d.access.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct ExpireResponse {
    pub(super) expired: Vec<SubscriptionResponse>,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct CreateWarehouseRequest {
    #[schema(example = "fr")]
    pub(super) code: String,
    #[schema(example = "Paris")]
    pub(super) name: String,
    #[schema(example = "EUR")]
    pub(super) currency: String,
    pub(super) transport_rate_per_kg: f64,
    pub(super) processing_fee: f64,
    #[schema(example = 0.2)]
    pub(super) tax_rate: f64,
}

#[derive(Serialize, ToSchema)]
pub(super) struct WarehouseResponse {
    pub(super) id: Uuid,
    pub(super) code: String,
    pub(super) name: String,
    pub(super) currency: String,
    pub(super) transport_rate_per_kg: f64,
    pub(super) processing_fee: f64,
    pub(super) tax_rate: f64,
}

impl From<Warehouse> for WarehouseResponse {
    fn from(w: Warehouse) -> Self {
        Self {
            id: w.id,
            code: w.code,
            name: w.name,
            currency: w.currency.to_string(),
            transport_rate_per_kg: w.transport_rate_per_kg,
            processing_fee: w.processing_fee,
            tax_rate: w.tax_rate,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct ImportCostRequest {
    #[schema(value_type = f64, example = 49.9)]
    pub(super) supplier_price: DecimalInput,
    #[schema(example = "USD")]
    pub(super) supplier_currency: String,
    #[schema(value_type = f64, example = 1.2)]
    pub(super) weight_kg: DecimalInput,
    #[schema(example = "fr")]
    pub(super) warehouse: String,
}

#[derive(Serialize, ToSchema)]
pub(super) struct ImportCostResponse {
    pub(super) warehouse_code: String,
    pub(super) warehouse_currency: String,
    pub(super) price: f64,
    pub(super) transport: f64,
    pub(super) commission_rate: f64,
    pub(super) commission: f64,
    pub(super) processing_fee: f64,
    pub(super) tax: f64,
    pub(super) total: f64,
    pub(super) total_mga: i64,
    pub(super) used_fallback_rates: bool,
}

impl From<ImportCostBreakdown> for ImportCostResponse {
    fn from(b: ImportCostBreakdown) -> Self {
        Self {
            warehouse_code: b.warehouse_code,
            warehouse_currency: b.warehouse_currency.to_string(),
            price: b.price,
            transport: b.transport,
            commission_rate: b.commission_rate,
            commission: b.commission,
            processing_fee: b.processing_fee,
            tax: b.tax,
            total: b.total,
            total_mga: b.total_mga,
            used_fallback_rates: b.used_fallback_rates,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct CheckoutResponse {
    pub(super) order_id: Uuid,
    pub(super) status: String,
    pub(super) amount_mga: i64,
    pub(super) payment_currency: String,
    pub(super) payment_amount: String,
    pub(super) paypal_order_id: Option<String>,
    pub(super) approve_url: Option<String>,
}

impl From<CheckoutSession> for CheckoutResponse {
    fn from(s: CheckoutSession) -> Self {
        Self {
            order_id: s.order.id,
            status: s.order.status.to_string(),
            amount_mga: s.order.amount_mga,
            payment_currency: s.payment_currency.to_string(),
            payment_amount: s.payment_amount,
            paypal_order_id: s.order.paypal_order_id,
            approve_url: s.approve_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_input_accepts_numbers_and_strings() {
        let n: DecimalInput = serde_json::from_value(serde_json::json!(12.5)).unwrap();
        let s: DecimalInput = serde_json::from_value(serde_json::json!("12,5")).unwrap();
        let bad: DecimalInput = serde_json::from_value(serde_json::json!("twelve")).unwrap();

        assert_eq!(n.value(), Some(12.5));
        assert_eq!(s.value(), Some(12.5));
        assert_eq!(bad.value(), None);
    }
}
