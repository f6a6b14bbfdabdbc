use crate::application::{CheckoutError, ImportCostError, SubscriptionError};
use crate::infrastructure::{PayPalError, RepositoryError};
use axum::http::StatusCode;

pub(super) fn map_repository_error(
    err: &RepositoryError,
    entity: &str,
) -> (StatusCode, serde_json::Value) {
    match err {
        RepositoryError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": format!("{} not found", entity) }),
        ),
        RepositoryError::Conflict(msg) => {
            (StatusCode::CONFLICT, serde_json::json!({ "error": msg }))
        }
        RepositoryError::InvalidData(msg) => {
            (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
        }
        RepositoryError::DatabaseError(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Database error" }),
        ),
    }
}

pub(super) fn map_subscription_error(err: &SubscriptionError) -> (StatusCode, serde_json::Value) {
    match err {
        SubscriptionError::OfferNotFound(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Offer not found" }),
        ),
        SubscriptionError::Repository(RepositoryError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Subscription not found" }),
        ),
        SubscriptionError::OfferInactive(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "Offer is not on sale" }),
        ),
        SubscriptionError::InvalidProfileCount { .. } | SubscriptionError::InvalidInput(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": err.to_string() }),
        ),
        SubscriptionError::NoEligibleAccount { .. } => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "No account has enough free profiles for this offer" }),
        ),
        SubscriptionError::AllocationConflict => (
            StatusCode::CONFLICT,
            serde_json::json!({ "error": "Profiles were just taken, please retry" }),
        ),
        SubscriptionError::InvalidState(status) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": format!("Subscription is already {}", status) }),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Subscription operation failed" }),
        ),
    }
}

pub(super) fn map_import_cost_error(err: &ImportCostError) -> (StatusCode, serde_json::Value) {
    match err {
        ImportCostError::InvalidInput(msg) => {
            (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
        }
        ImportCostError::MissingRate(currency) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": format!("No exchange rate for {}", currency) }),
        ),
        ImportCostError::Repository(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Failed to compute import cost" }),
        ),
    }
}

pub(super) fn map_checkout_error(err: &CheckoutError) -> (StatusCode, serde_json::Value) {
    match err {
        CheckoutError::Subscription(inner) => map_subscription_error(inner),
        CheckoutError::OrderNotFound(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Order not found" }),
        ),
        CheckoutError::InvalidState(status) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": format!("Order is already {}", status) }),
        ),
        CheckoutError::PaymentDeclined(reason) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": format!("Payment was not completed: {}", reason) }),
        ),
        CheckoutError::InvalidInput(msg) => {
            (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
        }
        CheckoutError::Payment(PayPalError::RateLimited) => (
            StatusCode::TOO_MANY_REQUESTS,
            serde_json::json!({ "error": "Rate limited by PayPal, please retry" }),
        ),
        CheckoutError::Payment(PayPalError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "PayPal order not found" }),
        ),
        CheckoutError::Payment(_) => (
            StatusCode::BAD_GATEWAY,
            serde_json::json!({ "error": "Payment provider error" }),
        ),
        CheckoutError::Repository(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Checkout failed" }),
        ),
    }
}
