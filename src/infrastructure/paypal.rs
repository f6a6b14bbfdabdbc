use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum PayPalError {
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("Authentication failed: {0}")]
    AuthFailed(String),
    #[error("Order not found: {0}")]
    NotFound(String),
    #[error("Capture declined: {0}")]
    CaptureDeclined(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Payment order created on the provider side, awaiting buyer approval.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedPayment {
    pub provider_order_id: String,
    pub approve_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapturedPayment {
    pub provider_order_id: String,
    pub completed: bool,
    pub status: String,
}

/// Checkout payment provider seam.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        reference_id: &str,
        currency_code: &str,
        amount: &str,
    ) -> Result<CreatedPayment, PayPalError>;

    async fn capture_order(&self, provider_order_id: &str) -> Result<CapturedPayment, PayPalError>;
}

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
/// Refresh the OAuth token this long before PayPal says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503 | 504)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<LinkDescription>,
}

#[derive(Debug, Deserialize)]
struct LinkDescription {
    href: String,
    rel: String,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct PayPalClient {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    return_url: String,
    cancel_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl PayPalClient {
    pub fn new(
        base_url: String,
        client_id: String,
        client_secret: String,
        return_url: String,
        cancel_url: String,
    ) -> Result<Self, PayPalError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| PayPalError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            return_url,
            cancel_url,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, PayPalError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(PayPalError::InvalidConfig(
                "PayPal client credentials are not configured".to_string(),
            ));
        }

        let resp = self
            .send_with_retry(|| {
                self.client
                    .post(format!("{}/v1/oauth2/token", self.base_url))
                    .basic_auth(&self.client_id, Some(&self.client_secret))
                    .form(&[("grant_type", "client_credentials")])
            })
            .await?;

        if !resp.status().is_success() {
            let error_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PayPalError::AuthFailed(error_text));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| PayPalError::InvalidResponse(e.to_string()))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }

    async fn send_with_retry<F>(&self, mut request_builder: F) -> Result<reqwest::Response, PayPalError>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut last_error: Option<String> = None;

        for attempt in 0..MAX_RETRIES {
            match request_builder().send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    if status == 429 {
                        return Err(PayPalError::RateLimited);
                    }

                    if is_retryable_status(status) && attempt < MAX_RETRIES - 1 {
                        warn!(status, attempt, "PayPal returned a retryable status");
                        sleep(Duration::from_millis(INITIAL_BACKOFF_MS * 2_u64.pow(attempt))).await;
                        continue;
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    if attempt < MAX_RETRIES - 1 {
                        sleep(Duration::from_millis(INITIAL_BACKOFF_MS * 2_u64.pow(attempt))).await;
                    }
                }
            }
        }

        Err(PayPalError::RequestFailed(
            last_error.unwrap_or_else(|| "Max retries exceeded".to_string()),
        ))
    }
}

#[async_trait]
impl PaymentGateway for PayPalClient {
    async fn create_order(
        &self,
        reference_id: &str,
        currency_code: &str,
        amount: &str,
    ) -> Result<CreatedPayment, PayPalError> {
        let token = self.access_token().await?;
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": reference_id,
                "amount": { "currency_code": currency_code, "value": amount },
            }],
            "application_context": {
                "return_url": self.return_url,
                "cancel_url": self.cancel_url,
                "user_action": "PAY_NOW",
            },
        });

        let resp = self
            .send_with_retry(|| {
                self.client
                    .post(format!("{}/v2/checkout/orders", self.base_url))
                    .bearer_auth(&token)
                    // Lets PayPal deduplicate retried creates for the same checkout.
                    .header("PayPal-Request-Id", reference_id)
                    .json(&body)
            })
            .await?;

        if !resp.status().is_success() {
            let error_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PayPalError::RequestFailed(error_text));
        }

        let order: OrderResponse = resp
            .json()
            .await
            .map_err(|e| PayPalError::InvalidResponse(e.to_string()))?;

        info!(paypal_order_id = %order.id, status = %order.status, "Created PayPal order");
        Ok(CreatedPayment {
            approve_url: approve_link(&order.links),
            provider_order_id: order.id,
        })
    }

    async fn capture_order(&self, provider_order_id: &str) -> Result<CapturedPayment, PayPalError> {
        let token = self.access_token().await?;

        let resp = self
            .send_with_retry(|| {
                self.client
                    .post(format!(
                        "{}/v2/checkout/orders/{}/capture",
                        self.base_url, provider_order_id
                    ))
                    .bearer_auth(&token)
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("PayPal-Request-Id", format!("capture-{}", provider_order_id))
            })
            .await?;

        match resp.status().as_u16() {
            404 => return Err(PayPalError::NotFound(provider_order_id.to_string())),
            422 => {
                let error_text = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unprocessable".to_string());
                return unprocessable_capture(provider_order_id, &error_text);
            }
            s if !(200..300).contains(&s) => {
                let error_text = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(PayPalError::RequestFailed(error_text));
            }
            _ => {}
        }

        let order: OrderResponse = resp
            .json()
            .await
            .map_err(|e| PayPalError::InvalidResponse(e.to_string()))?;

        Ok(CapturedPayment {
            completed: order.status == "COMPLETED",
            provider_order_id: order.id,
            status: order.status,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    issue: String,
}

/// A 422 on capture is a decline, except ORDER_ALREADY_CAPTURED, which means
/// an earlier attempt already settled the order.
fn unprocessable_capture(provider_order_id: &str, body: &str) -> Result<CapturedPayment, PayPalError> {
    let issues: Vec<String> = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.details.into_iter().map(|d| d.issue).collect())
        .unwrap_or_default();

    if issues.iter().any(|issue| issue == "ORDER_ALREADY_CAPTURED") {
        return Ok(CapturedPayment {
            provider_order_id: provider_order_id.to_string(),
            completed: true,
            status: "COMPLETED".to_string(),
        });
    }

    Err(PayPalError::CaptureDeclined(
        issues.into_iter().next().unwrap_or_else(|| body.to_string()),
    ))
}

fn approve_link(links: &[LinkDescription]) -> Option<String> {
    links
        .iter()
        .find(|l| l.rel == "approve" || l.rel == "payer-action")
        .map(|l| l.href.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_response_exposes_approve_link() {
        let order: OrderResponse = serde_json::from_value(json!({
            "id": "5O190127TN364715T",
            "status": "CREATED",
            "links": [
                { "href": "https://api.paypal.com/v2/checkout/orders/5O1", "rel": "self", "method": "GET" },
                { "href": "https://www.paypal.com/checkoutnow?token=5O1", "rel": "approve", "method": "GET" }
            ]
        }))
        .unwrap();

        assert_eq!(
            approve_link(&order.links).as_deref(),
            Some("https://www.paypal.com/checkoutnow?token=5O1")
        );
    }

    #[test]
    fn order_response_without_links_has_no_approve_link() {
        let order: OrderResponse =
            serde_json::from_value(json!({ "id": "X", "status": "COMPLETED" })).unwrap();
        assert!(approve_link(&order.links).is_none());
    }

    #[test]
    fn already_captured_order_counts_as_completed() {
        let body = json!({
            "name": "UNPROCESSABLE_ENTITY",
            "details": [{ "issue": "ORDER_ALREADY_CAPTURED", "description": "Order already captured." }],
            "debug_id": "b1d1f06c7246c"
        })
        .to_string();

        let captured = unprocessable_capture("5O190127TN364715T", &body).unwrap();
        assert!(captured.completed);
        assert_eq!(captured.provider_order_id, "5O190127TN364715T");
        assert_eq!(captured.status, "COMPLETED");
    }

    #[test]
    fn other_unprocessable_captures_are_declines() {
        let body = json!({
            "name": "UNPROCESSABLE_ENTITY",
            "details": [{ "issue": "INSTRUMENT_DECLINED" }]
        })
        .to_string();
        assert!(matches!(
            unprocessable_capture("X", &body),
            Err(PayPalError::CaptureDeclined(ref issue)) if issue == "INSTRUMENT_DECLINED"
        ));

        assert!(matches!(
            unprocessable_capture("X", "Unprocessable"),
            Err(PayPalError::CaptureDeclined(ref text)) if text == "Unprocessable"
        ));
    }

    #[test]
    fn retryable_statuses_are_server_errors_only() {
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(422));
        assert!(!is_retryable_status(429));
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_request() {
        let client = PayPalClient::new(
            "https://api-m.sandbox.paypal.com".to_string(),
            String::new(),
            String::new(),
            "http://localhost/ok".to_string(),
            "http://localhost/cancel".to_string(),
        )
        .unwrap();

        let err = client.capture_order("ABC").await.unwrap_err();
        assert!(matches!(err, PayPalError::InvalidConfig(_)));
    }
}
