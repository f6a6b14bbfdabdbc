use crate::application::import_cost::RateTables;
use crate::application::subscriptions::{validate_email, SubscriptionDetails, SubscriptionError, SubscriptionService};
use crate::domain::{Currency, Order, OrderStatus};
use crate::infrastructure::{
    AccountRepository, OfferRepository, OrderRepository, PayPalError, PaymentGateway,
    RepositoryError, SubscriptionRepository,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Currency sent to PayPal, which does not settle in ariary.
pub const PAYMENT_CURRENCY: Currency = Currency::Usd;

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Payment provider error: {0}")]
    Payment(#[from] PayPalError),
    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),
    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),
    #[error("Invalid order state: {0}")]
    InvalidState(OrderStatus),
    #[error("Payment was not completed: {0}")]
    PaymentDeclined(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub order: Order,
    pub approve_url: Option<String>,
    pub payment_currency: Currency,
    pub payment_amount: String,
}

pub struct CheckoutService<R, A, S, O>
where
    R: OrderRepository,
    A: AccountRepository,
    S: SubscriptionRepository,
    O: OfferRepository,
{
    order_repo: Arc<R>,
    offer_repo: Arc<O>,
    payments: Arc<dyn PaymentGateway>,
    subscriptions: Arc<SubscriptionService<A, S, O>>,
    tables: RateTables,
}

impl<R, A, S, O> CheckoutService<R, A, S, O>
where
    R: OrderRepository,
    A: AccountRepository,
    S: SubscriptionRepository,
    O: OfferRepository,
{
    pub fn new(
        order_repo: Arc<R>,
        offer_repo: Arc<O>,
        payments: Arc<dyn PaymentGateway>,
        subscriptions: Arc<SubscriptionService<A, S, O>>,
        tables: RateTables,
    ) -> Self {
        Self {
            order_repo,
            offer_repo,
            payments,
            subscriptions,
            tables,
        }
    }

    /// Opens a pending order for an offer and the matching PayPal order.
    pub async fn start(
        &self,
        offer_id: Uuid,
        customer_email: &str,
        profile_count: Option<i32>,
    ) -> Result<CheckoutSession, CheckoutError> {
        validate_email(customer_email)?;

        let offer = match self.offer_repo.get_by_id(offer_id).await {
            Ok(offer) => offer,
            Err(RepositoryError::NotFound(_)) => {
                return Err(SubscriptionError::OfferNotFound(offer_id).into())
            }
            Err(e) => return Err(e.into()),
        };
        if !offer.active {
            return Err(SubscriptionError::OfferInactive(offer_id).into());
        }
        let count = offer.resolve_profile_count(profile_count).ok_or(
            SubscriptionError::InvalidProfileCount {
                requested: profile_count.unwrap_or(offer.max_profiles),
                max: offer.max_profiles,
            },
        )?;
        if offer.price_mga <= 0 {
            return Err(CheckoutError::InvalidInput(
                "Free offers cannot go through checkout".to_string(),
            ));
        }

        let amount = self.payment_amount(offer.price_mga)?;
        let mut order = Order::new(offer.id, customer_email.to_string(), count, offer.price_mga);
        self.order_repo.create(&order).await?;

        let payment = match self
            .payments
            .create_order(&order.id.to_string(), &PAYMENT_CURRENCY.to_string(), &amount)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Failed to create PayPal order");
                self.order_repo.mark_failed(order.id).await?;
                return Err(e.into());
            }
        };

        self.order_repo
            .set_paypal_order_id(order.id, &payment.provider_order_id)
            .await?;
        order.paypal_order_id = Some(payment.provider_order_id);

        info!(order_id = %order.id, offer_id = %offer.id, amount = %amount, "Checkout started");
        Ok(CheckoutSession {
            order,
            approve_url: payment.approve_url,
            payment_currency: PAYMENT_CURRENCY,
            payment_amount: amount,
        })
    }

    /// Captures the approved PayPal order and fulfils the subscription.
    pub async fn capture(&self, order_id: Uuid) -> Result<SubscriptionDetails, CheckoutError> {
        let order = match self.order_repo.get_by_id(order_id).await {
            Ok(order) => order,
            Err(RepositoryError::NotFound(_)) => return Err(CheckoutError::OrderNotFound(order_id)),
            Err(e) => return Err(e.into()),
        };
        if order.status != OrderStatus::Pending {
            return Err(CheckoutError::InvalidState(order.status));
        }
        let provider_order_id = order
            .paypal_order_id
            .clone()
            .ok_or(CheckoutError::InvalidState(order.status))?;

        // Only the caller that wins the claim talks to PayPal for this order.
        match self.order_repo.claim_for_capture(order_id).await {
            Ok(()) => {}
            Err(RepositoryError::Conflict(_)) => {
                let status = self
                    .order_repo
                    .get_by_id(order_id)
                    .await
                    .map(|current| current.status)
                    .unwrap_or(OrderStatus::Capturing);
                return Err(CheckoutError::InvalidState(status));
            }
            Err(e) => return Err(e.into()),
        }

        let captured = match self.payments.capture_order(&provider_order_id).await {
            Ok(c) => c,
            Err(PayPalError::CaptureDeclined(reason)) => {
                warn!(%order_id, %reason, "PayPal declined capture");
                self.order_repo.mark_failed(order_id).await?;
                return Err(CheckoutError::PaymentDeclined(reason));
            }
            Err(e) => {
                if let Err(release) = self.order_repo.release_capture(order_id).await {
                    error!(%order_id, error = %release, "Could not release capture claim");
                }
                return Err(e.into());
            }
        };

        if !captured.completed {
            warn!(%order_id, status = %captured.status, "PayPal capture not completed");
            self.order_repo.mark_failed(order_id).await?;
            return Err(CheckoutError::PaymentDeclined(captured.status));
        }

        match self
            .subscriptions
            .purchase(order.offer_id, &order.customer_email, Some(order.profile_count))
            .await
        {
            Ok(details) => {
                self.order_repo
                    .mark_paid(order_id, Some(details.subscription.id))
                    .await?;
                info!(
                    %order_id,
                    subscription_id = %details.subscription.id,
                    "Order paid and fulfilled"
                );
                Ok(details)
            }
            Err(e) => {
                error!(%order_id, error = %e, "Payment captured but no profiles could be assigned");
                self.order_repo.mark_paid(order_id, None).await?;
                Err(e.into())
            }
        }
    }

    fn payment_amount(&self, price_mga: i64) -> Result<String, CheckoutError> {
        let amount = self
            .tables
            .convert(price_mga as f64, Currency::Mga, PAYMENT_CURRENCY)
            .map_err(|e| CheckoutError::InvalidInput(e.to_string()))?;
        // PayPal rejects amounts below one cent.
        Ok(format!("{:.2}", amount.max(0.01)))
    }
}
