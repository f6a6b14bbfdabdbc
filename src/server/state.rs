use crate::application::{CheckoutService, ImportCostService, RateTables, SubscriptionService};
use crate::infrastructure::{
    AppConfig, CredentialCipher, PayPalClient, PaymentGateway, PostgresAccountRepository,
    PostgresOfferRepository, PostgresOrderRepository, PostgresPlatformRepository,
    PostgresSubscriptionRepository, PostgresWarehouseRepository,
};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

pub type SubscriptionServiceType = SubscriptionService<
    PostgresAccountRepository,
    PostgresSubscriptionRepository,
    PostgresOfferRepository,
>;

pub type ImportCostServiceType = ImportCostService<PostgresWarehouseRepository>;

pub type CheckoutServiceType = CheckoutService<
    PostgresOrderRepository,
    PostgresAccountRepository,
    PostgresSubscriptionRepository,
    PostgresOfferRepository,
>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub admin_token: String,
    pub cipher: Arc<CredentialCipher>,
    pub platform_repo: Arc<PostgresPlatformRepository>,
    pub account_repo: Arc<PostgresAccountRepository>,
    pub offer_repo: Arc<PostgresOfferRepository>,
    pub warehouse_repo: Arc<PostgresWarehouseRepository>,
    pub subscriptions: Arc<SubscriptionServiceType>,
    pub import_cost: Arc<ImportCostServiceType>,
    pub checkout: Arc<CheckoutServiceType>,
}

/// Build full state from config + an existing pool.
///
/// Intended for embedding into a larger service that already manages a `PgPool`.
pub async fn build_state_with_pool(
    config: AppConfig,
    pool: PgPool,
    run_migrations: bool,
) -> anyhow::Result<AppState> {
    if run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
    }

    let cipher = Arc::new(
        CredentialCipher::new(&config.encryption_key).context("init credential encryption")?,
    );

    let payments: Arc<dyn PaymentGateway> = Arc::new(
        PayPalClient::new(
            config.paypal_base_url,
            config.paypal_client_id,
            config.paypal_client_secret,
            config.paypal_return_url,
            config.paypal_cancel_url,
        )
        .context("init PayPal client")?,
    );

    let platform_repo = Arc::new(PostgresPlatformRepository::new(pool.clone()));
    let account_repo = Arc::new(PostgresAccountRepository::new(pool.clone()));
    let offer_repo = Arc::new(PostgresOfferRepository::new(pool.clone()));
    let warehouse_repo = Arc::new(PostgresWarehouseRepository::new(pool.clone()));
    let subscription_repo = Arc::new(PostgresSubscriptionRepository::new(pool.clone()));
    let order_repo = Arc::new(PostgresOrderRepository::new(pool.clone()));

    let tables = RateTables::default();

    let subscriptions = Arc::new(SubscriptionService::new(
        account_repo.clone(),
        subscription_repo,
        offer_repo.clone(),
        cipher.clone(),
    ));

    let import_cost = Arc::new(ImportCostService::new(warehouse_repo.clone(), tables.clone()));

    let checkout = Arc::new(CheckoutService::new(
        order_repo,
        offer_repo.clone(),
        payments,
        subscriptions.clone(),
        tables,
    ));

    Ok(AppState {
        pool,
        admin_token: config.admin_token,
        cipher,
        platform_repo,
        account_repo,
        offer_repo,
        warehouse_repo,
        subscriptions,
        import_cost,
        checkout,
    })
}

/// Build state for the standalone server.
///
/// Creates the `PgPool`, runs migrations, and wires repositories/services.
pub async fn build_state_from_env(config: AppConfig) -> anyhow::Result<AppState> {
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("connect database")?;
    build_state_with_pool(config, pool, true).await
}
