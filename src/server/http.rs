use super::http_auth::require_admin;
use super::http_errors::{
    map_checkout_error, map_import_cost_error, map_repository_error, map_subscription_error,
};
use super::http_parse::{parse_account_status, parse_currency, validate_warehouse_rates};
use super::http_types::*;
use super::state::AppState;
use crate::domain::{Account, Offer, Platform, Warehouse};
use crate::infrastructure::{
    AccountRepository, OfferRepository, PlatformRepository, RepositoryError, WarehouseRepository,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;
use validator::Validate;

const MAX_PAGINATION_LIMIT: i64 = 1000;
const MAX_ACCOUNT_PROFILES: i32 = 10;

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/platforms", post(create_platform).get(list_platforms))
        .route("/accounts", post(create_account).get(list_accounts))
        .route("/accounts/:id", get(get_account))
        .route("/accounts/:id/status", post(update_account_status))
        .route("/offers", post(create_offer).get(list_offers))
        .route("/subscriptions", post(create_subscription).get(list_subscriptions))
        .route("/subscriptions/expire", post(expire_subscriptions))
        .route(
            "/subscriptions/:id",
            get(get_subscription).delete(cancel_subscription),
        )
        .route("/warehouses", post(create_warehouse).get(list_warehouses))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/public/offers", get(list_public_offers))
        .route("/api/public/import-cost", post(quote_import_cost))
        .route("/api/public/checkout", post(start_checkout))
        .route("/api/public/checkout/:id/capture", post(capture_checkout))
        .nest("/api/admin", admin)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        list_public_offers,
        quote_import_cost,
        start_checkout,
        capture_checkout,
        create_platform,
        list_platforms,
        create_account,
        list_accounts,
        get_account,
        update_account_status,
        create_offer,
        list_offers,
        create_subscription,
        list_subscriptions,
        get_subscription,
        cancel_subscription,
        expire_subscriptions,
        create_warehouse,
        list_warehouses,
    ),
    components(
        schemas(
            HealthResponse,
            CreatePlatformRequest,
            PlatformResponse,
            CreateAccountRequest,
            UpdateAccountStatusRequest,
            AccountResponse,
            AccountProfileResponse,
            CreateOfferRequest,
            OfferResponse,
            PurchaseRequest,
            SubscriptionResponse,
            SubscriptionProfileResponse,
            PlatformAccessResponse,
            SubscriptionDetailsResponse,
            ExpireResponse,
            CreateWarehouseRequest,
            WarehouseResponse,
            ImportCostRequest,
            ImportCostResponse,
            CheckoutResponse,
        )
    ),
    modifiers(&AdminTokenAddon),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Storefront", description = "Public catalogue, import quotes and checkout"),
        (name = "Catalog", description = "Platforms, accounts and offers"),
        (name = "Subscriptions", description = "Profile assignment and subscription lifecycle"),
        (name = "Warehouses", description = "Import warehouse configuration"),
    ),
    info(
        title = "Streamshop API",
        version = "0.1.0",
        description = "Shared streaming account profiles and import cost quotes",
        license(name = "MIT OR Apache-2.0")
    )
)]
struct ApiDoc;

struct AdminTokenAddon;

impl Modify for AdminTokenAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "admin_token",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

fn error_body(msg: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": msg }))
}

/// Health check endpoint
///
/// Verifies database connectivity and returns service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    )
)]
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                error: None,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Health check failed: DB connectivity issue");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    error: Some("Database connectivity failed".to_string()),
                }),
            )
        }
    }
}

/// Offers currently on sale
#[utoipa::path(
    get,
    path = "/api/public/offers",
    tag = "Storefront",
    responses(
        (status = 200, description = "Active offers", body = [OfferResponse]),
        (status = 500, description = "Failed to list offers", body = Object)
    )
)]
async fn list_public_offers(State(state): State<AppState>) -> impl IntoResponse {
    match state.offer_repo.list(true).await {
        Ok(offers) => {
            let body: Vec<OfferResponse> = offers.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(serde_json::json!(body)))
        }
        Err(e) => {
            error!(error = %e, "Failed to list offers");
            let (status, body) = map_repository_error(&e, "Offer");
            (status, Json(body))
        }
    }
}

/// Estimate the landed cost of a supplier purchase
///
/// Unknown warehouses are quoted with default rates and flagged in the response.
#[utoipa::path(
    post,
    path = "/api/public/import-cost",
    tag = "Storefront",
    request_body = ImportCostRequest,
    responses(
        (status = 200, description = "Cost breakdown", body = ImportCostResponse),
        (status = 400, description = "Invalid price, weight or currency", body = Object)
    )
)]
async fn quote_import_cost(
    State(state): State<AppState>,
    Json(req): Json<ImportCostRequest>,
) -> impl IntoResponse {
    let currency = match parse_currency(&req.supplier_currency) {
        Some(c) => c,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "Invalid supplier_currency",
                    "allowed": ["MGA", "EUR", "USD", "CNY", "AED"]
                })),
            );
        }
    };
    let Some(price) = req.supplier_price.value() else {
        return (StatusCode::BAD_REQUEST, error_body("Invalid supplier_price"));
    };
    let Some(weight) = req.weight_kg.value() else {
        return (StatusCode::BAD_REQUEST, error_body("Invalid weight_kg"));
    };

    match state.import_cost.quote(price, currency, weight, &req.warehouse).await {
        Ok(breakdown) => (
            StatusCode::OK,
            Json(serde_json::json!(ImportCostResponse::from(breakdown))),
        ),
        Err(e) => {
            error!(error = %e, "Failed to quote import cost");
            let (status, body) = map_import_cost_error(&e);
            (status, Json(body))
        }
    }
}

/// Start a PayPal checkout for an offer
#[utoipa::path(
    post,
    path = "/api/public/checkout",
    tag = "Storefront",
    request_body = PurchaseRequest,
    responses(
        (status = 201, description = "Pending order with PayPal approval link", body = CheckoutResponse),
        (status = 400, description = "Invalid offer, email or profile count", body = Object),
        (status = 404, description = "Offer not found", body = Object),
        (status = 502, description = "PayPal unavailable", body = Object)
    )
)]
async fn start_checkout(
    State(state): State<AppState>,
    Json(req): Json<PurchaseRequest>,
) -> impl IntoResponse {
    match state
        .checkout
        .start(req.offer_id, &req.customer_email, req.profile_count)
        .await
    {
        Ok(session) => (
            StatusCode::CREATED,
            Json(serde_json::json!(CheckoutResponse::from(session))),
        ),
        Err(e) => {
            error!(error = %e, offer_id = %req.offer_id, "Failed to start checkout");
            let (status, body) = map_checkout_error(&e);
            (status, Json(body))
        }
    }
}

/// Capture an approved PayPal order and assign the purchased profiles
#[utoipa::path(
    post,
    path = "/api/public/checkout/{id}/capture",
    tag = "Storefront",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Subscription with account access", body = SubscriptionDetailsResponse),
        (status = 400, description = "Order not pending or payment declined", body = Object),
        (status = 404, description = "Order not found or no free profiles", body = Object),
        (status = 409, description = "Profiles taken concurrently", body = Object)
    )
)]
async fn capture_checkout(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.checkout.capture(id).await {
        Ok(details) => (
            StatusCode::OK,
            Json(serde_json::json!(SubscriptionDetailsResponse::from(details))),
        ),
        Err(e) => {
            error!(error = %e, order_id = %id, "Failed to capture checkout");
            let (status, body) = map_checkout_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/admin/platforms",
    tag = "Catalog",
    request_body = CreatePlatformRequest,
    security(("admin_token" = [])),
    responses(
        (status = 201, description = "Platform created", body = PlatformResponse),
        (status = 400, description = "Empty name", body = Object),
        (status = 409, description = "Platform already exists", body = Object)
    )
)]
async fn create_platform(
    State(state): State<AppState>,
    Json(req): Json<CreatePlatformRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, error_body("Platform name is required"));
    }

    let platform = Platform::new(req.name);
    if let Err(e) = state.platform_repo.create(&platform).await {
        error!(error = %e, "Failed to create platform");
        let (status, body) = map_repository_error(&e, "Platform");
        return (status, Json(body));
    }

    info!(platform_id = %platform.id, name = %platform.name, "Created platform");
    (
        StatusCode::CREATED,
        Json(serde_json::json!(PlatformResponse::from(platform))),
    )
}

#[utoipa::path(
    get,
    path = "/api/admin/platforms",
    tag = "Catalog",
    security(("admin_token" = [])),
    responses((status = 200, description = "All platforms", body = [PlatformResponse]))
)]
async fn list_platforms(State(state): State<AppState>) -> impl IntoResponse {
    match state.platform_repo.list().await {
        Ok(platforms) => {
            let body: Vec<PlatformResponse> = platforms.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(serde_json::json!(body)))
        }
        Err(e) => {
            error!(error = %e, "Failed to list platforms");
            let (status, body) = map_repository_error(&e, "Platform");
            (status, Json(body))
        }
    }
}

/// Register a shared streaming account
///
/// The password is encrypted before it is stored and one profile slot is
/// created per `max_profiles`, the first named "Principal".
#[utoipa::path(
    post,
    path = "/api/admin/accounts",
    tag = "Catalog",
    request_body = CreateAccountRequest,
    security(("admin_token" = [])),
    responses(
        (status = 201, description = "Account created with its profiles", body = AccountResponse),
        (status = 400, description = "Invalid login or profile count", body = Object),
        (status = 404, description = "Platform not found", body = Object),
        (status = 409, description = "Login already registered on the platform", body = Object)
    )
)]
async fn create_account(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountRequest>,
) -> impl IntoResponse {
    let login = req.login.trim().to_string();
    if login.is_empty() || req.password.is_empty() {
        return (StatusCode::BAD_REQUEST, error_body("Login and password are required"));
    }
    if !(1..=MAX_ACCOUNT_PROFILES).contains(&req.max_profiles) {
        return (
            StatusCode::BAD_REQUEST,
            error_body(&format!("max_profiles must be between 1 and {}", MAX_ACCOUNT_PROFILES)),
        );
    }
    if req.profile_names.len() > req.max_profiles as usize {
        return (StatusCode::BAD_REQUEST, error_body("More profile names than profiles"));
    }

    if let Err(e) = state.platform_repo.get_by_id(req.platform_id).await {
        let (status, body) = map_repository_error(&e, "Platform");
        return (status, Json(body));
    }

    let password_encrypted = match state.cipher.encrypt(&req.password) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "Failed to encrypt account password");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("Failed to create account"),
            );
        }
    };

    let account = Account::new(req.platform_id, login, password_encrypted, req.max_profiles);
    let profiles = account.build_profiles(&req.profile_names);
    if let Err(e) = state.account_repo.create(&account, &profiles).await {
        error!(error = %e, "Failed to create account");
        let (status, body) = map_repository_error(&e, "Account");
        return (status, Json(body));
    }

    info!(
        account_id = %account.id,
        platform_id = %account.platform_id,
        profiles = profiles.len(),
        "Created account"
    );
    let mut response = AccountResponse::from(account);
    response.profiles = Some(profiles.into_iter().map(Into::into).collect());
    (StatusCode::CREATED, Json(serde_json::json!(response)))
}

#[utoipa::path(
    get,
    path = "/api/admin/accounts",
    tag = "Catalog",
    params(AccountListParams),
    security(("admin_token" = [])),
    responses((status = 200, description = "Accounts", body = [AccountResponse]))
)]
async fn list_accounts(
    State(state): State<AppState>,
    Query(params): Query<AccountListParams>,
) -> impl IntoResponse {
    match state.account_repo.list(params.platform_id).await {
        Ok(accounts) => {
            let body: Vec<AccountResponse> = accounts.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(serde_json::json!(body)))
        }
        Err(e) => {
            error!(error = %e, "Failed to list accounts");
            let (status, body) = map_repository_error(&e, "Account");
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/accounts/{id}",
    tag = "Catalog",
    params(("id" = Uuid, Path, description = "Account ID")),
    security(("admin_token" = [])),
    responses(
        (status = 200, description = "Account with profile occupancy", body = AccountResponse),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn get_account(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let result = async {
        let account = state.account_repo.get_by_id(id).await?;
        let profiles = state.account_repo.list_profiles(id).await?;
        Ok::<_, RepositoryError>((account, profiles))
    }
    .await;

    match result {
        Ok((account, profiles)) => {
            let mut response = AccountResponse::from(account);
            response.profiles = Some(profiles.into_iter().map(Into::into).collect());
            (StatusCode::OK, Json(serde_json::json!(response)))
        }
        Err(e) => {
            let (status, body) = map_repository_error(&e, "Account");
            (status, Json(body))
        }
    }
}

/// Enable or disable an account
///
/// Disabled accounts keep their current assignments but receive no new ones.
#[utoipa::path(
    post,
    path = "/api/admin/accounts/{id}/status",
    tag = "Catalog",
    params(("id" = Uuid, Path, description = "Account ID")),
    request_body = UpdateAccountStatusRequest,
    security(("admin_token" = [])),
    responses(
        (status = 200, description = "Status updated", body = Object),
        (status = 400, description = "Unknown status", body = Object),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn update_account_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAccountStatusRequest>,
) -> impl IntoResponse {
    let status = match parse_account_status(&req.status) {
        Some(s) => s,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "Invalid status",
                    "allowed": ["active", "disabled"]
                })),
            );
        }
    };

    match state.account_repo.update_status(id, status).await {
        Ok(()) => {
            info!(account_id = %id, %status, "Updated account status");
            (
                StatusCode::OK,
                Json(serde_json::json!({ "id": id, "status": status.to_string() })),
            )
        }
        Err(e) => {
            let (code, body) = map_repository_error(&e, "Account");
            (code, Json(body))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/admin/offers",
    tag = "Catalog",
    request_body = CreateOfferRequest,
    security(("admin_token" = [])),
    responses(
        (status = 201, description = "Offer created", body = OfferResponse),
        (status = 400, description = "Invalid offer fields", body = Object),
        (status = 404, description = "Platform not found", body = Object)
    )
)]
async fn create_offer(
    State(state): State<AppState>,
    Json(req): Json<CreateOfferRequest>,
) -> impl IntoResponse {
    let mut platform_ids = req.platform_ids;
    platform_ids.sort();
    platform_ids.dedup();

    let offer = Offer::new(
        req.name,
        req.price_mga,
        req.duration_months,
        req.max_profiles,
        platform_ids,
    );
    if let Err(e) = offer.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Invalid offer", "details": e.to_string() })),
        );
    }

    for platform_id in &offer.platform_ids {
        if let Err(e) = state.platform_repo.get_by_id(*platform_id).await {
            let (status, body) = map_repository_error(&e, "Platform");
            return (status, Json(body));
        }
    }

    if let Err(e) = state.offer_repo.create(&offer).await {
        error!(error = %e, "Failed to create offer");
        let (status, body) = map_repository_error(&e, "Offer");
        return (status, Json(body));
    }

    info!(offer_id = %offer.id, name = %offer.name, "Created offer");
    (StatusCode::CREATED, Json(serde_json::json!(OfferResponse::from(offer))))
}

#[utoipa::path(
    get,
    path = "/api/admin/offers",
    tag = "Catalog",
    security(("admin_token" = [])),
    responses((status = 200, description = "All offers, including inactive ones", body = [OfferResponse]))
)]
async fn list_offers(State(state): State<AppState>) -> impl IntoResponse {
    match state.offer_repo.list(false).await {
        Ok(offers) => {
            let body: Vec<OfferResponse> = offers.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(serde_json::json!(body)))
        }
        Err(e) => {
            error!(error = %e, "Failed to list offers");
            let (status, body) = map_repository_error(&e, "Offer");
            (status, Json(body))
        }
    }
}

/// Sell an offer directly, bypassing payment
#[utoipa::path(
    post,
    path = "/api/admin/subscriptions",
    tag = "Subscriptions",
    request_body = PurchaseRequest,
    security(("admin_token" = [])),
    responses(
        (status = 201, description = "Subscription created and profiles assigned", body = SubscriptionDetailsResponse),
        (status = 400, description = "Invalid profile count, email or inactive offer", body = Object),
        (status = 404, description = "Offer not found or no account with enough free profiles", body = Object),
        (status = 409, description = "Profiles taken concurrently", body = Object)
    )
)]
async fn create_subscription(
    State(state): State<AppState>,
    Json(req): Json<PurchaseRequest>,
) -> impl IntoResponse {
    match state
        .subscriptions
        .purchase(req.offer_id, &req.customer_email, req.profile_count)
        .await
    {
        Ok(details) => (
            StatusCode::CREATED,
            Json(serde_json::json!(SubscriptionDetailsResponse::from(details))),
        ),
        Err(e) => {
            error!(error = %e, offer_id = %req.offer_id, "Failed to create subscription");
            let (status, body) = map_subscription_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/subscriptions",
    tag = "Subscriptions",
    params(PaginationParams),
    security(("admin_token" = [])),
    responses((status = 200, description = "Subscriptions, newest first", body = [SubscriptionResponse]))
)]
async fn list_subscriptions(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let limit = params.limit.clamp(1, MAX_PAGINATION_LIMIT);
    let offset = params.offset.max(0);

    match state.subscriptions.list(limit, offset).await {
        Ok(subscriptions) => {
            let body: Vec<SubscriptionResponse> = subscriptions.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(serde_json::json!(body)))
        }
        Err(e) => {
            error!(error = %e, "Failed to list subscriptions");
            let (status, body) = map_subscription_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/subscriptions/{id}",
    tag = "Subscriptions",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    security(("admin_token" = [])),
    responses(
        (status = 200, description = "Subscription with its profiles", body = SubscriptionDetailsResponse),
        (status = 404, description = "Subscription not found", body = Object)
    )
)]
async fn get_subscription(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.subscriptions.get(id).await {
        Ok(details) => (
            StatusCode::OK,
            Json(serde_json::json!(SubscriptionDetailsResponse::from(details))),
        ),
        Err(e) => {
            let (status, body) = map_subscription_error(&e);
            (status, Json(body))
        }
    }
}

/// Cancel a subscription and free its profiles
#[utoipa::path(
    delete,
    path = "/api/admin/subscriptions/{id}",
    tag = "Subscriptions",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    security(("admin_token" = [])),
    responses(
        (status = 200, description = "Subscription cancelled", body = Object),
        (status = 400, description = "Subscription is not active", body = Object),
        (status = 404, description = "Subscription not found", body = Object)
    )
)]
async fn cancel_subscription(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.subscriptions.cancel(id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "id": id, "status": "cancelled" })),
        ),
        Err(e) => {
            let (status, body) = map_subscription_error(&e);
            (status, Json(body))
        }
    }
}

/// Expire every subscription past its end date now
#[utoipa::path(
    post,
    path = "/api/admin/subscriptions/expire",
    tag = "Subscriptions",
    security(("admin_token" = [])),
    responses((status = 200, description = "Subscriptions that were expired", body = ExpireResponse))
)]
async fn expire_subscriptions(State(state): State<AppState>) -> impl IntoResponse {
    match state.subscriptions.expire_due(Utc::now()).await {
        Ok(expired) => (
            StatusCode::OK,
            Json(serde_json::json!(ExpireResponse {
                expired: expired.into_iter().map(Into::into).collect(),
            })),
        ),
        Err(e) => {
            error!(error = %e, "Failed to expire subscriptions");
            let (status, body) = map_subscription_error(&e);
            (status, Json(body))
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/admin/warehouses",
    tag = "Warehouses",
    request_body = CreateWarehouseRequest,
    security(("admin_token" = [])),
    responses(
        (status = 201, description = "Warehouse created", body = WarehouseResponse),
        (status = 400, description = "Invalid currency or rates", body = Object),
        (status = 409, description = "Warehouse code already used", body = Object)
    )
)]
async fn create_warehouse(
    State(state): State<AppState>,
    Json(req): Json<CreateWarehouseRequest>,
) -> impl IntoResponse {
    let Some(currency) = parse_currency(&req.currency) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Invalid currency",
                "allowed": ["MGA", "EUR", "USD", "CNY", "AED"]
            })),
        );
    };
    if req.code.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, error_body("Warehouse code is required"));
    }
    if let Err(msg) =
        validate_warehouse_rates(req.transport_rate_per_kg, req.processing_fee, req.tax_rate)
    {
        return (StatusCode::BAD_REQUEST, error_body(msg));
    }

    let warehouse = Warehouse::new(
        req.code,
        req.name,
        currency,
        req.transport_rate_per_kg,
        req.processing_fee,
        req.tax_rate,
    );
    if let Err(e) = state.warehouse_repo.create(&warehouse).await {
        error!(error = %e, "Failed to create warehouse");
        let (status, body) = map_repository_error(&e, "Warehouse");
        return (status, Json(body));
    }

    info!(code = %warehouse.code, %currency, "Created warehouse");
    (
        StatusCode::CREATED,
        Json(serde_json::json!(WarehouseResponse::from(warehouse))),
    )
}

#[utoipa::path(
    get,
    path = "/api/admin/warehouses",
    tag = "Warehouses",
    security(("admin_token" = [])),
    responses((status = 200, description = "Configured warehouses", body = [WarehouseResponse]))
)]
async fn list_warehouses(State(state): State<AppState>) -> impl IntoResponse {
    match state.warehouse_repo.list().await {
        Ok(warehouses) => {
            let body: Vec<WarehouseResponse> = warehouses.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(serde_json::json!(body)))
        }
        Err(e) => {
            error!(error = %e, "Failed to list warehouses");
            let (status, body) = map_repository_error(&e, "Warehouse");
            (status, Json(body))
        }
    }
}
