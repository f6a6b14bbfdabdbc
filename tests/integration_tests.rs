//! Integration tests for streamshop
//! Profile allocation, subscription lifecycle and PayPal checkout, run
//! against in-memory repositories.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use streamshop::{
    application::{
        CheckoutError, CheckoutService, RateTables, SubscriptionError, SubscriptionService,
    },
    domain::{
        Account, AccountAvailability, AccountProfile, AccountStatus, Offer, Order, OrderStatus,
        Subscription, SubscriptionProfile, SubscriptionStatus,
    },
    infrastructure::{
        AccountRepository, CapturedPayment, CreatedPayment, CredentialCipher, OfferRepository,
        OrderRepository, PayPalError, PaymentGateway, RepositoryError, SubscriptionRepository,
    },
};
use uuid::Uuid;

// ============================================================================
// In-memory store shared by the mock repositories
// ============================================================================

#[derive(Default)]
struct Store {
    accounts: HashMap<Uuid, Account>,
    profiles: HashMap<Uuid, AccountProfile>,
    subscriptions: HashMap<Uuid, Subscription>,
    subscription_profiles: Vec<SubscriptionProfile>,
}

type SharedStore = Arc<Mutex<Store>>;

#[derive(Clone)]
struct MockAccountRepository {
    store: SharedStore,
}

#[async_trait]
impl AccountRepository for MockAccountRepository {
    async fn create(&self, account: &Account, profiles: &[AccountProfile]) -> Result<(), RepositoryError> {
        let mut store = self.store.lock().unwrap();
        if store
            .accounts
            .values()
            .any(|a| a.platform_id == account.platform_id && a.login == account.login)
        {
            return Err(RepositoryError::Conflict("Account login already exists".to_string()));
        }
        store.accounts.insert(account.id, account.clone());
        for profile in profiles {
            store.profiles.insert(profile.id, profile.clone());
        }
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError> {
        let store = self.store.lock().unwrap();
        store
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))
    }

    async fn list(&self, platform_id: Option<Uuid>) -> Result<Vec<Account>, RepositoryError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .accounts
            .values()
            .filter(|a| platform_id.map_or(true, |p| a.platform_id == p))
            .cloned()
            .collect())
    }

    async fn list_profiles(&self, account_id: Uuid) -> Result<Vec<AccountProfile>, RepositoryError> {
        let store = self.store.lock().unwrap();
        let mut profiles: Vec<AccountProfile> = store
            .profiles
            .values()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect();
        profiles.sort_by_key(|p| p.slot_number);
        Ok(profiles)
    }

    async fn update_status(&self, id: Uuid, status: AccountStatus) -> Result<(), RepositoryError> {
        let mut store = self.store.lock().unwrap();
        let account = store
            .accounts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))?;
        account.status = status;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn list_availability(
        &self,
        platform_id: Uuid,
    ) -> Result<Vec<AccountAvailability>, RepositoryError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .accounts
            .values()
            .filter(|a| a.platform_id == platform_id && a.status == AccountStatus::Active)
            .map(|a| AccountAvailability {
                account_id: a.id,
                max_profiles: a.max_profiles,
                assigned_profiles: store
                    .profiles
                    .values()
                    .filter(|p| p.account_id == a.id && p.is_assigned)
                    .count() as i32,
                created_at: a.created_at,
            })
            .collect())
    }

    async fn list_platform_profiles(
        &self,
        platform_id: Uuid,
    ) -> Result<Vec<AccountProfile>, RepositoryError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .profiles
            .values()
            .filter(|p| {
                store
                    .accounts
                    .get(&p.account_id)
                    .map_or(false, |a| a.platform_id == platform_id && a.status == AccountStatus::Active)
            })
            .cloned()
            .collect())
    }
}

/// When `race` is set, the next assignment finds one of its profiles
/// already taken, as if another buyer committed first.
#[derive(Clone)]
struct MockSubscriptionRepository {
    store: SharedStore,
    race: Arc<AtomicBool>,
}

#[async_trait]
impl SubscriptionRepository for MockSubscriptionRepository {
    async fn create_with_assignments(
        &self,
        subscription: &Subscription,
        profiles: &[SubscriptionProfile],
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.lock().unwrap();

        if self.race.swap(false, Ordering::SeqCst) {
            if let Some(first) = profiles.first() {
                if let Some(p) = store.profiles.get_mut(&first.account_profile_id) {
                    p.is_assigned = true;
                }
            }
        }

        let all_free = profiles.iter().all(|sp| {
            store
                .profiles
                .get(&sp.account_profile_id)
                .map_or(false, |p| !p.is_assigned)
        });
        if !all_free {
            return Err(RepositoryError::Conflict(
                "Profile already assigned".to_string(),
            ));
        }

        for sp in profiles {
            if let Some(p) = store.profiles.get_mut(&sp.account_profile_id) {
                p.is_assigned = true;
            }
        }
        store.subscriptions.insert(subscription.id, subscription.clone());
        store.subscription_profiles.extend(profiles.iter().cloned());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Subscription, RepositoryError> {
        let store = self.store.lock().unwrap();
        store
            .subscriptions
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Subscription {}", id)))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Subscription>, RepositoryError> {
        let store = self.store.lock().unwrap();
        let mut all: Vec<Subscription> = store.subscriptions.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_profiles(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<SubscriptionProfile>, RepositoryError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .subscription_profiles
            .iter()
            .filter(|sp| sp.subscription_id == subscription_id)
            .cloned()
            .collect())
    }

    async fn release(
        &self,
        id: Uuid,
        status: SubscriptionStatus,
        released_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.lock().unwrap();
        let Store {
            profiles,
            subscriptions,
            subscription_profiles,
            ..
        } = &mut *store;

        let subscription = subscriptions
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Subscription {}", id)))?;
        if subscription.status != SubscriptionStatus::Active {
            return Err(RepositoryError::Conflict(format!("Subscription {} is not active", id)));
        }
        subscription.status = status;
        subscription.updated_at = released_at;

        for sp in subscription_profiles
            .iter_mut()
            .filter(|sp| sp.subscription_id == id && sp.released_at.is_none())
        {
            sp.released_at = Some(released_at);
            if let Some(p) = profiles.get_mut(&sp.account_profile_id) {
                p.is_assigned = false;
            }
        }
        Ok(())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, RepositoryError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .subscriptions
            .values()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
struct MockOfferRepository {
    offers: Arc<Mutex<HashMap<Uuid, Offer>>>,
}

#[async_trait]
impl OfferRepository for MockOfferRepository {
    async fn create(&self, offer: &Offer) -> Result<(), RepositoryError> {
        self.offers.lock().unwrap().insert(offer.id, offer.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Offer, RepositoryError> {
        self.offers
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Offer {}", id)))
    }

    async fn list(&self, active_only: bool) -> Result<Vec<Offer>, RepositoryError> {
        Ok(self
            .offers
            .lock()
            .unwrap()
            .values()
            .filter(|o| !active_only || o.active)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
struct MockOrderRepository {
    orders: Arc<Mutex<HashMap<Uuid, Order>>>,
}

impl MockOrderRepository {
    fn snapshot(&self, id: Uuid) -> Order {
        self.orders.lock().unwrap().get(&id).cloned().unwrap()
    }

    fn transition(
        &self,
        id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        subscription_id: Option<Uuid>,
    ) -> Result<(), RepositoryError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Order {}", id)))?;
        if !from.contains(&order.status) {
            return Err(RepositoryError::Conflict(format!(
                "Order {} is {}",
                id, order.status
            )));
        }
        order.status = to;
        if to == OrderStatus::Paid {
            order.subscription_id = subscription_id;
        }
        order.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MockOrderRepository {
    async fn create(&self, order: &Order) -> Result<(), RepositoryError> {
        self.orders.lock().unwrap().insert(order.id, order.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Order, RepositoryError> {
        self.orders
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Order {}", id)))
    }

    async fn set_paypal_order_id(&self, id: Uuid, paypal_order_id: &str) -> Result<(), RepositoryError> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Order {}", id)))?;
        order.paypal_order_id = Some(paypal_order_id.to_string());
        Ok(())
    }

    async fn claim_for_capture(&self, id: Uuid) -> Result<(), RepositoryError> {
        self.transition(id, &[OrderStatus::Pending], OrderStatus::Capturing, None)
    }

    async fn release_capture(&self, id: Uuid) -> Result<(), RepositoryError> {
        match self.transition(id, &[OrderStatus::Capturing], OrderStatus::Pending, None) {
            Err(RepositoryError::Conflict(_)) => Ok(()),
            other => other,
        }
    }

    async fn mark_paid(&self, id: Uuid, subscription_id: Option<Uuid>) -> Result<(), RepositoryError> {
        self.transition(id, &[OrderStatus::Capturing], OrderStatus::Paid, subscription_id)
    }

    async fn mark_failed(&self, id: Uuid) -> Result<(), RepositoryError> {
        match self.transition(
            id,
            &[OrderStatus::Pending, OrderStatus::Capturing],
            OrderStatus::Failed,
            None,
        ) {
            Err(RepositoryError::Conflict(_)) => Ok(()),
            other => other,
        }
    }
}

#[derive(Clone, Copy)]
enum CaptureOutcome {
    Completed,
    Declined,
    Pending,
    Unavailable,
    /// First capture settles after yielding; later ones are told the order
    /// was already captured.
    SlowThenAlreadyCaptured,
}

struct MockPaymentGateway {
    outcome: Mutex<CaptureOutcome>,
    created: Mutex<Vec<(String, String, String)>>,
    captures: AtomicUsize,
}

impl MockPaymentGateway {
    fn new(outcome: CaptureOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            created: Mutex::new(Vec::new()),
            captures: AtomicUsize::new(0),
        }
    }

    fn capture_calls(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_order(
        &self,
        reference_id: &str,
        currency_code: &str,
        amount: &str,
    ) -> Result<CreatedPayment, PayPalError> {
        self.created.lock().unwrap().push((
            reference_id.to_string(),
            currency_code.to_string(),
            amount.to_string(),
        ));
        Ok(CreatedPayment {
            provider_order_id: format!("PAYPAL-{}", reference_id),
            approve_url: Some(format!("https://paypal.test/approve/{}", reference_id)),
        })
    }

    async fn capture_order(&self, provider_order_id: &str) -> Result<CapturedPayment, PayPalError> {
        let call = self.captures.fetch_add(1, Ordering::SeqCst);
        let outcome = *self.outcome.lock().unwrap();
        let completed = CapturedPayment {
            provider_order_id: provider_order_id.to_string(),
            completed: true,
            status: "COMPLETED".to_string(),
        };
        match outcome {
            CaptureOutcome::Completed => Ok(completed),
            CaptureOutcome::Pending => Ok(CapturedPayment {
                provider_order_id: provider_order_id.to_string(),
                completed: false,
                status: "PENDING".to_string(),
            }),
            CaptureOutcome::Declined => Err(PayPalError::CaptureDeclined(
                "INSTRUMENT_DECLINED".to_string(),
            )),
            CaptureOutcome::Unavailable => Err(PayPalError::RequestFailed(
                "PayPal API error (503 Service Unavailable)".to_string(),
            )),
            CaptureOutcome::SlowThenAlreadyCaptured if call == 0 => {
                for _ in 0..5 {
                    tokio::task::yield_now().await;
                }
                Ok(completed)
            }
            CaptureOutcome::SlowThenAlreadyCaptured => Err(PayPalError::CaptureDeclined(
                "ORDER_ALREADY_CAPTURED".to_string(),
            )),
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

type TestSubscriptionService =
    SubscriptionService<MockAccountRepository, MockSubscriptionRepository, MockOfferRepository>;

struct Harness {
    store: SharedStore,
    race: Arc<AtomicBool>,
    account_repo: Arc<MockAccountRepository>,
    offer_repo: Arc<MockOfferRepository>,
    cipher: Arc<CredentialCipher>,
    service: Arc<TestSubscriptionService>,
}

impl Harness {
    fn new() -> Self {
        let store: SharedStore = Arc::new(Mutex::new(Store::default()));
        let race = Arc::new(AtomicBool::new(false));
        let account_repo = Arc::new(MockAccountRepository {
            store: store.clone(),
        });
        let subscription_repo = Arc::new(MockSubscriptionRepository {
            store: store.clone(),
            race: race.clone(),
        });
        let offer_repo = Arc::new(MockOfferRepository::default());

        let key: Vec<u8> = (1..=32u8).collect();
        let cipher = Arc::new(CredentialCipher::new(&BASE64.encode(key)).unwrap());

        let service = Arc::new(SubscriptionService::new(
            account_repo.clone(),
            subscription_repo,
            offer_repo.clone(),
            cipher.clone(),
        ));

        Self {
            store,
            race,
            account_repo,
            offer_repo,
            cipher,
            service,
        }
    }

    /// Adds an account and marks the given slots as already sold.
    async fn add_account(
        &self,
        platform_id: Uuid,
        password: &str,
        max_profiles: i32,
        taken_slots: &[i32],
        age_days: i64,
    ) -> Uuid {
        let mut account = Account::new(
            platform_id,
            format!("{}@example.com", Uuid::new_v4()),
            self.cipher.encrypt(password).unwrap(),
            max_profiles,
        );
        account.created_at = Utc::now() - Duration::days(age_days);

        let mut profiles = account.build_profiles(&[]);
        for profile in profiles.iter_mut() {
            profile.is_assigned = taken_slots.contains(&profile.slot_number);
        }
        self.account_repo.create(&account, &profiles).await.unwrap();
        account.id
    }

    async fn add_offer(&self, price_mga: i64, max_profiles: i32, platform_ids: Vec<Uuid>) -> Offer {
        let offer = Offer::new("Streaming pack".to_string(), price_mga, 1, max_profiles, platform_ids);
        self.offer_repo.create(&offer).await.unwrap();
        offer
    }

    fn assigned_count(&self, account_id: Uuid) -> usize {
        let store = self.store.lock().unwrap();
        store
            .profiles
            .values()
            .filter(|p| p.account_id == account_id && p.is_assigned)
            .count()
    }

    fn subscription_count(&self) -> usize {
        self.store.lock().unwrap().subscriptions.len()
    }
}

// ============================================================================
// Allocation
// ============================================================================

#[tokio::test]
async fn test_purchase_picks_tightest_account_and_principal_first() {
    let h = Harness::new();
    let platform = Uuid::new_v4();

    let roomy = h.add_account(platform, "roomy-pw", 5, &[], 30).await;
    // Two free profiles left: Principal and Profile 2.
    let tight = h.add_account(platform, "tight-pw", 3, &[3], 1).await;

    let offer = h.add_offer(25_000, 2, vec![platform]).await;
    let details = h
        .service
        .purchase(offer.id, "Buyer@Example.MG", Some(2))
        .await
        .expect("purchase should succeed");

    assert_eq!(details.subscription.customer_email, "buyer@example.mg");
    assert_eq!(details.subscription.status, SubscriptionStatus::Active);
    assert_eq!(details.profiles.len(), 2);
    assert!(details.profiles.iter().all(|p| p.account_id == tight));

    let names: Vec<&str> = details.profiles.iter().map(|p| p.profile_name.as_str()).collect();
    assert_eq!(names, vec!["Principal", "Profile 2"]);

    assert_eq!(details.access.len(), 1);
    assert_eq!(details.access[0].password, "tight-pw");
    assert_eq!(details.access[0].profile_names, vec!["Principal", "Profile 2"]);

    assert_eq!(h.assigned_count(tight), 3);
    assert_eq!(h.assigned_count(roomy), 0);
}

#[tokio::test]
async fn test_principal_is_skipped_when_already_taken() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    let account = h.add_account(platform, "pw", 4, &[1], 1).await;
    let offer = h.add_offer(10_000, 1, vec![platform]).await;

    let details = h.service.purchase(offer.id, "a@b.mg", None).await.unwrap();

    assert_eq!(details.profiles.len(), 1);
    assert_eq!(details.profiles[0].account_id, account);
    assert_eq!(details.profiles[0].profile_name, "Profile 2");
}

#[tokio::test]
async fn test_equal_fit_prefers_older_account() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    let newer = h.add_account(platform, "pw", 2, &[], 1).await;
    let older = h.add_account(platform, "pw", 2, &[], 90).await;
    let offer = h.add_offer(10_000, 2, vec![platform]).await;

    let details = h.service.purchase(offer.id, "a@b.mg", Some(2)).await.unwrap();

    assert!(details.profiles.iter().all(|p| p.account_id == older));
    assert_eq!(h.assigned_count(newer), 0);
}

#[tokio::test]
async fn test_sequential_purchases_never_share_a_profile() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    h.add_account(platform, "pw", 2, &[], 1).await;
    let offer = h.add_offer(10_000, 1, vec![platform]).await;

    let first = h.service.purchase(offer.id, "one@b.mg", Some(1)).await.unwrap();
    let second = h.service.purchase(offer.id, "two@b.mg", Some(1)).await.unwrap();

    assert_ne!(
        first.profiles[0].account_profile_id,
        second.profiles[0].account_profile_id
    );
    assert_eq!(first.profiles[0].profile_name, "Principal");
    assert_eq!(second.profiles[0].profile_name, "Profile 2");

    let third = h.service.purchase(offer.id, "three@b.mg", Some(1)).await;
    assert!(matches!(third, Err(SubscriptionError::NoEligibleAccount { .. })));
}

#[tokio::test]
async fn test_no_account_with_enough_free_profiles() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    h.add_account(platform, "pw", 3, &[1, 2], 1).await;
    h.add_account(platform, "pw", 2, &[2], 1).await;
    let offer = h.add_offer(10_000, 2, vec![platform]).await;

    let result = h.service.purchase(offer.id, "a@b.mg", Some(2)).await;

    match result {
        Err(SubscriptionError::NoEligibleAccount {
            platform_id,
            required,
        }) => {
            assert_eq!(platform_id, platform);
            assert_eq!(required, 2);
        }
        other => panic!("expected NoEligibleAccount, got {:?}", other.map(|d| d.subscription.id)),
    }
    assert_eq!(h.subscription_count(), 0);
}

#[tokio::test]
async fn test_disabled_accounts_receive_no_new_assignments() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    let account = h.add_account(platform, "pw", 4, &[], 1).await;
    h.account_repo
        .update_status(account, AccountStatus::Disabled)
        .await
        .unwrap();
    let offer = h.add_offer(10_000, 1, vec![platform]).await;

    let result = h.service.purchase(offer.id, "a@b.mg", Some(1)).await;
    assert!(matches!(result, Err(SubscriptionError::NoEligibleAccount { .. })));
}

#[tokio::test]
async fn test_profile_count_outside_offer_range_is_rejected() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    h.add_account(platform, "pw", 5, &[], 1).await;
    let offer = h.add_offer(10_000, 2, vec![platform]).await;

    for requested in [0, 3, -1] {
        let result = h.service.purchase(offer.id, "a@b.mg", Some(requested)).await;
        assert!(
            matches!(
                result,
                Err(SubscriptionError::InvalidProfileCount { requested: r, max: 2 }) if r == requested
            ),
            "profile count {} should be rejected",
            requested
        );
    }
    assert_eq!(h.subscription_count(), 0);
}

#[tokio::test]
async fn test_missing_profile_count_defaults_to_offer_maximum() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    h.add_account(platform, "pw", 5, &[], 1).await;
    let offer = h.add_offer(10_000, 3, vec![platform]).await;

    let details = h.service.purchase(offer.id, "a@b.mg", None).await.unwrap();

    assert_eq!(details.subscription.profile_count, 3);
    assert_eq!(details.profiles.len(), 3);
}

#[tokio::test]
async fn test_multi_platform_offer_assigns_on_every_platform() {
    let h = Harness::new();
    let netflix = Uuid::new_v4();
    let disney = Uuid::new_v4();
    let netflix_account = h.add_account(netflix, "nf-pw", 4, &[], 1).await;
    let disney_account = h.add_account(disney, "dp-pw", 4, &[], 1).await;
    let offer = h.add_offer(40_000, 1, vec![netflix, disney]).await;

    let details = h.service.purchase(offer.id, "a@b.mg", Some(1)).await.unwrap();

    assert_eq!(details.profiles.len(), 2);
    assert_eq!(details.access.len(), 2);
    let by_platform: HashMap<Uuid, Uuid> = details
        .profiles
        .iter()
        .map(|p| (p.platform_id, p.account_id))
        .collect();
    assert_eq!(by_platform[&netflix], netflix_account);
    assert_eq!(by_platform[&disney], disney_account);
}

#[tokio::test]
async fn test_one_platform_without_stock_blocks_the_whole_purchase() {
    let h = Harness::new();
    let netflix = Uuid::new_v4();
    let disney = Uuid::new_v4();
    let netflix_account = h.add_account(netflix, "pw", 4, &[], 1).await;
    h.add_account(disney, "pw", 1, &[1], 1).await;
    let offer = h.add_offer(40_000, 1, vec![netflix, disney]).await;

    let result = h.service.purchase(offer.id, "a@b.mg", Some(1)).await;

    assert!(matches!(
        result,
        Err(SubscriptionError::NoEligibleAccount { platform_id, .. }) if platform_id == disney
    ));
    assert_eq!(h.assigned_count(netflix_account), 0);
}

#[tokio::test]
async fn test_lost_race_reports_conflict_and_writes_nothing() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    let account = h.add_account(platform, "pw", 2, &[], 1).await;
    let offer = h.add_offer(10_000, 2, vec![platform]).await;

    h.race.store(true, Ordering::SeqCst);
    let result = h.service.purchase(offer.id, "a@b.mg", Some(2)).await;

    assert!(matches!(result, Err(SubscriptionError::AllocationConflict)));
    assert_eq!(h.subscription_count(), 0);
    // Only the profile taken by the competing buyer is assigned.
    assert_eq!(h.assigned_count(account), 1);
}

#[tokio::test]
async fn test_unknown_and_inactive_offers_are_rejected() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    h.add_account(platform, "pw", 2, &[], 1).await;

    let missing = Uuid::new_v4();
    assert!(matches!(
        h.service.purchase(missing, "a@b.mg", None).await,
        Err(SubscriptionError::OfferNotFound(id)) if id == missing
    ));

    let mut offer = Offer::new("Old pack".to_string(), 5_000, 1, 1, vec![platform]);
    offer.active = false;
    h.offer_repo.create(&offer).await.unwrap();
    assert!(matches!(
        h.service.purchase(offer.id, "a@b.mg", None).await,
        Err(SubscriptionError::OfferInactive(_))
    ));
}

#[tokio::test]
async fn test_invalid_email_is_rejected_before_allocation() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    let account = h.add_account(platform, "pw", 2, &[], 1).await;
    let offer = h.add_offer(10_000, 1, vec![platform]).await;

    let result = h.service.purchase(offer.id, "not-an-email", None).await;

    assert!(matches!(result, Err(SubscriptionError::InvalidInput(_))));
    assert_eq!(h.assigned_count(account), 0);
}

// ============================================================================
// Subscription lifecycle
// ============================================================================

#[tokio::test]
async fn test_cancel_releases_profiles_once() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    let account = h.add_account(platform, "pw", 2, &[], 1).await;
    let offer = h.add_offer(10_000, 2, vec![platform]).await;

    let details = h.service.purchase(offer.id, "a@b.mg", None).await.unwrap();
    assert_eq!(h.assigned_count(account), 2);

    h.service.cancel(details.subscription.id).await.unwrap();
    assert_eq!(h.assigned_count(account), 0);

    let after = h.service.get(details.subscription.id).await.unwrap();
    assert_eq!(after.subscription.status, SubscriptionStatus::Cancelled);
    assert!(after.profiles.iter().all(|p| p.released_at.is_some()));
    assert!(after.access.is_empty());

    let again = h.service.cancel(details.subscription.id).await;
    assert!(matches!(
        again,
        Err(SubscriptionError::InvalidState(SubscriptionStatus::Cancelled))
    ));
}

#[tokio::test]
async fn test_released_profiles_can_be_sold_again() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    h.add_account(platform, "pw", 1, &[], 1).await;
    let offer = h.add_offer(10_000, 1, vec![platform]).await;

    let first = h.service.purchase(offer.id, "one@b.mg", None).await.unwrap();
    h.service.cancel(first.subscription.id).await.unwrap();

    let second = h.service.purchase(offer.id, "two@b.mg", None).await.unwrap();
    assert_eq!(
        second.profiles[0].account_profile_id,
        first.profiles[0].account_profile_id
    );
}

#[tokio::test]
async fn test_cancel_unknown_subscription_is_not_found() {
    let h = Harness::new();
    let result = h.service.cancel(Uuid::new_v4()).await;
    assert!(matches!(
        result,
        Err(SubscriptionError::Repository(RepositoryError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_expire_due_only_touches_ended_active_subscriptions() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    let account = h.add_account(platform, "pw", 3, &[], 1).await;
    let offer = h.add_offer(10_000, 1, vec![platform]).await;

    let running = h.service.purchase(offer.id, "one@b.mg", None).await.unwrap();
    let cancelled = h.service.purchase(offer.id, "two@b.mg", None).await.unwrap();
    h.service.cancel(cancelled.subscription.id).await.unwrap();

    // Nothing ends today.
    assert!(h.service.expire_due(Utc::now()).await.unwrap().is_empty());
    assert_eq!(h.assigned_count(account), 1);

    let later = Utc::now() + Duration::days(40);
    let expired = h.service.expire_due(later).await.unwrap();

    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, running.subscription.id);
    assert_eq!(expired[0].status, SubscriptionStatus::Expired);
    assert_eq!(h.assigned_count(account), 0);

    let cancelled_after = h.service.get(cancelled.subscription.id).await.unwrap();
    assert_eq!(cancelled_after.subscription.status, SubscriptionStatus::Cancelled);

    // A second sweep finds nothing left to do.
    assert!(h.service.expire_due(later).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_subscriptions_paginates_newest_first() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    h.add_account(platform, "pw", 3, &[], 1).await;
    let offer = h.add_offer(10_000, 1, vec![platform]).await;

    for email in ["one@b.mg", "two@b.mg", "three@b.mg"] {
        h.service.purchase(offer.id, email, None).await.unwrap();
    }

    let page = h.service.list(2, 0).await.unwrap();
    assert_eq!(page.len(), 2);
    assert!(page[0].created_at >= page[1].created_at);

    let rest = h.service.list(2, 2).await.unwrap();
    assert_eq!(rest.len(), 1);
}

// ============================================================================
// Checkout
// ============================================================================

type TestCheckoutService = CheckoutService<
    MockOrderRepository,
    MockAccountRepository,
    MockSubscriptionRepository,
    MockOfferRepository,
>;

fn checkout(h: &Harness, outcome: CaptureOutcome) -> (TestCheckoutService, MockOrderRepository, Arc<MockPaymentGateway>) {
    let orders = MockOrderRepository::default();
    let gateway = Arc::new(MockPaymentGateway::new(outcome));
    let service = CheckoutService::new(
        Arc::new(orders.clone()),
        h.offer_repo.clone(),
        gateway.clone(),
        h.service.clone(),
        RateTables::default(),
    );
    (service, orders, gateway)
}

#[tokio::test]
async fn test_checkout_capture_assigns_profiles_and_links_order() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    let account = h.add_account(platform, "pw", 2, &[], 1).await;
    let offer = h.add_offer(45_000, 1, vec![platform]).await;
    let (service, orders, gateway) = checkout(&h, CaptureOutcome::Completed);

    let session = service.start(offer.id, "buyer@b.mg", None).await.unwrap();
    assert_eq!(session.order.status, OrderStatus::Pending);
    assert_eq!(session.order.amount_mga, 45_000);
    // 45 000 MGA at 4 500 MGA per USD.
    assert_eq!(session.payment_amount, "10.00");
    assert!(session.approve_url.is_some());
    assert_eq!(h.assigned_count(account), 0);

    let created = gateway.created.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].0, session.order.id.to_string());
    assert_eq!(created[0].1, "USD");

    let details = service.capture(session.order.id).await.unwrap();
    assert_eq!(details.profiles.len(), 1);
    assert_eq!(h.assigned_count(account), 1);

    let order = orders.snapshot(session.order.id);
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.subscription_id, Some(details.subscription.id));

    let again = service.capture(session.order.id).await;
    assert!(matches!(again, Err(CheckoutError::InvalidState(OrderStatus::Paid))));
    assert_eq!(h.assigned_count(account), 1);
}

#[tokio::test]
async fn test_declined_capture_fails_order_without_assignment() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    let account = h.add_account(platform, "pw", 2, &[], 1).await;
    let offer = h.add_offer(45_000, 1, vec![platform]).await;
    let (service, orders, _) = checkout(&h, CaptureOutcome::Declined);

    let session = service.start(offer.id, "buyer@b.mg", None).await.unwrap();
    let result = service.capture(session.order.id).await;

    assert!(matches!(result, Err(CheckoutError::PaymentDeclined(_))));
    assert_eq!(orders.snapshot(session.order.id).status, OrderStatus::Failed);
    assert_eq!(h.assigned_count(account), 0);
    assert_eq!(h.subscription_count(), 0);

    let again = service.capture(session.order.id).await;
    assert!(matches!(again, Err(CheckoutError::InvalidState(OrderStatus::Failed))));
}

#[tokio::test]
async fn test_incomplete_capture_fails_order() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    h.add_account(platform, "pw", 2, &[], 1).await;
    let offer = h.add_offer(45_000, 1, vec![platform]).await;
    let (service, orders, _) = checkout(&h, CaptureOutcome::Pending);

    let session = service.start(offer.id, "buyer@b.mg", None).await.unwrap();
    let result = service.capture(session.order.id).await;

    assert!(matches!(result, Err(CheckoutError::PaymentDeclined(ref s)) if s == "PENDING"));
    assert_eq!(orders.snapshot(session.order.id).status, OrderStatus::Failed);
    assert_eq!(h.subscription_count(), 0);
}

#[tokio::test]
async fn test_paid_order_without_stock_awaits_manual_fulfilment() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    let account = h.add_account(platform, "pw", 1, &[], 1).await;
    let offer = h.add_offer(45_000, 1, vec![platform]).await;
    let (service, orders, _) = checkout(&h, CaptureOutcome::Completed);

    let session = service.start(offer.id, "buyer@b.mg", None).await.unwrap();
    // The last profile sells elsewhere between approval and capture.
    h.service.purchase(offer.id, "other@b.mg", None).await.unwrap();
    assert_eq!(h.assigned_count(account), 1);

    let result = service.capture(session.order.id).await;
    assert!(matches!(
        result,
        Err(CheckoutError::Subscription(SubscriptionError::NoEligibleAccount { .. }))
    ));

    let order = orders.snapshot(session.order.id);
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.subscription_id, None);
}

#[tokio::test]
async fn test_checkout_rejects_free_offers_and_bad_counts() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    h.add_account(platform, "pw", 2, &[], 1).await;
    let free = h.add_offer(0, 1, vec![platform]).await;
    let paid = h.add_offer(10_000, 1, vec![platform]).await;
    let (service, _, gateway) = checkout(&h, CaptureOutcome::Completed);

    assert!(matches!(
        service.start(free.id, "buyer@b.mg", None).await,
        Err(CheckoutError::InvalidInput(_))
    ));
    assert!(matches!(
        service.start(paid.id, "buyer@b.mg", Some(2)).await,
        Err(CheckoutError::Subscription(SubscriptionError::InvalidProfileCount { .. }))
    ));
    assert!(gateway.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_capture_unknown_order_is_not_found() {
    let h = Harness::new();
    let (service, _, _) = checkout(&h, CaptureOutcome::Completed);
    let id = Uuid::new_v4();

    assert!(matches!(
        service.capture(id).await,
        Err(CheckoutError::OrderNotFound(found)) if found == id
    ));
}

#[tokio::test]
async fn test_concurrent_captures_fulfil_the_order_once() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    let account = h.add_account(platform, "pw", 2, &[], 1).await;
    let offer = h.add_offer(45_000, 1, vec![platform]).await;
    let (service, orders, gateway) = checkout(&h, CaptureOutcome::SlowThenAlreadyCaptured);

    let session = service.start(offer.id, "buyer@b.mg", None).await.unwrap();
    let (first, second) = tokio::join!(
        service.capture(session.order.id),
        service.capture(session.order.id)
    );

    let (won, lost) = if first.is_ok() { (first, second) } else { (second, first) };
    let details = won.unwrap();
    assert!(matches!(lost, Err(CheckoutError::InvalidState(_))));
    assert_eq!(gateway.capture_calls(), 1);

    let order = orders.snapshot(session.order.id);
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.subscription_id, Some(details.subscription.id));
    assert_eq!(h.subscription_count(), 1);
    assert_eq!(h.assigned_count(account), 1);
}

#[tokio::test]
async fn test_capture_claim_is_released_when_paypal_is_unreachable() {
    let h = Harness::new();
    let platform = Uuid::new_v4();
    let account = h.add_account(platform, "pw", 2, &[], 1).await;
    let offer = h.add_offer(45_000, 1, vec![platform]).await;
    let (service, orders, gateway) = checkout(&h, CaptureOutcome::Unavailable);

    let session = service.start(offer.id, "buyer@b.mg", None).await.unwrap();
    let result = service.capture(session.order.id).await;
    assert!(matches!(result, Err(CheckoutError::Payment(PayPalError::RequestFailed(_)))));
    assert_eq!(orders.snapshot(session.order.id).status, OrderStatus::Pending);

    *gateway.outcome.lock().unwrap() = CaptureOutcome::Completed;
    service.capture(session.order.id).await.unwrap();
    assert_eq!(orders.snapshot(session.order.id).status, OrderStatus::Paid);
    assert_eq!(h.assigned_count(account), 1);
    assert_eq!(gateway.capture_calls(), 2);
}
