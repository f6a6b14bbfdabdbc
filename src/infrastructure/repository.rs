use crate::domain::{
    Account, AccountAvailability, AccountProfile, AccountStatus, Offer, Order, Platform,
    Subscription, SubscriptionProfile, SubscriptionStatus, Warehouse,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait PlatformRepository: Send + Sync {
    #[must_use]
    async fn create(&self, platform: &Platform) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Platform, RepositoryError>;
    #[must_use]
    async fn list(&self) -> Result<Vec<Platform>, RepositoryError>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Inserts the account together with all of its profile slots.
    #[must_use]
    async fn create(&self, account: &Account, profiles: &[AccountProfile]) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError>;
    #[must_use]
    async fn list(&self, platform_id: Option<Uuid>) -> Result<Vec<Account>, RepositoryError>;
    #[must_use]
    async fn list_profiles(&self, account_id: Uuid) -> Result<Vec<AccountProfile>, RepositoryError>;
    #[must_use]
    async fn update_status(&self, id: Uuid, status: AccountStatus) -> Result<(), RepositoryError>;
    /// Slot usage of every active account on a platform.
    #[must_use]
    async fn list_availability(
        &self,
        platform_id: Uuid,
    ) -> Result<Vec<AccountAvailability>, RepositoryError>;
    /// Profile rows of every active account on a platform.
    #[must_use]
    async fn list_platform_profiles(
        &self,
        platform_id: Uuid,
    ) -> Result<Vec<AccountProfile>, RepositoryError>;
}

#[async_trait]
pub trait OfferRepository: Send + Sync {
    #[must_use]
    async fn create(&self, offer: &Offer) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Offer, RepositoryError>;
    #[must_use]
    async fn list(&self, active_only: bool) -> Result<Vec<Offer>, RepositoryError>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Persists a subscription and flips its account profiles to assigned.
    ///
    /// Fails with [`RepositoryError::Conflict`] without writing anything when
    /// any of the profiles was already taken.
    #[must_use]
    async fn create_with_assignments(
        &self,
        subscription: &Subscription,
        profiles: &[SubscriptionProfile],
    ) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Subscription, RepositoryError>;
    #[must_use]
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Subscription>, RepositoryError>;
    #[must_use]
    async fn list_profiles(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<SubscriptionProfile>, RepositoryError>;
    /// Moves an active subscription to `status` and frees its account profiles.
    ///
    /// Fails with [`RepositoryError::Conflict`] when the subscription is no longer active.
    #[must_use]
    async fn release(
        &self,
        id: Uuid,
        status: SubscriptionStatus,
        released_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    /// Active subscriptions whose end date is at or before `now`.
    #[must_use]
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WarehouseRepository: Send + Sync {
    #[must_use]
    async fn create(&self, warehouse: &Warehouse) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_code(&self, code: &str) -> Result<Warehouse, RepositoryError>;
    #[must_use]
    async fn list(&self) -> Result<Vec<Warehouse>, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    #[must_use]
    async fn create(&self, order: &Order) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Order, RepositoryError>;
    #[must_use]
    async fn set_paypal_order_id(&self, id: Uuid, paypal_order_id: &str) -> Result<(), RepositoryError>;
    /// Pending -> Capturing in one conditional update. `Conflict` when the
    /// order is not pending, which means another capture owns it.
    #[must_use]
    async fn claim_for_capture(&self, id: Uuid) -> Result<(), RepositoryError>;
    /// Capturing -> Pending, after the provider could not be reached.
    #[must_use]
    async fn release_capture(&self, id: Uuid) -> Result<(), RepositoryError>;
    /// Capturing -> Paid, linking the subscription created for the order.
    /// `None` leaves the order paid but awaiting manual fulfilment.
    #[must_use]
    async fn mark_paid(&self, id: Uuid, subscription_id: Option<Uuid>) -> Result<(), RepositoryError>;
    /// Pending or Capturing -> Failed.
    #[must_use]
    async fn mark_failed(&self, id: Uuid) -> Result<(), RepositoryError>;
}

pub struct PostgresPlatformRepository {
    pool: PgPool,
}

impl PostgresPlatformRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlatformRepository for PostgresPlatformRepository {
    async fn create(&self, platform: &Platform) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO platforms (id, name, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(platform.id)
        .bind(&platform.name)
        .bind(platform.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation("Platform name already exists"))?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Platform, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, created_at
            FROM platforms
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Platform {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        Ok(Platform {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn list(&self) -> Result<Vec<Platform>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, created_at
            FROM platforms
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Platform {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn create(&self, account: &Account, profiles: &[AccountProfile]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO accounts (id, platform_id, login, password_encrypted, max_profiles, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(account.id)
        .bind(account.platform_id)
        .bind(&account.login)
        .bind(&account.password_encrypted)
        .bind(account.max_profiles)
        .bind(account.status.to_string())
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_unique_violation("Account login already exists on this platform"))?;

        for profile in profiles {
            sqlx::query(
                r#"
                INSERT INTO account_profiles (id, account_id, name, slot_number, is_assigned)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(profile.id)
            .bind(profile.account_id)
            .bind(&profile.name)
            .bind(profile.slot_number)
            .bind(profile.is_assigned)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, platform_id, login, password_encrypted, max_profiles, status, created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Account {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_account(&row)
    }

    async fn list(&self, platform_id: Option<Uuid>) -> Result<Vec<Account>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, platform_id, login, password_encrypted, max_profiles, status, created_at, updated_at
            FROM accounts
            WHERE ($1::uuid IS NULL OR platform_id = $1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(platform_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    async fn list_profiles(&self, account_id: Uuid) -> Result<Vec<AccountProfile>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, name, slot_number, is_assigned
            FROM account_profiles
            WHERE account_id = $1
            ORDER BY slot_number ASC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_account_profile).collect()
    }

    async fn update_status(&self, id: Uuid, status: AccountStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET status = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Account {}", id)));
        }
        Ok(())
    }

    async fn list_availability(
        &self,
        platform_id: Uuid,
    ) -> Result<Vec<AccountAvailability>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.max_profiles, a.created_at,
                   (COUNT(p.id) FILTER (WHERE p.is_assigned))::INT4 AS assigned_profiles
            FROM accounts a
            LEFT JOIN account_profiles p ON p.account_id = a.id
            WHERE a.platform_id = $1
              AND a.status = 'active'
            GROUP BY a.id, a.max_profiles, a.created_at
            "#,
        )
        .bind(platform_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AccountAvailability {
                    account_id: row.try_get("id")?,
                    max_profiles: row.try_get("max_profiles")?,
                    assigned_profiles: row.try_get("assigned_profiles")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn list_platform_profiles(
        &self,
        platform_id: Uuid,
    ) -> Result<Vec<AccountProfile>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.account_id, p.name, p.slot_number, p.is_assigned
            FROM account_profiles p
            JOIN accounts a ON a.id = p.account_id
            WHERE a.platform_id = $1
              AND a.status = 'active'
            ORDER BY p.account_id, p.slot_number ASC
            "#,
        )
        .bind(platform_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_account_profile).collect()
    }
}

fn row_to_account_profile(row: &sqlx::postgres::PgRow) -> Result<AccountProfile, RepositoryError> {
    Ok(AccountProfile {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        name: row.try_get("name")?,
        slot_number: row.try_get("slot_number")?,
        is_assigned: row.try_get("is_assigned")?,
    })
}

fn row_to_account(row: &sqlx::postgres::PgRow) -> Result<Account, RepositoryError> {
    let status_str: String = row.try_get("status")?;

    Ok(Account {
        id: row.try_get("id")?,
        platform_id: row.try_get("platform_id")?,
        login: row.try_get("login")?,
        password_encrypted: row.try_get("password_encrypted")?,
        max_profiles: row.try_get("max_profiles")?,
        status: AccountStatus::from_str(&status_str).map_err(|_| {
            RepositoryError::InvalidData(format!("Unknown account status: {}", status_str))
        })?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Maps Postgres unique violations (23505) to [`RepositoryError::Conflict`].
pub(crate) fn map_unique_violation(
    message: &'static str,
) -> impl Fn(sqlx::Error) -> RepositoryError {
    move |e| match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            RepositoryError::Conflict(message.to_string())
        }
        _ => RepositoryError::DatabaseError(e),
    }
}
