use crate::domain::{Subscription, SubscriptionProfile, SubscriptionStatus};
use crate::infrastructure::repository::map_unique_violation;
use crate::infrastructure::{RepositoryError, SubscriptionRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn create_with_assignments(
        &self,
        subscription: &Subscription,
        profiles: &[SubscriptionProfile],
    ) -> Result<(), RepositoryError> {
        let mut account_ids: Vec<Uuid> = profiles.iter().map(|p| p.account_id).collect();
        account_ids.sort();
        account_ids.dedup();
        let profile_ids: Vec<Uuid> = profiles.iter().map(|p| p.account_profile_id).collect();

        let mut tx = self.pool.begin().await?;

        // Serialize concurrent purchases hitting the same accounts. Sorted ids keep
        // the lock order stable across transactions.
        sqlx::query(
            r#"
            SELECT id
            FROM accounts
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(&account_ids)
        .fetch_all(&mut *tx)
        .await?;

        let flipped = sqlx::query(
            r#"
            UPDATE account_profiles
            SET is_assigned = TRUE
            WHERE id = ANY($1)
              AND is_assigned = FALSE
            "#,
        )
        .bind(&profile_ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if flipped != profile_ids.len() as u64 {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict(format!(
                "{} of {} profiles were already assigned",
                profile_ids.len() as u64 - flipped,
                profile_ids.len()
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, offer_id, customer_email, status, profile_count,
                                       starts_at, ends_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.offer_id)
        .bind(&subscription.customer_email)
        .bind(subscription.status.to_string())
        .bind(subscription.profile_count)
        .bind(subscription.starts_at)
        .bind(subscription.ends_at)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&mut *tx)
        .await?;

        for profile in profiles {
            sqlx::query(
                r#"
                INSERT INTO subscription_profiles (id, subscription_id, platform_id, account_id,
                                                   account_profile_id, profile_name, created_at, released_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(profile.id)
            .bind(profile.subscription_id)
            .bind(profile.platform_id)
            .bind(profile.account_id)
            .bind(profile.account_profile_id)
            .bind(&profile.profile_name)
            .bind(profile.created_at)
            .bind(profile.released_at)
            .execute(&mut *tx)
            .await
            .map_err(map_unique_violation("Account profile already held by a live subscription"))?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Subscription, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, offer_id, customer_email, status, profile_count, starts_at, ends_at, created_at, updated_at
            FROM subscriptions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Subscription {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_subscription(&row)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Subscription>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, offer_id, customer_email, status, profile_count, starts_at, ends_at, created_at, updated_at
            FROM subscriptions
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_subscription).collect()
    }

    async fn list_profiles(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<SubscriptionProfile>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, subscription_id, platform_id, account_id, account_profile_id,
                   profile_name, created_at, released_at
            FROM subscription_profiles
            WHERE subscription_id = $1
            ORDER BY created_at ASC, profile_name ASC
            "#,
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SubscriptionProfile {
                    id: row.try_get("id")?,
                    subscription_id: row.try_get("subscription_id")?,
                    platform_id: row.try_get("platform_id")?,
                    account_id: row.try_get("account_id")?,
                    account_profile_id: row.try_get("account_profile_id")?,
                    profile_name: row.try_get("profile_name")?,
                    created_at: row.try_get("created_at")?,
                    released_at: row.try_get("released_at")?,
                })
            })
            .collect()
    }

    async fn release(
        &self,
        id: Uuid,
        status: SubscriptionStatus,
        released_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $1, updated_at = $2
            WHERE id = $3
              AND status = 'active'
            "#,
        )
        .bind(status.to_string())
        .bind(released_at)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict(format!(
                "Subscription {} is not active",
                id
            )));
        }

        sqlx::query(
            r#"
            UPDATE account_profiles
            SET is_assigned = FALSE
            WHERE id IN (
                SELECT account_profile_id
                FROM subscription_profiles
                WHERE subscription_id = $1
                  AND released_at IS NULL
            )
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE subscription_profiles
            SET released_at = $1
            WHERE subscription_id = $2
              AND released_at IS NULL
            "#,
        )
        .bind(released_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Subscription>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, offer_id, customer_email, status, profile_count, starts_at, ends_at, created_at, updated_at
            FROM subscriptions
            WHERE status = 'active'
              AND ends_at <= $1
            ORDER BY ends_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_subscription).collect()
    }
}

fn row_to_subscription(row: &sqlx::postgres::PgRow) -> Result<Subscription, RepositoryError> {
    let status_str: String = row.try_get("status")?;

    Ok(Subscription {
        id: row.try_get("id")?,
        offer_id: row.try_get("offer_id")?,
        customer_email: row.try_get("customer_email")?,
        status: SubscriptionStatus::from_str(&status_str).map_err(|_| {
            RepositoryError::InvalidData(format!("Unknown subscription status: {}", status_str))
        })?,
        profile_count: row.try_get("profile_count")?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
