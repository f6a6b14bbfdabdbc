use crate::domain::{Order, OrderStatus};
use crate::infrastructure::{OrderRepository, RepositoryError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn create(&self, order: &Order) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, offer_id, customer_email, profile_count, amount_mga, status,
                                paypal_order_id, subscription_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(order.id)
        .bind(order.offer_id)
        .bind(&order.customer_email)
        .bind(order.profile_count)
        .bind(order.amount_mga)
        .bind(order.status.to_string())
        .bind(&order.paypal_order_id)
        .bind(order.subscription_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Order, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, offer_id, customer_email, profile_count, amount_mga, status,
                   paypal_order_id, subscription_id, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Order {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        let status_str: String = row.try_get("status")?;

        Ok(Order {
            id: row.try_get("id")?,
            offer_id: row.try_get("offer_id")?,
            customer_email: row.try_get("customer_email")?,
            profile_count: row.try_get("profile_count")?,
            amount_mga: row.try_get("amount_mga")?,
            status: OrderStatus::from_str(&status_str).map_err(|_| {
                RepositoryError::InvalidData(format!("Unknown order status: {}", status_str))
            })?,
            paypal_order_id: row.try_get("paypal_order_id")?,
            subscription_id: row.try_get("subscription_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn set_paypal_order_id(&self, id: Uuid, paypal_order_id: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET paypal_order_id = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(paypal_order_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim_for_capture(&self, id: Uuid) -> Result<(), RepositoryError> {
        let claimed = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'capturing', updated_at = $1
            WHERE id = $2
              AND status = 'pending'
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if claimed == 0 {
            return Err(RepositoryError::Conflict(format!("Order {} is not pending", id)));
        }
        Ok(())
    }

    async fn release_capture(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = 'pending', updated_at = $1
            WHERE id = $2
              AND status = 'capturing'
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_paid(&self, id: Uuid, subscription_id: Option<Uuid>) -> Result<(), RepositoryError> {
        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'paid', subscription_id = $1, updated_at = $2
            WHERE id = $3
              AND status = 'capturing'
            "#,
        )
        .bind(subscription_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(RepositoryError::Conflict(format!("Order {} is not being captured", id)));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = 'failed', updated_at = $1
            WHERE id = $2
              AND status IN ('pending', 'capturing')
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
