use crate::domain::{Currency, Offer, Warehouse};
use crate::infrastructure::repository::map_unique_violation;
use crate::infrastructure::{OfferRepository, RepositoryError, WarehouseRepository};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

pub struct PostgresOfferRepository {
    pool: PgPool,
}

impl PostgresOfferRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OfferRepository for PostgresOfferRepository {
    async fn create(&self, offer: &Offer) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO offers (id, name, price_mga, duration_months, max_profiles, platform_ids, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(offer.id)
        .bind(&offer.name)
        .bind(offer.price_mga)
        .bind(offer.duration_months)
        .bind(offer.max_profiles)
        .bind(&offer.platform_ids)
        .bind(offer.active)
        .bind(offer.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Offer, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, price_mga, duration_months, max_profiles, platform_ids, active, created_at
            FROM offers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Offer {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_offer(&row)
    }

    async fn list(&self, active_only: bool) -> Result<Vec<Offer>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, price_mga, duration_months, max_profiles, platform_ids, active, created_at
            FROM offers
            WHERE ($1 = FALSE OR active = TRUE)
            ORDER BY price_mga ASC, name ASC
            "#,
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_offer).collect()
    }
}

fn row_to_offer(row: &sqlx::postgres::PgRow) -> Result<Offer, RepositoryError> {
    Ok(Offer {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        price_mga: row.try_get("price_mga")?,
        duration_months: row.try_get("duration_months")?,
        max_profiles: row.try_get("max_profiles")?,
        platform_ids: row.try_get("platform_ids")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

pub struct PostgresWarehouseRepository {
    pool: PgPool,
}

impl PostgresWarehouseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WarehouseRepository for PostgresWarehouseRepository {
    async fn create(&self, warehouse: &Warehouse) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO warehouses (id, code, name, currency, transport_rate_per_kg, processing_fee, tax_rate)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(warehouse.id)
        .bind(&warehouse.code)
        .bind(&warehouse.name)
        .bind(warehouse.currency.to_string())
        .bind(warehouse.transport_rate_per_kg)
        .bind(warehouse.processing_fee)
        .bind(warehouse.tax_rate)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation("Warehouse code already exists"))?;

        Ok(())
    }

    async fn get_by_code(&self, code: &str) -> Result<Warehouse, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, code, name, currency, transport_rate_per_kg, processing_fee, tax_rate
            FROM warehouses
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Warehouse {}", code)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_warehouse(&row)
    }

    async fn list(&self) -> Result<Vec<Warehouse>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, code, name, currency, transport_rate_per_kg, processing_fee, tax_rate
            FROM warehouses
            ORDER BY code ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_warehouse).collect()
    }
}

fn row_to_warehouse(row: &sqlx::postgres::PgRow) -> Result<Warehouse, RepositoryError> {
    let currency_str: String = row.try_get("currency")?;

    Ok(Warehouse {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        currency: Currency::from_str(&currency_str).map_err(|_| {
            RepositoryError::InvalidData(format!("Unknown currency: {}", currency_str))
        })?,
        transport_rate_per_kg: row.try_get("transport_rate_per_kg")?,
        processing_fee: row.try_get("processing_fee")?,
        tax_rate: row.try_get("tax_rate")?,
    })
}
