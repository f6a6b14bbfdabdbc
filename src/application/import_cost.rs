//! Landed cost of a supplier purchase shipped through an overseas warehouse.
//!
//! All intermediate amounts are in the warehouse currency; the total is
//! converted back to ariary (MGA).

use crate::domain::{Currency, Warehouse};
use crate::infrastructure::{RepositoryError, WarehouseRepository};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ImportCostError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("No exchange rate for {0}")]
    MissingRate(Currency),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Percentage applied to prices up to and including `up_to`.
/// `up_to: None` marks the open-ended top bracket.
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionTier {
    pub up_to: Option<f64>,
    pub rate: f64,
}

/// Static lookup tables shared by every warehouse.
#[derive(Debug, Clone)]
pub struct RateTables {
    /// MGA per one unit of the currency.
    pub mga_per_unit: HashMap<Currency, f64>,
    /// Sorted by ascending `up_to`, last tier open-ended.
    pub commission_tiers: Vec<CommissionTier>,
}

impl Default for RateTables {
    fn default() -> Self {
        let mga_per_unit = HashMap::from([
            (Currency::Mga, 1.0),
            (Currency::Eur, 5000.0),
            (Currency::Usd, 4500.0),
            (Currency::Cny, 620.0),
            (Currency::Aed, 1225.0),
        ]);

        Self {
            mga_per_unit,
            commission_tiers: vec![
                CommissionTier {
                    up_to: Some(100.0),
                    rate: 0.10,
                },
                CommissionTier {
                    up_to: Some(500.0),
                    rate: 0.07,
                },
                CommissionTier {
                    up_to: None,
                    rate: 0.05,
                },
            ],
        }
    }
}

impl RateTables {
    pub fn rate(&self, currency: Currency) -> Result<f64, ImportCostError> {
        self.mga_per_unit
            .get(&currency)
            .copied()
            .filter(|r| *r > 0.0)
            .ok_or(ImportCostError::MissingRate(currency))
    }

    pub fn convert(&self, amount: f64, from: Currency, to: Currency) -> Result<f64, ImportCostError> {
        if from == to {
            return Ok(amount);
        }
        Ok(amount * self.rate(from)? / self.rate(to)?)
    }

    pub fn commission_rate(&self, price: f64) -> f64 {
        self.commission_tiers
            .iter()
            .find(|tier| tier.up_to.map_or(true, |limit| price <= limit))
            .map_or(0.0, |tier| tier.rate)
    }
}

/// Per-warehouse fees, in the warehouse currency.
#[derive(Debug, Clone, PartialEq)]
pub struct WarehouseRates {
    pub code: String,
    pub currency: Currency,
    pub transport_rate_per_kg: f64,
    pub processing_fee: f64,
    pub tax_rate: f64,
}

impl WarehouseRates {
    /// Used when a warehouse has no configuration row.
    pub fn fallback(code: &str) -> Self {
        Self {
            code: code.to_string(),
            currency: Currency::Eur,
            transport_rate_per_kg: 12.0,
            processing_fee: 5.0,
            tax_rate: 0.20,
        }
    }
}

impl From<&Warehouse> for WarehouseRates {
    fn from(w: &Warehouse) -> Self {
        Self {
            code: w.code.clone(),
            currency: w.currency,
            transport_rate_per_kg: w.transport_rate_per_kg,
            processing_fee: w.processing_fee,
            tax_rate: w.tax_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportCostBreakdown {
    pub warehouse_code: String,
    pub warehouse_currency: Currency,
    pub price: f64,
    pub transport: f64,
    pub commission_rate: f64,
    pub commission: f64,
    pub processing_fee: f64,
    pub tax: f64,
    pub total: f64,
    pub total_mga: i64,
    /// True when the warehouse had no configuration row.
    pub used_fallback_rates: bool,
}

pub fn calculate(
    supplier_price: f64,
    supplier_currency: Currency,
    weight_kg: f64,
    warehouse: &WarehouseRates,
    tables: &RateTables,
) -> Result<ImportCostBreakdown, ImportCostError> {
    if !supplier_price.is_finite() || supplier_price < 0.0 {
        return Err(ImportCostError::InvalidInput(
            "supplier price must be a non-negative number".to_string(),
        ));
    }
    if !weight_kg.is_finite() || weight_kg < 0.0 {
        return Err(ImportCostError::InvalidInput(
            "weight must be a non-negative number".to_string(),
        ));
    }

    let price = tables.convert(supplier_price, supplier_currency, warehouse.currency)?;
    let transport = warehouse.transport_rate_per_kg * weight_kg;
    let commission_rate = tables.commission_rate(price);
    let commission = price * commission_rate;
    let tax = price * warehouse.tax_rate;
    let total = price + transport + commission + warehouse.processing_fee + tax;
    let total_mga = tables.convert(total, warehouse.currency, Currency::Mga)?.round() as i64;

    Ok(ImportCostBreakdown {
        warehouse_code: warehouse.code.clone(),
        warehouse_currency: warehouse.currency,
        price: round_cents(price),
        transport: round_cents(transport),
        commission_rate,
        commission: round_cents(commission),
        processing_fee: round_cents(warehouse.processing_fee),
        tax: round_cents(tax),
        total: round_cents(total),
        total_mga,
        used_fallback_rates: false,
    })
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct ImportCostService<W>
where
    W: WarehouseRepository,
{
    warehouse_repo: Arc<W>,
    tables: RateTables,
}

impl<W> ImportCostService<W>
where
    W: WarehouseRepository,
{
    pub fn new(warehouse_repo: Arc<W>, tables: RateTables) -> Self {
        Self {
            warehouse_repo,
            tables,
        }
    }

    pub async fn quote(
        &self,
        supplier_price: f64,
        supplier_currency: Currency,
        weight_kg: f64,
        warehouse_code: &str,
    ) -> Result<ImportCostBreakdown, ImportCostError> {
        let code = warehouse_code.trim().to_lowercase();
        let (rates, fallback) = match self.warehouse_repo.get_by_code(&code).await {
            Ok(warehouse) => (WarehouseRates::from(&warehouse), false),
            Err(RepositoryError::NotFound(_)) => {
                warn!(warehouse = %code, "No warehouse configuration, using default rates");
                (WarehouseRates::fallback(&code), true)
            }
            Err(e) => return Err(e.into()),
        };

        let mut breakdown = calculate(supplier_price, supplier_currency, weight_kg, &rates, &self.tables)?;
        breakdown.used_fallback_rates = fallback;
        Ok(breakdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::MockWarehouseRepository;

    fn eur_warehouse() -> WarehouseRates {
        WarehouseRates {
            code: "fr".to_string(),
            currency: Currency::Eur,
            transport_rate_per_kg: 10.0,
            processing_fee: 5.0,
            tax_rate: 0.20,
        }
    }

    #[test]
    fn commission_follows_price_brackets() {
        let tables = RateTables::default();
        assert_eq!(tables.commission_rate(0.0), 0.10);
        assert_eq!(tables.commission_rate(100.0), 0.10);
        assert_eq!(tables.commission_rate(100.01), 0.07);
        assert_eq!(tables.commission_rate(500.0), 0.07);
        assert_eq!(tables.commission_rate(10_000.0), 0.05);
    }

    #[test]
    fn same_currency_price_adds_all_fees() {
        let breakdown = calculate(50.0, Currency::Eur, 2.0, &eur_warehouse(), &RateTables::default()).unwrap();

        // 50 + 20 transport + 5 commission + 5 fee + 10 tax
        assert_eq!(breakdown.price, 50.0);
        assert_eq!(breakdown.transport, 20.0);
        assert_eq!(breakdown.commission, 5.0);
        assert_eq!(breakdown.tax, 10.0);
        assert_eq!(breakdown.total, 90.0);
        assert_eq!(breakdown.total_mga, 450_000);
    }

    #[test]
    fn foreign_price_is_converted_through_ariary() {
        // 900 USD = 4_050_000 MGA = 810 EUR, top commission bracket.
        let breakdown = calculate(900.0, Currency::Usd, 0.0, &eur_warehouse(), &RateTables::default()).unwrap();

        assert_eq!(breakdown.price, 810.0);
        assert_eq!(breakdown.commission_rate, 0.05);
        assert_eq!(breakdown.commission, 40.5);
        assert_eq!(breakdown.tax, 162.0);
        assert_eq!(breakdown.total, 1017.5);
        assert_eq!(breakdown.total_mga, 5_087_500);
    }

    #[test]
    fn negative_inputs_are_rejected() {
        let tables = RateTables::default();
        assert!(matches!(
            calculate(-1.0, Currency::Eur, 1.0, &eur_warehouse(), &tables),
            Err(ImportCostError::InvalidInput(_))
        ));
        assert!(matches!(
            calculate(1.0, Currency::Eur, f64::NAN, &eur_warehouse(), &tables),
            Err(ImportCostError::InvalidInput(_))
        ));
    }

    #[test]
    fn missing_exchange_rate_is_reported() {
        let mut tables = RateTables::default();
        tables.mga_per_unit.remove(&Currency::Cny);
        assert!(matches!(
            calculate(10.0, Currency::Cny, 1.0, &eur_warehouse(), &tables),
            Err(ImportCostError::MissingRate(Currency::Cny))
        ));
    }

    #[tokio::test]
    async fn quote_falls_back_to_default_rates_for_unknown_warehouse() {
        let mut repo = MockWarehouseRepository::new();
        repo.expect_get_by_code().times(1).returning(|code| {
            assert_eq!(code.to_string(), "dubai");
            Err(RepositoryError::NotFound(format!("Warehouse {}", code)))
        });

        let service = ImportCostService::new(Arc::new(repo), RateTables::default());
        let breakdown = service.quote(100.0, Currency::Eur, 1.0, " Dubai ").await.unwrap();

        assert!(breakdown.used_fallback_rates);
        assert_eq!(breakdown.warehouse_currency, Currency::Eur);
        // 100 + 12 transport + 10 commission + 5 fee + 20 tax
        assert_eq!(breakdown.total, 147.0);
        assert_eq!(breakdown.total_mga, 735_000);
    }

    #[tokio::test]
    async fn quote_uses_configured_warehouse() {
        let mut repo = MockWarehouseRepository::new();
        repo.expect_get_by_code().returning(|_| {
            Ok(Warehouse::new(
                "cn".to_string(),
                "Guangzhou".to_string(),
                Currency::Cny,
                40.0,
                10.0,
                0.0,
            ))
        });

        let service = ImportCostService::new(Arc::new(repo), RateTables::default());
        let breakdown = service.quote(100.0, Currency::Cny, 0.5, "cn").await.unwrap();

        assert!(!breakdown.used_fallback_rates);
        // 100 + 20 transport + 10 commission + 10 fee
        assert_eq!(breakdown.total, 140.0);
        assert_eq!(breakdown.total_mga, 86_800);
    }

    #[tokio::test]
    async fn quote_propagates_database_errors() {
        let mut repo = MockWarehouseRepository::new();
        repo.expect_get_by_code()
            .returning(|_| Err(RepositoryError::InvalidData("bad currency".to_string())));

        let service = ImportCostService::new(Arc::new(repo), RateTables::default());
        assert!(matches!(
            service.quote(1.0, Currency::Eur, 1.0, "fr").await,
            Err(ImportCostError::Repository(_))
        ));
    }
}
