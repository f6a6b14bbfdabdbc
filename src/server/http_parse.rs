use crate::domain::{AccountStatus, Currency};
use std::str::FromStr;

pub(super) fn parse_account_status(status: &str) -> Option<AccountStatus> {
    AccountStatus::from_str(status.trim()).ok()
}

pub(super) fn parse_currency(currency: &str) -> Option<Currency> {
    Currency::from_str(currency.trim()).ok()
}

/// Accepts "12,5" as well as "12.5".
pub(super) fn parse_decimal(value: &str) -> Option<f64> {
    let normalized = value.trim().replace(',', ".");
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Warehouse rates: all finite and non-negative, tax as a fraction of 1.
pub(super) fn validate_warehouse_rates(
    transport_rate_per_kg: f64,
    processing_fee: f64,
    tax_rate: f64,
) -> Result<(), &'static str> {
    let rates = [transport_rate_per_kg, processing_fee, tax_rate];
    if rates.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err("Rates must be non-negative numbers");
    }
    if tax_rate > 1.0 {
        return Err("tax_rate must be a fraction between 0 and 1");
    }
    Ok(())
}
