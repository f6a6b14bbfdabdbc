use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Mga,
    Eur,
    Usd,
    Cny,
    Aed,
}

/// Overseas warehouse that receives supplier parcels before shipping to Madagascar.
///
/// Amounts are in the warehouse currency; `tax_rate` is a fraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Warehouse {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub currency: Currency,
    pub transport_rate_per_kg: f64,
    pub processing_fee: f64,
    pub tax_rate: f64,
}

impl Warehouse {
    pub fn new(
        code: String,
        name: String,
        currency: Currency,
        transport_rate_per_kg: f64,
        processing_fee: f64,
        tax_rate: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.trim().to_lowercase(),
            name,
            currency,
            transport_rate_per_kg,
            processing_fee,
            tax_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn currency_parses_iso_codes_case_insensitively() {
        assert_eq!(Currency::from_str("eur").unwrap(), Currency::Eur);
        assert_eq!(Currency::from_str("MGA").unwrap(), Currency::Mga);
        assert_eq!(Currency::Cny.to_string(), "CNY");
        assert!(Currency::from_str("GBP").is_err());
    }
}
