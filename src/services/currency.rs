use crate::error::{AppError, AppResult};
use crate::models::DEFAULT_CURRENCY;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// Exchange rates between display currencies.
#[async_trait]
pub trait CurrencySource: Send + Sync {
    fn supports(&self, code: &str) -> bool;

    /// Units of `to` per one unit of `from`.
    async fn rate(&self, from: &str, to: &str) -> AppResult<Decimal>;
}

/// Fixed USD-based rate table.
pub struct StaticRates {
    usd_rates: HashMap<&'static str, Decimal>,
}

impl StaticRates {
    pub fn new() -> Self {
        let usd_rates = HashMap::from([
            ("USD", dec!(1)),
            ("EUR", dec!(0.91)),
            ("GBP", dec!(0.79)),
            ("JPY", dec!(111.22)),
            ("CAD", dec!(1.34)),
            ("AUD", dec!(1.47)),
        ]);
        Self { usd_rates }
    }

    fn usd_rate(&self, code: &str) -> AppResult<Decimal> {
        self.usd_rates
            .get(code)
            .copied()
            .ok_or_else(|| AppError::InvalidInput(format!("Unsupported currency: {code}")))
    }
}

impl Default for StaticRates {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CurrencySource for StaticRates {
    fn supports(&self, code: &str) -> bool {
        self.usd_rates.contains_key(code)
    }

    async fn rate(&self, from: &str, to: &str) -> AppResult<Decimal> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        let from_usd = self.usd_rate(from)?;
        let to_usd = self.usd_rate(to)?;
        if from == DEFAULT_CURRENCY {
            return Ok(to_usd);
        }
        Ok(to_usd / from_usd)
    }
}

/// Uppercases and checks a currency code against the source.
pub fn validate_currency(source: &dyn CurrencySource, code: &str) -> AppResult<String> {
    let code = code.trim().to_uppercase();
    if code.len() != 3 || !source.supports(&code) {
        return Err(AppError::InvalidInput(format!("Unsupported currency: {code}")));
    }
    Ok(code)
}
