// Utility functions for the stock backend

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Round a decimal to a specific number of decimal places, half-up.
pub fn round_decimal(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

/// `part / whole` as a percentage: the ratio is rounded to 4 places before
/// scaling, and a non-positive `whole` yields zero. `None` when the ratio
/// does not fit a `Decimal`.
pub fn percentage_of(part: Decimal, whole: Decimal) -> Option<Decimal> {
    if whole <= Decimal::ZERO {
        return Some(Decimal::ZERO);
    }
    let ratio = part.checked_div(whole)?;
    round_decimal(ratio, 4).checked_mul(dec!(100))
}

/// Uppercased, trimmed ticker symbol.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
