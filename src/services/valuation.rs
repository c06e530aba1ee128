//! Position accounting: per-holding valuation, portfolio totals and the
//! weighted-average merge applied when a stock is bought again.
//!
//! Everything here is pure decimal arithmetic. Callers supply prices; nothing
//! is fetched or stored. Arithmetic is checked: a result that does not fit a
//! `Decimal` is reported as out of range instead of panicking.

use crate::error::{AppError, AppResult};
use crate::utils::{percentage_of, round_decimal};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Decimal places kept on a merged average purchase price.
pub const AVERAGE_PRICE_SCALE: u32 = 2;

/// Upper bound on the share count of one purchase and of a merged holding.
pub const MAX_QUANTITY: Decimal = dec!(1000000000000);

/// Upper bound on a per-share purchase price.
pub const MAX_PRICE: Decimal = dec!(1000000000000);

fn out_of_range() -> AppError {
    AppError::InvalidInput("Position value is out of range".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Valuation {
    pub current_value: Decimal,
    pub cost_basis: Decimal,
    pub profit_loss: Decimal,
    pub profit_loss_percentage: Decimal,
}

pub fn value_position(quantity: Decimal, average_cost: Decimal, current_price: Decimal) -> AppResult<Valuation> {
    let current_value = current_price.checked_mul(quantity).ok_or_else(out_of_range)?;
    let cost_basis = average_cost.checked_mul(quantity).ok_or_else(out_of_range)?;
    let profit_loss = current_value.checked_sub(cost_basis).ok_or_else(out_of_range)?;

    Ok(Valuation {
        current_value,
        cost_basis,
        profit_loss,
        profit_loss_percentage: percentage_of(profit_loss, cost_basis).ok_or_else(out_of_range)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortfolioTotals {
    pub total_value: Decimal,
    pub total_cost: Decimal,
    pub total_profit_loss: Decimal,
    pub total_profit_loss_percentage: Decimal,
}

/// Sums unrounded valuations; the only rounding is on the final percentage.
pub fn aggregate<'a, I>(valuations: I) -> AppResult<PortfolioTotals>
where
    I: IntoIterator<Item = &'a Valuation>,
{
    let (total_value, total_cost) = valuations
        .into_iter()
        .try_fold((Decimal::ZERO, Decimal::ZERO), |(value, cost), v| {
            Some((value.checked_add(v.current_value)?, cost.checked_add(v.cost_basis)?))
        })
        .ok_or_else(out_of_range)?;
    let total_profit_loss = total_value.checked_sub(total_cost).ok_or_else(out_of_range)?;

    Ok(PortfolioTotals {
        total_value,
        total_cost,
        total_profit_loss,
        total_profit_loss_percentage: percentage_of(total_profit_loss, total_cost)
            .ok_or_else(out_of_range)?,
    })
}

/// A single buy: how many shares and at what price each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Purchase {
    pub quantity: Decimal,
    pub price: Decimal,
}

impl Purchase {
    /// Both quantity and price must be strictly positive and within
    /// [`MAX_QUANTITY`] and [`MAX_PRICE`].
    pub fn new(quantity: Decimal, price: Decimal) -> AppResult<Self> {
        if quantity <= Decimal::ZERO {
            return Err(AppError::InvalidInput(
                "Quantity must be greater than 0".to_string(),
            ));
        }
        if price <= Decimal::ZERO {
            return Err(AppError::InvalidInput(
                "Purchase price must be greater than 0".to_string(),
            ));
        }
        if quantity > MAX_QUANTITY {
            return Err(AppError::InvalidInput(format!(
                "Quantity must not exceed {MAX_QUANTITY}"
            )));
        }
        if price > MAX_PRICE {
            return Err(AppError::InvalidInput(format!(
                "Purchase price must not exceed {MAX_PRICE}"
            )));
        }
        Ok(Self { quantity, price })
    }
}

/// Aggregate quantity and average cost of a holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub quantity: Decimal,
    pub average_price: Decimal,
    pub acquired_at: DateTime<Utc>,
}

/// Folds a purchase into the existing position, or opens one verbatim.
/// The acquisition time of an existing position is kept. A merge that would
/// push the quantity past [`MAX_QUANTITY`] is rejected.
pub fn merge_purchase(existing: Option<Position>, purchase: Purchase, now: DateTime<Utc>) -> AppResult<Position> {
    let Some(held) = existing else {
        return Ok(Position {
            quantity: purchase.quantity,
            average_price: purchase.price,
            acquired_at: now,
        });
    };

    let quantity = held.quantity.checked_add(purchase.quantity).ok_or_else(out_of_range)?;
    if quantity > MAX_QUANTITY {
        return Err(AppError::InvalidInput(format!(
            "Holding quantity must not exceed {MAX_QUANTITY}"
        )));
    }
    let total_cost = held
        .average_price
        .checked_mul(held.quantity)
        .zip(purchase.price.checked_mul(purchase.quantity))
        .and_then(|(a, b)| a.checked_add(b))
        .ok_or_else(out_of_range)?;
    let average = total_cost.checked_div(quantity).ok_or_else(out_of_range)?;

    Ok(Position {
        quantity,
        average_price: round_decimal(average, AVERAGE_PRICE_SCALE),
        acquired_at: held.acquired_at,
    })
}
