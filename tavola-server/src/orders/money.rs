//! Money calculation utilities using rust_decimal for precision
//!
//! All monetary arithmetic runs on `Decimal` and is rounded to 2 decimal
//! places (half-up) before being stored as `f64`. Pricing is deterministic:
//! the same items, tax rate, tip and promo code always yield the same
//! totals.

use rust_decimal::prelude::*;
use shared::{AppError, AppResult, OrderItem};

const DECIMAL_PLACES: u32 = 2;

/// Maximum allowed unit price per line item
const MAX_PRICE: f64 = 1_000_000.0;
/// Maximum allowed quantity per line item
const MAX_QUANTITY: i64 = 9999;

/// Computed pricing of an order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTotals {
    pub subtotal: f64,
    pub tax: f64,
    pub tip: f64,
    pub discount: f64,
    pub total: f64,
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

fn decimal(value: f64, field: &str) -> AppResult<Decimal> {
    if !value.is_finite() {
        return Err(AppError::validation(format!(
            "{field} must be a finite number, got {value}"
        )));
    }
    Decimal::from_f64(value)
        .ok_or_else(|| AppError::validation(format!("{field} is out of range: {value}")))
}

/// The fixed promo-code table.
///
/// Returns the discount for `code` given the order subtotal, or None for an
/// unknown code.
fn promo_discount(code: &str, subtotal: Decimal) -> Option<Decimal> {
    let discount = match code.trim().to_ascii_uppercase().as_str() {
        // 10% off
        "WELCOME10" => subtotal * Decimal::new(10, 2),
        // 20% off
        "FEAST20" => subtotal * Decimal::new(20, 2),
        // flat 5.00 off
        "SAVE5" => Decimal::new(500, 2),
        _ => return None,
    };
    Some(round2(discount))
}

/// Validate a line item before it is snapshotted into an order
pub fn validate_item(item: &OrderItem) -> AppResult<()> {
    if !item.price.is_finite() || item.price < 0.0 {
        return Err(AppError::validation(format!(
            "price must be non-negative, got {}",
            item.price
        )));
    }
    if item.price > MAX_PRICE {
        return Err(AppError::validation(format!(
            "price exceeds maximum allowed ({MAX_PRICE}), got {}",
            item.price
        )));
    }
    if item.quantity <= 0 {
        return Err(AppError::validation(format!(
            "quantity must be positive, got {}",
            item.quantity
        )));
    }
    if item.quantity > MAX_QUANTITY {
        return Err(AppError::validation(format!(
            "quantity exceeds maximum allowed ({MAX_QUANTITY}), got {}",
            item.quantity
        )));
    }
    Ok(())
}

/// Compute subtotal/tax/discount/total for an order.
///
/// `total = max(0, subtotal + tax + tip - discount)`, everything rounded to
/// 2 decimal places. Unknown promo codes are a validation error so the
/// customer can correct them.
pub fn compute_totals(
    items: &[OrderItem],
    tax_rate: f64,
    tip: f64,
    promo_code: Option<&str>,
) -> AppResult<OrderTotals> {
    let mut subtotal = Decimal::ZERO;
    for item in items {
        validate_item(item)?;
        let price = decimal(item.price, "price")?;
        subtotal += price * Decimal::from(item.quantity);
    }
    let subtotal = round2(subtotal);

    let rate = decimal(tax_rate, "tax_rate")?;
    if rate < Decimal::ZERO {
        return Err(AppError::validation("tax_rate must be non-negative"));
    }
    let tax = round2(subtotal * rate);

    let tip_d = decimal(tip, "tip")?;
    if tip_d < Decimal::ZERO {
        return Err(AppError::validation("tip must be non-negative"));
    }
    let tip_d = round2(tip_d);

    let discount = match promo_code {
        Some(code) => promo_discount(code, subtotal)
            .ok_or_else(|| AppError::validation(format!("unknown promo code '{code}'")))?,
        None => Decimal::ZERO,
    };

    let total = round2((subtotal + tax + tip_d - discount).max(Decimal::ZERO));

    Ok(OrderTotals {
        subtotal: subtotal.to_f64().unwrap_or(0.0),
        tax: tax.to_f64().unwrap_or(0.0),
        tip: tip_d.to_f64().unwrap_or(0.0),
        discount: discount.to_f64().unwrap_or(0.0),
        total: total.to_f64().unwrap_or(0.0),
    })
}

/// Amount in the currency's minor unit (cents/paise) for gateway APIs
pub fn to_minor_units(amount: f64) -> AppResult<i64> {
    let amount = decimal(amount, "amount")?;
    (round2(amount) * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| AppError::validation("amount out of range"))
}

/// Sum a list of order totals (bill aggregation), rounded to 2 dp
pub fn sum(amounts: impl IntoIterator<Item = f64>) -> f64 {
    let mut acc = Decimal::ZERO;
    for amount in amounts {
        acc += Decimal::from_f64(amount).unwrap_or_default();
    }
    round2(acc).to_f64().unwrap_or(0.0)
}
