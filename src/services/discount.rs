//! Discount calculation for an eligible coupon.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::coupon::{self, DiscountType};

/// Monetary outcome of applying a coupon to its matched subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DiscountResult {
    pub amount: Decimal,
    pub waives_shipping: bool,
}

/// Compute the discount for a coupon against the matched subtotal.
///
/// Fixed discounts clamp to the matched subtotal: a coupon must never drive
/// an order total negative. Rounding happens exactly once, on the final
/// amount, half-up to 2 decimal places.
pub fn calculate(coupon: &coupon::Model, matched_subtotal: Decimal) -> DiscountResult {
    let (raw, waives_shipping) = match coupon.discount_type {
        DiscountType::Percentage => {
            let raw = matched_subtotal * coupon.value / Decimal::from(100);
            let capped = match coupon.max_discount_amount {
                Some(cap) => raw.min(cap),
                None => raw,
            };
            (capped, false)
        }
        DiscountType::Fixed => (coupon.value.min(matched_subtotal), false),
        DiscountType::FreeShipping => (Decimal::ZERO, true),
    };

    let amount = raw
        .max(Decimal::ZERO)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

    DiscountResult {
        amount,
        waives_shipping,
    }
}
