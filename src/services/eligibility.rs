//! Coupon eligibility evaluation.
//!
//! The core is [`evaluate_coupon`], a pure function over a coupon snapshot
//! and an order context. Checks run in a fixed order and short-circuit on
//! the first failure, so the reported reason is deterministic. The function
//! has no side effects and is safe to call repeatedly, e.g. for live
//! "apply coupon" feedback while the shopper edits their cart.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        coupon::{self, CouponScope, UserEligibility},
        coupon_usage,
    },
    errors::{CouponError, IneligibilityReason},
};

/// One cart line as seen at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LineItem {
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub category: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

impl LineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Snapshot of the order a coupon is being applied to.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderContext {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<LineItem>,

    pub customer_id: Uuid,

    /// True when the customer has no prior completed orders.
    #[serde(default)]
    pub is_new_customer: bool,
}

impl OrderContext {
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(LineItem::line_total).sum()
    }
}

/// The lines of an order that fall inside a coupon's scope, with the
/// subtotal and quantity summed over those lines only. A coupon never
/// discounts non-matching items.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScopeMatch {
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub quantity: i32,
}

/// Eligibility verdict: either the matched slice of the order, or a single
/// specific reason the coupon does not apply.
#[derive(Debug, Clone)]
pub enum Eligibility {
    Eligible(ScopeMatch),
    Ineligible(IneligibilityReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible(_))
    }
}

fn matches_scope(scope: &CouponScope, item: &LineItem) -> bool {
    match scope {
        CouponScope::Platform => true,
        CouponScope::Seller { seller_id } => item.seller_id == *seller_id,
        CouponScope::Products { product_ids } => product_ids.contains(&item.product_id),
        CouponScope::Categories { categories } => categories.contains(&item.category),
    }
}

/// Evaluate a coupon against an order at `as_of`.
///
/// `user_usage` is the customer's redemption count for this coupon, read as
/// a snapshot alongside `coupon.usage_count`. The snapshot makes the check
/// repeatable and side-effect free; the usage ledger re-checks both limits
/// atomically at reservation time, so a stale snapshot can never over-admit.
pub fn evaluate_coupon(
    coupon: &coupon::Model,
    order: &OrderContext,
    user_usage: i32,
    as_of: DateTime<Utc>,
) -> Result<Eligibility, CouponError> {
    if !coupon.is_active {
        return Ok(Eligibility::Ineligible(IneligibilityReason::Inactive));
    }

    if as_of < coupon.valid_from {
        return Ok(Eligibility::Ineligible(IneligibilityReason::NotYetValid));
    }
    if as_of > coupon.valid_until {
        return Ok(Eligibility::Ineligible(IneligibilityReason::Expired));
    }

    let scope = coupon.scope()?;
    let matched: Vec<LineItem> = order
        .items
        .iter()
        .filter(|item| matches_scope(&scope, item))
        .cloned()
        .collect();
    if matched.is_empty() {
        return Ok(Eligibility::Ineligible(IneligibilityReason::ScopeMismatch));
    }

    let subtotal: Decimal = matched.iter().map(LineItem::line_total).sum();
    if subtotal < coupon.min_purchase_amount {
        return Ok(Eligibility::Ineligible(
            IneligibilityReason::BelowMinimumPurchase,
        ));
    }

    let quantity: i32 = matched.iter().map(|item| item.quantity).sum();
    if quantity < coupon.min_item_quantity {
        return Ok(Eligibility::Ineligible(
            IneligibilityReason::BelowMinimumQuantity,
        ));
    }

    match coupon.user_eligibility()? {
        UserEligibility::AllUsers => {}
        UserEligibility::NewCustomersOnly => {
            if !order.is_new_customer {
                return Ok(Eligibility::Ineligible(IneligibilityReason::UserNotEligible));
            }
        }
        UserEligibility::SpecificUsers { customer_ids } => {
            if !customer_ids.contains(&order.customer_id) {
                return Ok(Eligibility::Ineligible(IneligibilityReason::UserNotEligible));
            }
        }
    }

    if coupon.is_exhausted() {
        return Ok(Eligibility::Ineligible(
            IneligibilityReason::UsageLimitExceeded,
        ));
    }
    if user_usage >= coupon.per_user_limit {
        return Ok(Eligibility::Ineligible(
            IneligibilityReason::PerUserLimitExceeded,
        ));
    }

    Ok(Eligibility::Eligible(ScopeMatch {
        items: matched,
        subtotal,
        quantity,
    }))
}

/// Read-only entry point used for live coupon validation.
#[derive(Clone)]
pub struct EligibilityService {
    db: Arc<DatabaseConnection>,
}

impl EligibilityService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Look up a coupon by code, matching case-insensitively.
    pub async fn find_coupon(&self, code: &str) -> Result<coupon::Model, CouponError> {
        let normalized = coupon::normalize_code(code);

        coupon::Entity::find()
            .filter(coupon::Column::Code.eq(normalized.clone()))
            .one(&*self.db)
            .await?
            .ok_or(CouponError::NotFound(normalized))
    }

    /// The customer's current redemption count for a coupon (0 if none).
    pub async fn user_usage(
        &self,
        coupon_id: Uuid,
        customer_id: Uuid,
    ) -> Result<i32, CouponError> {
        Ok(coupon_usage::Entity::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon_id))
            .filter(coupon_usage::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .map(|row| row.redemption_count)
            .unwrap_or(0))
    }

    /// Evaluate a coupon code against an order. No side effects; callers may
    /// invoke this as often as they like.
    #[instrument(skip(self, order), fields(customer_id = %order.customer_id))]
    pub async fn evaluate(
        &self,
        code: &str,
        order: &OrderContext,
        as_of: DateTime<Utc>,
    ) -> Result<Eligibility, CouponError> {
        let coupon = self.find_coupon(code).await?;
        let user_usage = self.user_usage(coupon.id, order.customer_id).await?;
        evaluate_coupon(&coupon, order, user_usage, as_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::coupon::DiscountType;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    fn test_coupon(now: DateTime<Utc>) -> coupon::Model {
        coupon::Model {
            id: Uuid::new_v4(),
            code: "TEST10".to_string(),
            discount_type: DiscountType::Percentage,
            value: dec!(10),
            max_discount_amount: None,
            scope: serde_json::to_string(&CouponScope::Platform).unwrap(),
            min_purchase_amount: Decimal::ZERO,
            min_item_quantity: 0,
            valid_from: now - chrono::Duration::days(1),
            valid_until: now + chrono::Duration::days(30),
            user_eligibility: serde_json::to_string(&UserEligibility::AllUsers).unwrap(),
            usage_limit: None,
            per_user_limit: 1,
            usage_count: 0,
            is_active: true,
            created_at: now,
            updated_at: None,
        }
    }

    fn item(seller: Uuid, category: &str, price: Decimal, quantity: i32) -> LineItem {
        LineItem {
            product_id: Uuid::new_v4(),
            seller_id: seller,
            category: category.to_string(),
            unit_price: price,
            quantity,
        }
    }

    fn order(items: Vec<LineItem>) -> OrderContext {
        OrderContext {
            items,
            customer_id: Uuid::new_v4(),
            is_new_customer: false,
        }
    }

    fn reason(verdict: Eligibility) -> IneligibilityReason {
        match verdict {
            Eligibility::Ineligible(reason) => reason,
            Eligibility::Eligible(matched) => panic!("expected ineligible, got {:?}", matched),
        }
    }

    #[test]
    fn inactive_wins_over_every_other_check() {
        let now = Utc::now();
        let mut c = test_coupon(now);
        c.is_active = false;
        // Also expired; the fixed check order must still report Inactive.
        c.valid_until = now - chrono::Duration::days(1);

        let o = order(vec![item(Uuid::new_v4(), "Apparel", dec!(50), 1)]);
        let verdict = evaluate_coupon(&c, &o, 0, now).unwrap();
        assert_eq!(reason(verdict), IneligibilityReason::Inactive);
    }

    #[test]
    fn date_window_is_checked_against_as_of() {
        let now = Utc::now();
        let mut c = test_coupon(now);
        c.valid_from = now + chrono::Duration::days(1);

        let o = order(vec![item(Uuid::new_v4(), "Apparel", dec!(50), 1)]);
        let verdict = evaluate_coupon(&c, &o, 0, now).unwrap();
        assert_eq!(reason(verdict), IneligibilityReason::NotYetValid);

        c.valid_from = now - chrono::Duration::days(10);
        c.valid_until = now - chrono::Duration::days(1);
        let verdict = evaluate_coupon(&c, &o, 0, now).unwrap();
        assert_eq!(reason(verdict), IneligibilityReason::Expired);
    }

    #[test]
    fn category_scope_rejects_non_matching_cart() {
        let now = Utc::now();
        let mut c = test_coupon(now);
        let categories: HashSet<String> = ["Electronics".to_string()].into_iter().collect();
        c.scope = serde_json::to_string(&CouponScope::Categories { categories }).unwrap();

        let o = order(vec![item(Uuid::new_v4(), "Apparel", dec!(80), 2)]);
        let verdict = evaluate_coupon(&c, &o, 0, now).unwrap();
        assert_eq!(reason(verdict), IneligibilityReason::ScopeMismatch);
    }

    #[test]
    fn partial_scope_match_excludes_non_matching_lines() {
        let now = Utc::now();
        let mut c = test_coupon(now);
        let categories: HashSet<String> = ["Electronics".to_string()].into_iter().collect();
        c.scope = serde_json::to_string(&CouponScope::Categories { categories }).unwrap();

        let o = order(vec![
            item(Uuid::new_v4(), "Electronics", dec!(200), 1),
            item(Uuid::new_v4(), "Apparel", dec!(50), 3),
        ]);

        match evaluate_coupon(&c, &o, 0, now).unwrap() {
            Eligibility::Eligible(matched) => {
                assert_eq!(matched.items.len(), 1);
                assert_eq!(matched.subtotal, dec!(200));
                assert_eq!(matched.quantity, 1);
            }
            Eligibility::Ineligible(reason) => panic!("expected eligible, got {:?}", reason),
        }
    }

    #[test]
    fn seller_scope_matches_by_line_seller() {
        let now = Utc::now();
        let seller = Uuid::new_v4();
        let mut c = test_coupon(now);
        c.scope = serde_json::to_string(&CouponScope::Seller { seller_id: seller }).unwrap();

        let o = order(vec![
            item(seller, "Apparel", dec!(40), 2),
            item(Uuid::new_v4(), "Apparel", dec!(100), 1),
        ]);

        match evaluate_coupon(&c, &o, 0, now).unwrap() {
            Eligibility::Eligible(matched) => assert_eq!(matched.subtotal, dec!(80)),
            Eligibility::Ineligible(reason) => panic!("expected eligible, got {:?}", reason),
        }
    }

    #[test]
    fn minimums_apply_to_matched_lines_only() {
        let now = Utc::now();
        let seller = Uuid::new_v4();
        let mut c = test_coupon(now);
        c.scope = serde_json::to_string(&CouponScope::Seller { seller_id: seller }).unwrap();
        c.min_purchase_amount = dec!(100);

        // Cart subtotal is 180, but only 80 of it belongs to the seller.
        let o = order(vec![
            item(seller, "Apparel", dec!(40), 2),
            item(Uuid::new_v4(), "Apparel", dec!(100), 1),
        ]);
        let verdict = evaluate_coupon(&c, &o, 0, now).unwrap();
        assert_eq!(reason(verdict), IneligibilityReason::BelowMinimumPurchase);

        c.min_purchase_amount = Decimal::ZERO;
        c.min_item_quantity = 3;
        let verdict = evaluate_coupon(&c, &o, 0, now).unwrap();
        assert_eq!(reason(verdict), IneligibilityReason::BelowMinimumQuantity);
    }

    #[test]
    fn new_customers_only_requires_the_snapshot_flag() {
        let now = Utc::now();
        let mut c = test_coupon(now);
        c.user_eligibility = serde_json::to_string(&UserEligibility::NewCustomersOnly).unwrap();

        let mut o = order(vec![item(Uuid::new_v4(), "Apparel", dec!(50), 1)]);
        let verdict = evaluate_coupon(&c, &o, 0, now).unwrap();
        assert_eq!(reason(verdict), IneligibilityReason::UserNotEligible);

        o.is_new_customer = true;
        assert!(evaluate_coupon(&c, &o, 0, now).unwrap().is_eligible());
    }

    #[test]
    fn specific_users_checks_membership() {
        let now = Utc::now();
        let mut c = test_coupon(now);
        let o = order(vec![item(Uuid::new_v4(), "Apparel", dec!(50), 1)]);
        let customer_ids: HashSet<Uuid> = [o.customer_id].into_iter().collect();
        c.user_eligibility =
            serde_json::to_string(&UserEligibility::SpecificUsers { customer_ids }).unwrap();

        assert!(evaluate_coupon(&c, &o, 0, now).unwrap().is_eligible());

        let customer_ids: HashSet<Uuid> = [Uuid::new_v4()].into_iter().collect();
        c.user_eligibility =
            serde_json::to_string(&UserEligibility::SpecificUsers { customer_ids }).unwrap();
        let verdict = evaluate_coupon(&c, &o, 0, now).unwrap();
        assert_eq!(reason(verdict), IneligibilityReason::UserNotEligible);
    }

    #[test]
    fn usage_snapshot_limits_are_the_last_checks() {
        let now = Utc::now();
        let mut c = test_coupon(now);
        c.usage_limit = Some(5);
        c.usage_count = 5;

        let o = order(vec![item(Uuid::new_v4(), "Apparel", dec!(50), 1)]);
        let verdict = evaluate_coupon(&c, &o, 0, now).unwrap();
        assert_eq!(reason(verdict), IneligibilityReason::UsageLimitExceeded);

        c.usage_count = 4;
        let verdict = evaluate_coupon(&c, &o, 1, now).unwrap();
        assert_eq!(reason(verdict), IneligibilityReason::PerUserLimitExceeded);

        assert!(evaluate_coupon(&c, &o, 0, now).unwrap().is_eligible());
    }
}
