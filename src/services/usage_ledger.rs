//! Redemption counting with atomic conditional reservation.
//!
//! The ledger owns the only shared mutable state in the engine: the total
//! usage counter on the coupon row, the per-customer counter rows, and the
//! append-only redemption records. A usage slot is taken with conditional
//! `UPDATE ... WHERE count < limit` statements inside one transaction, so
//! two concurrent redemptions can never both observe `count = limit - 1`
//! and both commit. A plain read-then-write is deliberately absent here.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, SqlErr, TransactionTrait,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    entities::{coupon, coupon_usage, redemption},
    errors::{CouponError, IneligibilityReason},
    services::discount::DiscountResult,
};

fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[derive(Clone)]
pub struct UsageLedger {
    db: Arc<DatabaseConnection>,
}

impl UsageLedger {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The stored redemption record for `(coupon_id, order_id)`, if any.
    pub async fn find_redemption(
        &self,
        coupon_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<redemption::Model>, CouponError> {
        Ok(redemption::Entity::find()
            .filter(redemption::Column::CouponId.eq(coupon_id))
            .filter(redemption::Column::OrderId.eq(order_id))
            .one(&*self.db)
            .await?)
    }

    /// One reservation attempt: increment both counters conditionally and
    /// append the redemption record, all in a single transaction.
    ///
    /// Outcomes:
    /// - `Ok(record)` — the slot is committed.
    /// - `Ineligible(UsageLimitExceeded | PerUserLimitExceeded)` — a limit
    ///   was reached between the eligibility snapshot and commit. Terminal.
    /// - `ReservationConflict` — lost an insert race (first per-user row, or
    ///   a duplicate `(coupon_id, order_id)` record). Retryable; the
    ///   coordinator decides how often.
    #[instrument(skip(self, coupon, discount), fields(coupon_id = %coupon.id, order_id = %order_id))]
    pub async fn try_reserve(
        &self,
        coupon: &coupon::Model,
        customer_id: Uuid,
        order_id: Uuid,
        discount: &DiscountResult,
    ) -> Result<redemption::Model, CouponError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();

        let mut update = coupon::Entity::update_many()
            .col_expr(
                coupon::Column::UsageCount,
                Expr::col(coupon::Column::UsageCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(now))
            .filter(coupon::Column::Id.eq(coupon.id));
        if coupon.usage_limit.is_some() {
            update = update.filter(
                Expr::col(coupon::Column::UsageCount).lt(Expr::col(coupon::Column::UsageLimit)),
            );
        }
        let total = update.exec(&txn).await?;
        if total.rows_affected == 0 {
            return Err(CouponError::Ineligible(
                IneligibilityReason::UsageLimitExceeded,
            ));
        }

        let per_user = coupon_usage::Entity::update_many()
            .col_expr(
                coupon_usage::Column::RedemptionCount,
                Expr::col(coupon_usage::Column::RedemptionCount).add(1),
            )
            .col_expr(coupon_usage::Column::UpdatedAt, Expr::value(now))
            .filter(coupon_usage::Column::CouponId.eq(coupon.id))
            .filter(coupon_usage::Column::CustomerId.eq(customer_id))
            .filter(coupon_usage::Column::RedemptionCount.lt(coupon.per_user_limit))
            .exec(&txn)
            .await?;

        if per_user.rows_affected == 0 {
            let existing = coupon_usage::Entity::find()
                .filter(coupon_usage::Column::CouponId.eq(coupon.id))
                .filter(coupon_usage::Column::CustomerId.eq(customer_id))
                .one(&txn)
                .await?;

            match existing {
                // The row exists and failed the conditional: at the limit.
                Some(_) => {
                    return Err(CouponError::Ineligible(
                        IneligibilityReason::PerUserLimitExceeded,
                    ));
                }
                None => {
                    if coupon.per_user_limit < 1 {
                        return Err(CouponError::Ineligible(
                            IneligibilityReason::PerUserLimitExceeded,
                        ));
                    }
                    let row = coupon_usage::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        coupon_id: Set(coupon.id),
                        customer_id: Set(customer_id),
                        redemption_count: Set(1),
                        updated_at: Set(now),
                    };
                    if let Err(e) = row.insert(&txn).await {
                        if is_unique_violation(&e) {
                            // Another redemption inserted this customer's
                            // first counter row since our UPDATE saw none.
                            return Err(CouponError::ReservationConflict);
                        }
                        return Err(e.into());
                    }
                }
            }
        }

        let record = redemption::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(coupon.id),
            order_id: Set(order_id),
            customer_id: Set(customer_id),
            discount_applied: Set(discount.amount),
            waives_shipping: Set(discount.waives_shipping),
            redeemed_at: Set(now),
        };
        let record = match record.insert(&txn).await {
            Ok(model) => model,
            Err(e) if is_unique_violation(&e) => {
                // Concurrent redemption of the same (coupon, order). Dropping
                // the transaction rolls our increments back; the coordinator
                // replays the winner's stored record.
                return Err(CouponError::ReservationConflict);
            }
            Err(e) => return Err(e.into()),
        };

        txn.commit().await?;

        debug!(
            coupon_id = %coupon.id,
            customer_id = %customer_id,
            "Reserved usage slot"
        );

        Ok(record)
    }

    /// Compensating action for an order that failed or was cancelled after a
    /// successful reservation: decrement both counters and remove the
    /// redemption record. Idempotent; a no-op when the record is absent.
    #[instrument(skip(self))]
    pub async fn release(
        &self,
        coupon_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<redemption::Model>, CouponError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();

        let Some(record) = redemption::Entity::find()
            .filter(redemption::Column::CouponId.eq(coupon_id))
            .filter(redemption::Column::OrderId.eq(order_id))
            .one(&txn)
            .await?
        else {
            return Ok(None);
        };

        let deleted = redemption::Entity::delete_by_id(record.id).exec(&txn).await?;
        if deleted.rows_affected == 0 {
            // A concurrent release got here first; it owns the decrements.
            return Ok(None);
        }

        coupon::Entity::update_many()
            .col_expr(
                coupon::Column::UsageCount,
                Expr::col(coupon::Column::UsageCount).sub(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(now))
            .filter(coupon::Column::Id.eq(coupon_id))
            .filter(coupon::Column::UsageCount.gt(0))
            .exec(&txn)
            .await?;

        coupon_usage::Entity::update_many()
            .col_expr(
                coupon_usage::Column::RedemptionCount,
                Expr::col(coupon_usage::Column::RedemptionCount).sub(1),
            )
            .col_expr(coupon_usage::Column::UpdatedAt, Expr::value(now))
            .filter(coupon_usage::Column::CouponId.eq(coupon_id))
            .filter(coupon_usage::Column::CustomerId.eq(record.customer_id))
            .filter(coupon_usage::Column::RedemptionCount.gt(0))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        info!(
            coupon_id = %coupon_id,
            order_id = %order_id,
            "Released usage slot"
        );

        Ok(Some(record))
    }
}
