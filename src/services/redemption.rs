//! Transactional coupon redemption.
//!
//! `RedemptionService` is the single entry point checkout uses to commit a
//! coupon: idempotency check, eligibility evaluation, atomic usage
//! reservation, discount calculation, and the audit record, with a bounded
//! retry loop around reservation conflicts.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::redemption,
    errors::{CouponError, IneligibilityReason},
    events::{Event, EventSender},
    services::{
        discount,
        eligibility::{evaluate_coupon, Eligibility, EligibilityService, OrderContext},
        usage_ledger::UsageLedger,
    },
};

lazy_static! {
    static ref COUPON_REDEMPTIONS: IntCounter = IntCounter::new(
        "coupon_redemptions_total",
        "Total number of successful coupon redemptions"
    )
    .expect("metric can be created");
    static ref COUPON_REDEMPTION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "coupon_redemption_failures_total",
            "Total number of failed coupon redemptions"
        ),
        &["reason"]
    )
    .expect("metric can be created");
    static ref COUPON_RELEASES: IntCounter = IntCounter::new(
        "coupon_releases_total",
        "Total number of released coupon redemptions"
    )
    .expect("metric can be created");
}

/// Result of a committed redemption, as returned to the checkout flow.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Redemption {
    pub coupon_id: Uuid,
    pub order_id: Uuid,
    pub discount: Decimal,
    pub waives_shipping: bool,
    pub redeemed_at: DateTime<Utc>,
}

impl From<redemption::Model> for Redemption {
    fn from(record: redemption::Model) -> Self {
        Self {
            coupon_id: record.coupon_id,
            order_id: record.order_id,
            discount: record.discount_applied,
            waives_shipping: record.waives_shipping,
            redeemed_at: record.redeemed_at,
        }
    }
}

fn failure_label(err: &CouponError) -> &str {
    match err {
        CouponError::NotFound(_) => "not_found",
        CouponError::Ineligible(reason) => reason.as_ref(),
        CouponError::ConcurrentModification(_) => "contention",
        _ => "error",
    }
}

#[derive(Clone)]
pub struct RedemptionService {
    eligibility: EligibilityService,
    ledger: UsageLedger,
    event_sender: EventSender,
    max_reserve_attempts: u32,
}

impl RedemptionService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        max_reserve_attempts: u32,
    ) -> Self {
        Self {
            eligibility: EligibilityService::new(db.clone()),
            ledger: UsageLedger::new(db),
            event_sender,
            max_reserve_attempts: max_reserve_attempts.max(1),
        }
    }

    /// Redeem a coupon for an order at checkout commit time.
    ///
    /// Calling this again with the same `(coupon, order_id)` replays the
    /// stored result; the usage counters move only once.
    #[instrument(skip(self, order), fields(order_id = %order_id, customer_id = %order.customer_id))]
    pub async fn redeem(
        &self,
        code: &str,
        order: &OrderContext,
        order_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Redemption, CouponError> {
        order.validate()?;

        let result = self.redeem_inner(code, order, order_id, as_of).await;
        match &result {
            Ok(redemption) => {
                COUPON_REDEMPTIONS.inc();
                info!(
                    coupon_id = %redemption.coupon_id,
                    order_id = %order_id,
                    discount = %redemption.discount,
                    "Coupon redeemed"
                );
            }
            Err(e) => {
                COUPON_REDEMPTION_FAILURES
                    .with_label_values(&[failure_label(e)])
                    .inc();
            }
        }
        result
    }

    async fn redeem_inner(
        &self,
        code: &str,
        order: &OrderContext,
        order_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Redemption, CouponError> {
        let mut coupon = self.eligibility.find_coupon(code).await?;

        for attempt in 1..=self.max_reserve_attempts {
            // Idempotency: an already-recorded (coupon, order) pair replays
            // its stored result without re-evaluation or re-counting.
            if let Some(existing) = self.ledger.find_redemption(coupon.id, order_id).await? {
                debug!(order_id = %order_id, "Replaying stored redemption");
                return Ok(existing.into());
            }

            let user_usage = self
                .eligibility
                .user_usage(coupon.id, order.customer_id)
                .await?;
            let matched = match evaluate_coupon(&coupon, order, user_usage, as_of)? {
                Eligibility::Eligible(matched) => matched,
                Eligibility::Ineligible(reason) => return Err(CouponError::Ineligible(reason)),
            };

            let discount = discount::calculate(&coupon, matched.subtotal);

            match self
                .ledger
                .try_reserve(&coupon, order.customer_id, order_id, &discount)
                .await
            {
                Ok(record) => {
                    let event = Event::CouponRedeemed {
                        coupon_id: coupon.id,
                        order_id,
                        customer_id: order.customer_id,
                        amount: record.discount_applied,
                    };
                    if let Err(e) = self.event_sender.send(event).await {
                        warn!("Failed to send redemption event: {}", e);
                    }
                    return Ok(record.into());
                }
                Err(CouponError::ReservationConflict) => {
                    warn!(
                        attempt,
                        coupon_id = %coupon.id,
                        "Reservation conflict, retrying"
                    );
                    // Counters moved under us; work from a fresh row.
                    coupon = self.eligibility.find_coupon(code).await?;
                }
                Err(e) => {
                    if matches!(
                        e,
                        CouponError::Ineligible(IneligibilityReason::UsageLimitExceeded)
                    ) {
                        if let Err(send_err) =
                            self.event_sender.send(Event::CouponExhausted(coupon.id)).await
                        {
                            warn!("Failed to send exhaustion event: {}", send_err);
                        }
                    }
                    return Err(e);
                }
            }
        }

        Err(CouponError::ConcurrentModification(coupon.id))
    }

    /// Compensation for an order that failed or was cancelled after a
    /// successful redemption. Idempotent.
    #[instrument(skip(self))]
    pub async fn release(&self, coupon_id: Uuid, order_id: Uuid) -> Result<(), CouponError> {
        if let Some(record) = self.ledger.release(coupon_id, order_id).await? {
            COUPON_RELEASES.inc();
            let event = Event::RedemptionReleased {
                coupon_id,
                order_id,
                customer_id: record.customer_id,
            };
            if let Err(e) = self.event_sender.send(event).await {
                warn!("Failed to send release event: {}", e);
            }
        }
        Ok(())
    }
}
