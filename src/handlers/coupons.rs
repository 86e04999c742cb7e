use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::coupon::{CouponStatus, DiscountType},
    errors::{CouponError, IneligibilityReason},
    services::{
        discount,
        eligibility::{evaluate_coupon, Eligibility, OrderContext},
        redemption::Redemption,
    },
    ApiResponse, ApiResult, AppState,
};

/// Creates the router for coupon endpoints
pub fn coupon_routes() -> Router<AppState> {
    Router::new()
        .route("/evaluate", post(evaluate))
        .route("/redeem", post(redeem))
        .route("/release", post(release))
        .route("/:code", get(get_coupon))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EvaluateCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate]
    pub order: OrderContext,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EligibilityResponse {
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<IneligibilityReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_subtotal: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waives_shipping: Option<bool>,
}

/// Live coupon validation for the storefront. Read-only; safe to call on
/// every cart edit. An ineligible coupon is a successful response here, not
/// an error: the UI needs the reason and its fixed message.
async fn evaluate(
    State(state): State<AppState>,
    Json(payload): Json<EvaluateCouponRequest>,
) -> ApiResult<EligibilityResponse> {
    payload.validate()?;

    let coupon = state.eligibility.find_coupon(&payload.code).await?;
    let user_usage = state
        .eligibility
        .user_usage(coupon.id, payload.order.customer_id)
        .await?;

    let response = match evaluate_coupon(&coupon, &payload.order, user_usage, Utc::now())? {
        Eligibility::Eligible(matched) => {
            let preview = discount::calculate(&coupon, matched.subtotal);
            EligibilityResponse {
                eligible: true,
                reason: None,
                message: None,
                matched_subtotal: Some(matched.subtotal),
                discount: Some(preview.amount),
                waives_shipping: Some(preview.waives_shipping),
            }
        }
        Eligibility::Ineligible(reason) => EligibilityResponse {
            eligible: false,
            reason: Some(reason),
            message: Some(reason.user_message().to_string()),
            matched_subtotal: None,
            discount: None,
            waives_shipping: None,
        },
    };

    Ok(Json(ApiResponse::success(response)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RedeemCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub order_id: Uuid,
    #[validate]
    pub order: OrderContext,
}

/// Commit a coupon to an order at checkout. Exactly-once per
/// `(coupon, order)`: repeated calls replay the stored result.
async fn redeem(
    State(state): State<AppState>,
    Json(payload): Json<RedeemCouponRequest>,
) -> ApiResult<Redemption> {
    payload.validate()?;

    let redemption = state
        .redemptions
        .redeem(&payload.code, &payload.order, payload.order_id, Utc::now())
        .await?;

    Ok(Json(ApiResponse::success(redemption)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReleaseRedemptionRequest {
    pub coupon_id: Uuid,
    pub order_id: Uuid,
}

/// Compensation hook for the order-failure/cancellation path. Idempotent.
async fn release(
    State(state): State<AppState>,
    Json(payload): Json<ReleaseRedemptionRequest>,
) -> Result<StatusCode, CouponError> {
    state
        .redemptions
        .release(payload.coupon_id, payload.order_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponSummaryResponse {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_discount_amount: Option<Decimal>,
    pub status: CouponStatus,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub per_user_limit: i32,
}

/// Coupon summary with the lifecycle state derived at read time.
async fn get_coupon(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<CouponSummaryResponse> {
    let coupon = state.eligibility.find_coupon(&code).await?;
    let status = coupon.status_at(Utc::now());

    Ok(Json(ApiResponse::success(CouponSummaryResponse {
        id: coupon.id,
        code: coupon.code,
        discount_type: coupon.discount_type,
        value: coupon.value,
        max_discount_amount: coupon.max_discount_amount,
        status,
        valid_from: coupon.valid_from,
        valid_until: coupon.valid_until,
        usage_limit: coupon.usage_limit,
        usage_count: coupon.usage_count,
        per_user_limit: coupon.per_user_limit,
    })))
}
