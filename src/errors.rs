use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Why a coupon cannot be applied to an order.
///
/// Every variant maps to exactly one fixed, user-facing message
/// (`user_message`). The UI renders that message verbatim; it never has to
/// infer the reason from a generic failure.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IneligibilityReason {
    Inactive,
    NotYetValid,
    Expired,
    ScopeMismatch,
    BelowMinimumPurchase,
    BelowMinimumQuantity,
    UserNotEligible,
    UsageLimitExceeded,
    PerUserLimitExceeded,
}

impl IneligibilityReason {
    /// The one fixed message surfaced to shoppers for this reason.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Inactive => "This coupon is not active.",
            Self::NotYetValid => "This coupon is not valid yet.",
            Self::Expired => "This coupon has expired.",
            Self::ScopeMismatch => "This coupon does not apply to any item in your order.",
            Self::BelowMinimumPurchase => {
                "Your order does not meet the minimum purchase amount for this coupon."
            }
            Self::BelowMinimumQuantity => {
                "Your order does not include enough eligible items for this coupon."
            }
            Self::UserNotEligible => "This coupon is not available for your account.",
            Self::UsageLimitExceeded => "This coupon has reached its redemption limit.",
            Self::PerUserLimitExceeded => {
                "You have already used this coupon the maximum number of times."
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CouponError {
    #[error("Coupon not found: {0}")]
    NotFound(String),

    #[error("{}", .0.user_message())]
    Ineligible(IneligibilityReason),

    /// Lost a usage-slot race to a concurrent redemption. Internal and
    /// retryable: the coordinator retries a bounded number of times; this
    /// variant never crosses the service boundary.
    #[error("Reservation conflict")]
    ReservationConflict,

    #[error("Concurrent modification of coupon {0}")]
    ConcurrentModification(Uuid),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for CouponError {
    fn from(err: validator::ValidationErrors) -> Self {
        CouponError::ValidationError(err.to_string())
    }
}

impl CouponError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Ineligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ReservationConflict | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message suitable for HTTP responses. Infrastructure errors return
    /// generic text so implementation details never leak to clients.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// The taxonomy value carried by this error, when it is a business
    /// outcome rather than an infrastructure failure.
    pub fn ineligibility_reason(&self) -> Option<IneligibilityReason> {
        match self {
            Self::Ineligible(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Standardized error payload returned by the HTTP layer.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Unprocessable Entity")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable ineligibility reason, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<IneligibilityReason>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

impl IntoResponse for CouponError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            reason: self.ineligibility_reason(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_code_mapping() {
        assert_eq!(
            CouponError::NotFound("SAVE10".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CouponError::Ineligible(IneligibilityReason::Expired).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            CouponError::ReservationConflict.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CouponError::ConcurrentModification(Uuid::new_v4()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CouponError::ValidationError("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CouponError::InternalError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            CouponError::InternalError("connection pool exhausted".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            CouponError::NotFound("WELCOME".into()).response_message(),
            "Coupon not found: WELCOME"
        );
    }

    #[test]
    fn each_reason_has_a_distinct_fixed_message() {
        let reasons = [
            IneligibilityReason::Inactive,
            IneligibilityReason::NotYetValid,
            IneligibilityReason::Expired,
            IneligibilityReason::ScopeMismatch,
            IneligibilityReason::BelowMinimumPurchase,
            IneligibilityReason::BelowMinimumQuantity,
            IneligibilityReason::UserNotEligible,
            IneligibilityReason::UsageLimitExceeded,
            IneligibilityReason::PerUserLimitExceeded,
        ];
        let mut messages: Vec<&str> = reasons.iter().map(|r| r.user_message()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), reasons.len());
    }

    #[test]
    fn ineligible_error_uses_the_fixed_message() {
        let err = CouponError::Ineligible(IneligibilityReason::UsageLimitExceeded);
        assert_eq!(
            err.to_string(),
            IneligibilityReason::UsageLimitExceeded.user_message()
        );
    }

    #[test]
    fn reason_serializes_snake_case() {
        assert_eq!(
            IneligibilityReason::PerUserLimitExceeded.to_string(),
            "per_user_limit_exceeded"
        );
        let json = serde_json::to_string(&IneligibilityReason::ScopeMismatch).unwrap();
        assert_eq!(json, "\"scope_mismatch\"");
    }
}
