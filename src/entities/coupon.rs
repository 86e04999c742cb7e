use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{entity::prelude::*, ActiveValue};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::CouponError;

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum DiscountType {
    #[sea_orm(string_value = "Percentage")]
    Percentage,
    #[sea_orm(string_value = "Fixed")]
    Fixed,
    #[sea_orm(string_value = "FreeShipping")]
    FreeShipping,
}

/// The slice of an order a coupon is allowed to discount.
///
/// A closed variant: a `Seller` scope cannot exist without a seller id, and
/// adding a new scope kind forces every consumer through an exhaustive match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CouponScope {
    Platform,
    Seller { seller_id: Uuid },
    Products { product_ids: HashSet<Uuid> },
    Categories { categories: HashSet<String> },
}

/// Which customers a coupon is open to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserEligibility {
    AllUsers,
    NewCustomersOnly,
    SpecificUsers { customer_ids: HashSet<Uuid> },
}

/// Lifecycle state derived from stored fields at read time; never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CouponStatus {
    Draft,
    Active,
    Expired,
    Exhausted,
    Revoked,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Stored case-normalized (trimmed, upper-case); see [`normalize_code`].
    #[sea_orm(unique)]
    pub code: String,

    pub discount_type: DiscountType,
    pub value: Decimal,
    /// Cap on the computed discount; meaningful for percentage coupons only.
    pub max_discount_amount: Option<Decimal>,

    /// JSON-encoded [`CouponScope`], written by the management layer.
    pub scope: String,

    pub min_purchase_amount: Decimal,
    pub min_item_quantity: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,

    /// JSON-encoded [`UserEligibility`].
    pub user_eligibility: String,

    pub usage_limit: Option<i32>,
    pub per_user_limit: i32,
    pub usage_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon_usage::Entity")]
    CouponUsage,
    #[sea_orm(has_many = "super::redemption::Entity")]
    Redemption,
}

impl Related<super::coupon_usage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CouponUsage.def()
    }
}

impl Related<super::redemption::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Redemption.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active = self;
        // Codes are matched case-insensitively; store the canonical form.
        if let ActiveValue::Set(code) = &active.code {
            active.code = ActiveValue::Set(normalize_code(code));
        }
        Ok(active)
    }
}

impl Model {
    pub fn scope(&self) -> Result<CouponScope, CouponError> {
        serde_json::from_str(&self.scope).map_err(|e| {
            CouponError::InternalError(format!("Malformed scope on coupon {}: {}", self.id, e))
        })
    }

    pub fn user_eligibility(&self) -> Result<UserEligibility, CouponError> {
        serde_json::from_str(&self.user_eligibility).map_err(|e| {
            CouponError::InternalError(format!(
                "Malformed user eligibility on coupon {}: {}",
                self.id, e
            ))
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_limit
            .is_some_and(|limit| self.usage_count >= limit)
    }

    /// Derived lifecycle state at `now`. All transitions out of `Active` are
    /// one-way from the engine's perspective; only an administrative edit can
    /// bring a coupon back.
    pub fn status_at(&self, now: DateTime<Utc>) -> CouponStatus {
        if !self.is_active {
            CouponStatus::Revoked
        } else if now < self.valid_from {
            CouponStatus::Draft
        } else if now > self.valid_until {
            CouponStatus::Expired
        } else if self.is_exhausted() {
            CouponStatus::Exhausted
        } else {
            CouponStatus::Active
        }
    }
}

/// Coupon codes match case-insensitively; the stored form is upper-case.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
