//! Database entities owned by the coupon engine.
//!
//! The coupon rows themselves are produced by the admin/seller management
//! layer; the engine only writes the fields it owns (usage counters and
//! `updated_at`). Usage rows and redemption records are written exclusively
//! by the engine.

pub mod coupon;
pub mod coupon_usage;
pub mod redemption;

pub use coupon::Entity as Coupon;
pub use coupon_usage::Entity as CouponUsage;
pub use redemption::Entity as Redemption;
