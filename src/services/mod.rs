//! Service layer of the coupon engine.
//!
//! `eligibility` and `discount` are pure rule evaluation; `usage_ledger`
//! owns the concurrency-sensitive counters; `redemption` orchestrates the
//! transactional entry points consumed at checkout.

pub mod discount;
pub mod eligibility;
pub mod redemption;
pub mod usage_ledger;

pub use discount::DiscountResult;
pub use eligibility::{Eligibility, EligibilityService, LineItem, OrderContext, ScopeMatch};
pub use redemption::{Redemption, RedemptionService};
pub use usage_ledger::UsageLedger;
