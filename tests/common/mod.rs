#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use coupon_engine::{
    config::AppConfig,
    db,
    entities::coupon::{self, CouponScope, DiscountType, UserEligibility},
    events::{self, EventSender},
    services::{EligibilityService, LineItem, OrderContext, RedemptionService, UsageLedger},
    AppState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Helper harness for spinning up the engine against a throwaway SQLite
/// database with the embedded migrations applied.
pub struct TestEngine {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub event_sender: EventSender,
    pub eligibility: EligibilityService,
    pub redemptions: RedemptionService,
    pub ledger: UsageLedger,
    _tmp: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestEngine {
    /// Construct a new engine with fresh database state.
    pub async fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir for test database");
        let db_path = tmp.path().join("coupon_engine.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // SQLite allows one writer; a single pooled connection avoids lock
        // errors in the concurrency tests without weakening the conditional
        // updates under test.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        Self {
            eligibility: EligibilityService::new(db_arc.clone()),
            redemptions: RedemptionService::new(
                db_arc.clone(),
                event_sender.clone(),
                cfg.reservation_retry_attempts,
            ),
            ledger: UsageLedger::new(db_arc.clone()),
            db: db_arc,
            config: cfg,
            event_sender,
            _tmp: tmp,
            _event_task: event_task,
        }
    }

    /// App state wired the way the binary wires it, for router-level tests.
    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.db.clone(),
            self.config.clone(),
            self.event_sender.clone(),
        )
    }

    /// Reload a coupon row to observe counter movement.
    pub async fn reload_coupon(&self, id: Uuid) -> coupon::Model {
        use sea_orm::EntityTrait;
        coupon::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("reload coupon")
            .expect("coupon row exists")
    }
}

impl Drop for TestEngine {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Builder for seeding coupon rows the way the management layer writes them.
pub struct CouponBuilder {
    code: String,
    discount_type: DiscountType,
    value: Decimal,
    max_discount_amount: Option<Decimal>,
    scope: CouponScope,
    min_purchase_amount: Decimal,
    min_item_quantity: i32,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    user_eligibility: UserEligibility,
    usage_limit: Option<i32>,
    per_user_limit: i32,
    is_active: bool,
}

impl CouponBuilder {
    pub fn new(code: &str) -> Self {
        let now = Utc::now();
        Self {
            code: code.to_string(),
            discount_type: DiscountType::Percentage,
            value: dec!(10),
            max_discount_amount: None,
            scope: CouponScope::Platform,
            min_purchase_amount: Decimal::ZERO,
            min_item_quantity: 0,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            user_eligibility: UserEligibility::AllUsers,
            usage_limit: None,
            per_user_limit: 1,
            is_active: true,
        }
    }

    pub fn percentage(mut self, value: Decimal) -> Self {
        self.discount_type = DiscountType::Percentage;
        self.value = value;
        self
    }

    pub fn fixed(mut self, value: Decimal) -> Self {
        self.discount_type = DiscountType::Fixed;
        self.value = value;
        self
    }

    pub fn free_shipping(mut self) -> Self {
        self.discount_type = DiscountType::FreeShipping;
        self.value = Decimal::ZERO;
        self
    }

    pub fn max_discount(mut self, cap: Decimal) -> Self {
        self.max_discount_amount = Some(cap);
        self
    }

    pub fn scope(mut self, scope: CouponScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn min_purchase(mut self, amount: Decimal) -> Self {
        self.min_purchase_amount = amount;
        self
    }

    pub fn min_quantity(mut self, quantity: i32) -> Self {
        self.min_item_quantity = quantity;
        self
    }

    pub fn valid_between(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.valid_from = from;
        self.valid_until = until;
        self
    }

    pub fn eligibility(mut self, eligibility: UserEligibility) -> Self {
        self.user_eligibility = eligibility;
        self
    }

    pub fn usage_limit(mut self, limit: i32) -> Self {
        self.usage_limit = Some(limit);
        self
    }

    pub fn per_user_limit(mut self, limit: i32) -> Self {
        self.per_user_limit = limit;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub async fn insert(self, db: &DatabaseConnection) -> coupon::Model {
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(self.code),
            discount_type: Set(self.discount_type),
            value: Set(self.value),
            max_discount_amount: Set(self.max_discount_amount),
            scope: Set(serde_json::to_string(&self.scope).expect("serialize scope")),
            min_purchase_amount: Set(self.min_purchase_amount),
            min_item_quantity: Set(self.min_item_quantity),
            valid_from: Set(self.valid_from),
            valid_until: Set(self.valid_until),
            user_eligibility: Set(
                serde_json::to_string(&self.user_eligibility).expect("serialize eligibility")
            ),
            usage_limit: Set(self.usage_limit),
            per_user_limit: Set(self.per_user_limit),
            usage_count: Set(0),
            is_active: Set(self.is_active),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(db)
        .await
        .expect("seed coupon")
    }
}

pub fn line_item(seller_id: Uuid, category: &str, unit_price: Decimal, quantity: i32) -> LineItem {
    LineItem {
        product_id: Uuid::new_v4(),
        seller_id,
        category: category.to_string(),
        unit_price,
        quantity,
    }
}

pub fn order_for(customer_id: Uuid, items: Vec<LineItem>) -> OrderContext {
    OrderContext {
        items,
        customer_id,
        is_new_customer: false,
    }
}

/// A one-line platform-wide order totalling `amount`.
pub fn platform_order(customer_id: Uuid, amount: Decimal) -> OrderContext {
    order_for(
        customer_id,
        vec![line_item(Uuid::new_v4(), "General", amount, 1)],
    )
}
