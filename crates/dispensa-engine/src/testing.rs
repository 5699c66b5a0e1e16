//! Fixtures shared by the engine's unit tests. Each test gets a fresh
//! in-memory database with migrations applied; concurrency tests use a
//! temporary WAL file instead.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use dispensa_core::{
    Customer, DiscountType, InventoryBatch, PointsTransaction, PointsTransactionKind, Product,
    PromoCode, ReferralPointsConfig, StaffPointsConfig,
};
use dispensa_db::{Database, DbConfig};

use crate::config::EngineConfig;
use crate::inventory::NewBatch;
use crate::loyalty::{ReferralRates, StaffRates};
use crate::orders::{CreateOrderRequest, CustomerInfo, OrderLine};
use crate::promo::NewPromoCode;
use crate::Engine;

pub const PHARMACY: &str = "00000000-0000-0000-0000-0000000000a1";
pub const OTHER_PHARMACY: &str = "00000000-0000-0000-0000-0000000000b2";

/// 1 point per 100.00, 50 per referral, 100 points buy 10.00, uncapped.
pub const REFERRAL_RATES: ReferralRates = ReferralRates {
    points_per_currency_unit: 1,
    currency_unit_for_points_cents: 10_000,
    referral_reward_points: 50,
    redemption_rate_points: 100,
    redemption_rate_currency_cents: 1_000,
    max_redeem_per_order: 0,
};

pub async fn engine() -> Engine {
    engine_with(EngineConfig::default()).await
}

pub async fn engine_with(config: EngineConfig) -> Engine {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    Engine::new(db, config)
}

/// An engine on a WAL database file shared by `connections` pooled
/// connections. The directory is removed when the guard drops.
pub async fn file_engine(connections: u32) -> (Engine, TempStore) {
    let dir = std::env::temp_dir().join(format!("dispensa-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();

    let config = DbConfig::new(dir.join("orders.db"))
        .max_connections(connections)
        .busy_timeout(Duration::from_secs(30));
    let db = Database::new(config).await.unwrap();
    (Engine::new(db, EngineConfig::default()), TempStore(dir))
}

pub struct TempStore(PathBuf);

impl Drop for TempStore {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

pub fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// A catalog entry with counter-only stock.
pub async fn product(engine: &Engine, pharmacy_id: &str, name: &str, price_cents: i64, stock: i64) -> Product {
    let now = Utc::now();
    let product = Product {
        id: Uuid::new_v4().to_string(),
        pharmacy_id: pharmacy_id.to_string(),
        sku: format!("SKU-{}", &Uuid::new_v4().simple().to_string()[..8]),
        name: name.to_string(),
        price_cents,
        stock_quantity: stock,
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    let mut uow = engine.database().begin().await.unwrap();
    uow.products().insert(&product).await.unwrap();
    uow.commit().await.unwrap();
    product
}

/// Receives a batch through the allocator, raising the product counter.
pub async fn receive(
    engine: &Engine,
    product: &Product,
    quantity: i64,
    expiry_date: Option<DateTime<Utc>>,
) -> InventoryBatch {
    engine
        .inventory()
        .add_batch(
            &product.pharmacy_id,
            NewBatch {
                product_id: product.id.clone(),
                batch_number: format!("LOT-{}", &Uuid::new_v4().simple().to_string()[..6]),
                quantity,
                expiry_date,
            },
        )
        .await
        .unwrap()
}

pub async fn stock(engine: &Engine, product_id: &str) -> i64 {
    let mut uow = engine.database().begin().await.unwrap();
    uow.products().stock_of(product_id).await.unwrap().unwrap()
}

/// A customer holding `points`, with a matching opening ledger row.
pub async fn customer(engine: &Engine, pharmacy_id: &str, name: &str, phone: &str, points: i64) -> Customer {
    let customer = engine
        .loyalty()
        .get_or_create_customer(pharmacy_id, name, phone, None)
        .await
        .unwrap();
    if points == 0 {
        return customer;
    }

    let mut uow = engine.database().begin().await.unwrap();
    uow.customers().credit_points(&customer.id, points).await.unwrap();
    uow.loyalty()
        .insert_transaction(&PointsTransaction {
            id: Uuid::new_v4().to_string(),
            pharmacy_id: pharmacy_id.to_string(),
            customer_id: customer.id.clone(),
            amount: points,
            kind: PointsTransactionKind::EarnPurchase,
            order_id: None,
            referred_customer_id: None,
            description: "Opening balance".to_string(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    let customer = uow.customers().get_by_id(&customer.id).await.unwrap().unwrap();
    uow.commit().await.unwrap();
    customer
}

pub async fn referral_config(engine: &Engine, pharmacy_id: &str) -> ReferralPointsConfig {
    engine
        .loyalty()
        .set_referral_config(pharmacy_id, REFERRAL_RATES)
        .await
        .unwrap()
}

/// 1 staff point per 500.00.
pub async fn staff_config(engine: &Engine, pharmacy_id: &str) -> StaffPointsConfig {
    engine
        .loyalty()
        .set_staff_config(
            pharmacy_id,
            StaffRates {
                points_per_currency_unit: 1,
                currency_unit_for_points_cents: 50_000,
            },
        )
        .await
        .unwrap()
}

/// An active code valid from yesterday for thirty days.
pub async fn promo(
    engine: &Engine,
    pharmacy_id: &str,
    code: &str,
    discount_type: DiscountType,
    discount_value: i64,
    max_uses: i64,
) -> PromoCode {
    let now = Utc::now();
    engine
        .promos()
        .create(
            pharmacy_id,
            NewPromoCode {
                code: code.to_string(),
                description: None,
                discount_type,
                discount_value,
                valid_from: now - chrono::Duration::days(1),
                valid_until: now + chrono::Duration::days(30),
                max_uses,
                min_order_amount_cents: 0,
                first_order_only: false,
                is_active: true,
            },
        )
        .await
        .unwrap()
}

/// A walk-in order for `(product_id, quantity)` lines.
pub fn order_request<S: AsRef<str>>(lines: &[(S, i64)]) -> CreateOrderRequest {
    CreateOrderRequest {
        customer: CustomerInfo {
            name: "Walk-in Customer".to_string(),
            phone: None,
            email: None,
        },
        items: lines
            .iter()
            .map(|(product_id, quantity)| OrderLine {
                product_id: product_id.as_ref().to_string(),
                quantity: *quantity,
            })
            .collect(),
        ..Default::default()
    }
}
