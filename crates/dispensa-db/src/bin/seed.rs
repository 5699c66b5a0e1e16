//! # Seed Data Generator
//!
//! Populates the database with a demo pharmacy for development.
//!
//! ## Usage
//! ```bash
//! cargo run -p dispensa-db --bin seed
//!
//! # Specify database path and pharmacy id
//! cargo run -p dispensa-db --bin seed -- --db ./data/dispensa.db --pharmacy <uuid>
//! ```
//!
//! ## Generated Data
//! - Medicines, each with two or three FEFO batches (one never-expiring);
//!   product stock equals the batch sum
//! - Promo codes: `WELCOME10` (10%, first order only) and `FLAT50`
//!   (50.00 off orders of 500.00+, 100 uses)
//! - Customer and staff points rates
//! - A "Gold" membership tier and a "Cash on Delivery" gateway

use chrono::{Duration, Utc};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use dispensa_core::{
    DiscountType, InventoryBatch, Membership, PaymentGateway, Product, PromoCode,
    ReferralPointsConfig, StaffPointsConfig,
};
use dispensa_db::{Database, DbConfig, DbResult, UnitOfWork};

const DEFAULT_PHARMACY_ID: &str = "00000000-0000-0000-0000-0000000000a1";

/// (sku, name, price in paisa, batches as (days until expiry, quantity))
const MEDICINES: &[(&str, &str, i64, &[(Option<i64>, i64)])] = &[
    ("PCM-500", "Paracetamol 500mg (10 tabs)", 3_000, &[(Some(45), 40), (Some(300), 80), (None, 20)]),
    ("AMX-500", "Amoxicillin 500mg (10 caps)", 18_000, &[(Some(20), 10), (Some(200), 30)]),
    ("CTZ-010", "Cetirizine 10mg (10 tabs)", 4_500, &[(Some(120), 50), (None, 25)]),
    ("ORS-001", "Oral Rehydration Salts", 1_500, &[(Some(10), 60), (Some(365), 100)]),
    ("IBU-400", "Ibuprofen 400mg (10 tabs)", 6_000, &[(Some(90), 35), (Some(400), 35), (None, 10)]),
    ("VTC-500", "Vitamin C 500mg (30 tabs)", 25_000, &[(None, 15)]),
    ("MTF-500", "Metformin 500mg (30 tabs)", 12_000, &[(Some(60), 25), (Some(240), 25)]),
    ("OMZ-020", "Omeprazole 20mg (14 caps)", 9_500, &[(Some(150), 40)]),
];

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./dispensa_dev.db");
    let mut pharmacy_id = String::from(DEFAULT_PHARMACY_ID);

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--pharmacy" | "-p" => {
                if i + 1 < args.len() {
                    pharmacy_id = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Dispensa Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>          Database file path (default: ./dispensa_dev.db)");
                println!("  -p, --pharmacy <UUID>    Pharmacy id to seed (default: {DEFAULT_PHARMACY_ID})");
                println!("  -h, --help               Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Dispensa Seed Data Generator");
    println!("===============================");
    println!("Database: {}", db_path);
    println!("Pharmacy: {}", pharmacy_id);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database, migrations applied");

    let mut uow = db.begin().await?;

    let existing = uow.products().list_by_pharmacy(&pharmacy_id).await?;
    if !existing.is_empty() {
        warn!(products = existing.len(), "Pharmacy already seeded");
        println!("⚠ Pharmacy already has {} products", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let start = std::time::Instant::now();

    let (products, batches) = seed_catalog(&mut uow, &pharmacy_id).await?;
    println!("✓ {} products, {} batches", products, batches);

    seed_promotions(&mut uow, &pharmacy_id).await?;
    println!("✓ Promo codes WELCOME10, FLAT50");

    seed_loyalty(&mut uow, &pharmacy_id).await?;
    println!("✓ Loyalty rates, Gold membership, Cash on Delivery gateway");

    uow.commit().await?;

    info!(elapsed = ?start.elapsed(), "Seed complete");
    println!();
    println!("✓ Seed complete in {:?}", start.elapsed());

    Ok(())
}

/// Inserts every medicine with its batches; stock mirrors the batch sum.
async fn seed_catalog(uow: &mut UnitOfWork, pharmacy_id: &str) -> DbResult<(usize, usize)> {
    let now = Utc::now();
    let mut batch_count = 0;

    for (sku, name, price_cents, lots) in MEDICINES {
        let product = Product {
            id: Uuid::new_v4().to_string(),
            pharmacy_id: pharmacy_id.to_string(),
            sku: sku.to_string(),
            name: name.to_string(),
            price_cents: *price_cents,
            stock_quantity: lots.iter().map(|(_, qty)| qty).sum(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        uow.products().insert(&product).await?;

        for (n, (expires_in_days, quantity)) in lots.iter().enumerate() {
            let batch = InventoryBatch {
                id: Uuid::new_v4().to_string(),
                product_id: product.id.clone(),
                pharmacy_id: pharmacy_id.to_string(),
                batch_number: format!("{}-L{:02}", sku, n + 1),
                quantity: *quantity,
                expiry_date: expires_in_days.map(|days| now + Duration::days(days)),
                created_at: now,
                updated_at: now,
            };
            uow.batches().insert(&batch).await?;
            batch_count += 1;
        }
    }

    Ok((MEDICINES.len(), batch_count))
}

async fn seed_promotions(uow: &mut UnitOfWork, pharmacy_id: &str) -> DbResult<()> {
    let now = Utc::now();

    let welcome = PromoCode {
        id: Uuid::new_v4().to_string(),
        pharmacy_id: pharmacy_id.to_string(),
        code: "WELCOME10".to_string(),
        description: Some("10% off your first order".to_string()),
        discount_type: DiscountType::Percent,
        discount_value: 1_000,
        valid_from: now,
        valid_until: now + Duration::days(90),
        max_uses: 0,
        used_count: 0,
        min_order_amount_cents: 0,
        first_order_only: true,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    uow.promo_codes().insert(&welcome).await?;

    let flat = PromoCode {
        id: Uuid::new_v4().to_string(),
        code: "FLAT50".to_string(),
        description: Some("50.00 off orders of 500.00 or more".to_string()),
        discount_type: DiscountType::Fixed,
        discount_value: 5_000,
        max_uses: 100,
        min_order_amount_cents: 50_000,
        first_order_only: false,
        ..welcome
    };
    uow.promo_codes().insert(&flat).await?;

    Ok(())
}

async fn seed_loyalty(uow: &mut UnitOfWork, pharmacy_id: &str) -> DbResult<()> {
    let now = Utc::now();

    // 1 point per 100.00 spent; 100 points buy 10.00; referrer earns 50
    uow.loyalty()
        .upsert_referral_config(&ReferralPointsConfig {
            pharmacy_id: pharmacy_id.to_string(),
            points_per_currency_unit: 1,
            currency_unit_for_points_cents: 10_000,
            referral_reward_points: 50,
            redemption_rate_points: 100,
            redemption_rate_currency_cents: 1_000,
            max_redeem_per_order: 500,
            updated_at: now,
        })
        .await?;

    uow.loyalty()
        .upsert_staff_config(&StaffPointsConfig {
            pharmacy_id: pharmacy_id.to_string(),
            points_per_currency_unit: 1,
            currency_unit_for_points_cents: 50_000,
            updated_at: now,
        })
        .await?;

    uow.memberships()
        .insert(&Membership {
            id: Uuid::new_v4().to_string(),
            pharmacy_id: pharmacy_id.to_string(),
            name: "Gold".to_string(),
            discount_bps: 500,
            is_active: true,
            created_at: now,
        })
        .await?;

    uow.payments()
        .insert_gateway(&PaymentGateway {
            id: Uuid::new_v4().to_string(),
            pharmacy_id: pharmacy_id.to_string(),
            name: "Cash on Delivery".to_string(),
            is_active: true,
            created_at: now,
        })
        .await?;

    Ok(())
}
