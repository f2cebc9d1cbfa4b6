//! # Demo Data Seeder
//!
//! Populates a database with a small shop: catalog, a supplier delivery, and
//! a day of counter activity (sales, a debt, an exchange, a return).
//!
//! ## Usage
//! ```bash
//! # Seed ./shopkeep_dev.db with 40 products per category
//! cargo run -p shopkeep-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p shopkeep-db --bin seed -- --count 10 --db ./data/shop.db
//! ```
//!
//! Each product has:
//! - SKU: `{CATEGORY}-{NAME}-{INDEX}`
//! - Barcode: `590` + zero-padded index
//! - Sale price 1.99 - 9.99 plus a size addon, cost 60-80% of it
//! - Stock 0 - 60, minimum level 5 - 14

use std::env;

use shopkeep_core::{
    ExchangeRequest, LineRequest, NewProduct, NewPurchase, NewSaleOrder, PaymentMethod, Product,
    PurchaseLineRequest, ReturnRequest,
};
use shopkeep_core::stats::StatisticsPeriod;
use shopkeep_db::{Database, DbConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Catalog categories and product names.
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "BEV",
        &[
            "Cola", "Lemon Soda", "Mineral Water", "Orange Juice", "Apple Juice", "Iced Tea",
            "Cold Brew", "Energy Drink",
        ],
    ),
    (
        "SNK",
        &[
            "Salted Crisps", "Paprika Crisps", "Pretzels", "Peanuts", "Chocolate Bar",
            "Gummy Bears", "Oat Cookies",
        ],
    ),
    (
        "DRY",
        &[
            "Whole Milk", "Oat Milk", "Cheddar", "Butter", "Greek Yogurt", "Eggs Dozen",
        ],
    ),
    (
        "GRO",
        &[
            "White Bread", "Spaghetti", "Basmati Rice", "Canned Beans", "Olive Oil",
            "Ground Coffee",
        ],
    ),
];

/// Size variants and their price addon in cents.
const SIZES: &[(&str, i64)] = &[("Small", 0), ("Medium", 100), ("Large", 200), ("6-Pack", 450)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,shopkeep_db=info,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 40;
    let mut db_path = String::from("./shopkeep_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(40);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Shopkeep demo data seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Products per category (default: 40)");
                println!("  -d, --db <PATH>    Database file path (default: ./shopkeep_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, count, "Seeding database");
    let db = Database::new(DbConfig::new(&db_path)).await?;

    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let mut products: Vec<Product> = Vec::new();

    for (category_idx, (category, names)) in CATEGORIES.iter().enumerate() {
        let mut generated = 0;
        'names: for (name_idx, name) in names.iter().enumerate() {
            for (size_idx, (size, addon)) in SIZES.iter().enumerate() {
                if generated >= count {
                    break 'names;
                }
                let seed = category_idx * 1000 + name_idx * 20 + size_idx;
                match db.products().create(demo_product(category, name, size, *addon, seed)).await {
                    Ok(product) => products.push(product),
                    Err(e) => warn!(error = %e, "Failed to create product"),
                }
                generated += 1;
            }
        }
    }

    info!(products = products.len(), elapsed = ?start.elapsed(), "Catalog created");

    if products.len() < 3 {
        return Ok(());
    }

    // A delivery for the first few products.
    db.purchases()
        .create(NewPurchase {
            items: products
                .iter()
                .take(5)
                .map(|p| PurchaseLineRequest {
                    product_id: p.id.clone(),
                    quantity: 24,
                    purchase_price_cents: p.purchase_price_cents,
                })
                .collect(),
            supplier: Some("Wholesale Depot".into()),
            created_by: "seed".into(),
            ..Default::default()
        })
        .await?;

    let (a, b, c) = (&products[0], &products[1], &products[2]);

    let sale = db
        .orders()
        .create_sale(NewSaleOrder {
            items: vec![LineRequest::new(a.id.clone(), 3), LineRequest::new(b.id.clone(), 2)],
            payment_method: Some(PaymentMethod::Cash),
            created_by: "seed".into(),
            ..Default::default()
        })
        .await?;

    db.orders()
        .create_sale(NewSaleOrder {
            items: vec![LineRequest::new(c.id.clone(), 1)],
            customer_name: Some("Regular customer".into()),
            is_debt: true,
            created_by: "seed".into(),
            ..Default::default()
        })
        .await?;

    db.orders()
        .create_exchange(ExchangeRequest {
            original_order_code: sale.order_number.clone(),
            return_items: vec![LineRequest::new(b.id.clone(), 1)],
            exchange_items: vec![LineRequest::new(c.id.clone(), 1)],
            created_by: "seed".into(),
            ..Default::default()
        })
        .await?;

    db.orders()
        .create_return(ReturnRequest {
            original_order_code: sale.order_number.clone(),
            return_items: vec![LineRequest::new(a.id.clone(), 1)],
            created_by: "seed".into(),
            ..Default::default()
        })
        .await?;

    let search = db.products().search("cola", 10).await?;
    info!(results = search.len(), "Search 'cola'");

    let stats = db
        .reports()
        .statistics_for(StatisticsPeriod::Today, chrono::Utc::now())
        .await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    db.close().await;
    info!("Seed complete");
    Ok(())
}

/// One catalog entry with deterministic data.
fn demo_product(category: &str, name: &str, size: &str, addon: i64, seed: usize) -> NewProduct {
    let compact: String = name.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let short = compact.get(..3).unwrap_or(&compact).to_uppercase();

    let sale_price = 199 + ((seed * 17) % 800) as i64 + addon;
    let cost_pct = 60 + (seed % 20) as i64;

    NewProduct {
        sku: format!("{category}-{short}-{seed:04}"),
        barcode: Some(format!("590{seed:010}")),
        name: format!("{name} {size}"),
        category: Some(category.to_string()),
        purchase_price_cents: Some(sale_price * cost_pct / 100),
        sale_price_cents: Some(sale_price),
        stock: Some((seed % 61) as i64),
        min_stock_level: Some(5 + (seed % 10) as i64),
        unit: Some("pcs".into()),
        is_active: Some(true),
    }
}
