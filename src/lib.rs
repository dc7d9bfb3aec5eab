// Merch Storefront - Core Library
// Catalog store and category reconciliation, shared by the CLI, the admin
// API server, and tests

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod reconciler;
pub mod repository;
pub mod taxonomy;

// Re-export commonly used types
pub use config::Settings;
pub use db::{
    Product, CategoryCount,
    setup_database, load_csv, insert_products,
    get_all_products, get_product, get_products_by_category,
    update_product_category, delete_product, verify_count, category_distribution,
};
pub use error::{MappingError, ReconcileError, StoreError, StoreResult};
pub use reconciler::{
    CategoryReconciler, CategoryOutcome, ProductOutcome, PlannedChange,
    ReconciliationReport, plan,
};
pub use repository::{InMemoryProductRepository, ProductRepository, SqliteProductRepository};
pub use taxonomy::{CategoryMapping, CANONICAL_CATEGORIES, DEFAULT_CATEGORY, GENERAL_KEY};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
