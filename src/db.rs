use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Catalog product as stored in the `products` table
///
/// `id` and `name` never change after creation; `category` is the free-text
/// label the reconciler normalizes and may be missing on legacy rows.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Product {
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub brand: Option<String>,

    #[serde(default)]
    pub image_url: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
    /// New product with a fresh UUID and no optional fields
    pub fn new(name: &str, category: Option<&str>) -> Self {
        Product {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            category: category.map(str::to_string),
            description: None,
            brand: None,
            image_url: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Category label, with an absent category read as ""
    pub fn category_label(&self) -> &str {
        self.category.as_deref().unwrap_or("")
    }

    /// Fill identity and timestamps for rows that arrive without them
    pub fn init_identity(&mut self) {
        let now = Utc::now();

        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
        if self.updated_at.is_none() {
            self.updated_at = Some(now);
        }
    }
}

/// Number of products carrying a given category label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    // WAL keeps readers (the admin API) unblocked during batch writes
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            category TEXT,
            description TEXT,
            brand TEXT,
            image_url TEXT,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_products_category ON products(category)",
        [],
    )?;

    Ok(())
}

/// Read seed products from a CSV file (`id,name,category,description,brand,image_url`)
pub fn load_csv(csv_path: &Path) -> Result<Vec<Product>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file: {:?}", csv_path))?;

    let mut products = Vec::new();

    for (line, result) in rdr.deserialize().enumerate() {
        let mut product: Product =
            result.with_context(|| format!("Failed to deserialize product on row {}", line + 1))?;
        product.init_identity();
        products.push(product);
    }

    Ok(products)
}

/// Insert products, skipping ids that already exist. Returns the number inserted.
pub fn insert_products(conn: &Connection, products: &[Product]) -> StoreResult<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for product in products {
        let mut product = product.clone();
        product.init_identity();

        let result = conn.execute(
            "INSERT INTO products (
                id, name, category, description, brand, image_url, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                product.id,
                product.name,
                product.category,
                product.description,
                product.brand,
                product.image_url,
                product.created_at.map(|dt| dt.to_rfc3339()),
                product.updated_at.map(|dt| dt.to_rfc3339()),
            ],
        );

        match result {
            Ok(_) => inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                debug!(id = %product.id, "skipping duplicate product");
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(inserted, duplicates, "products inserted");

    Ok(inserted)
}

const PRODUCT_COLUMNS: &str =
    "id, name, category, description, brand, image_url, created_at, updated_at";

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        description: row.get(3)?,
        brand: row.get(4)?,
        image_url: row.get(5)?,
        created_at: parse_timestamp(row.get(6)?),
        updated_at: parse_timestamp(row.get(7)?),
    })
}

/// All products in insertion order
pub fn get_all_products(conn: &Connection) -> StoreResult<Vec<Product>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM products ORDER BY rowid",
        PRODUCT_COLUMNS
    ))?;

    let products = stmt
        .query_map([], product_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(products)
}

pub fn get_product(conn: &Connection, id: &str) -> StoreResult<Option<Product>> {
    let product = conn
        .query_row(
            &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS),
            [id],
            product_from_row,
        )
        .optional()?;

    Ok(product)
}

/// Products whose category equals `category`; "" also matches NULL
pub fn get_products_by_category(conn: &Connection, category: &str) -> StoreResult<Vec<Product>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM products WHERE COALESCE(category, '') = ?1 ORDER BY rowid",
        PRODUCT_COLUMNS
    ))?;

    let products = stmt
        .query_map([category], product_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(products)
}

/// Set only the category (and `updated_at`) of one product
pub fn update_product_category(conn: &Connection, id: &str, category: &str) -> StoreResult<()> {
    let changed = conn.execute(
        "UPDATE products SET category = ?1, updated_at = ?2 WHERE id = ?3",
        params![category, Utc::now().to_rfc3339(), id],
    )?;

    if changed == 0 {
        return Err(StoreError::NotFound(id.to_string()));
    }

    Ok(())
}

pub fn delete_product(conn: &Connection, id: &str) -> StoreResult<()> {
    let changed = conn.execute("DELETE FROM products WHERE id = ?1", [id])?;

    if changed == 0 {
        return Err(StoreError::NotFound(id.to_string()));
    }

    Ok(())
}

pub fn verify_count(conn: &Connection) -> StoreResult<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;

    Ok(count)
}

/// Product count per category label, largest first
pub fn category_distribution(conn: &Connection) -> StoreResult<Vec<CategoryCount>> {
    let mut stmt = conn.prepare(
        "SELECT COALESCE(category, '') AS label, COUNT(*) AS count
         FROM products
         GROUP BY label
         ORDER BY count DESC, label",
    )?;

    let counts = stmt
        .query_map([], |row| {
            Ok(CategoryCount {
                category: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(counts)
}
