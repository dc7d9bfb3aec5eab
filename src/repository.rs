// 🗄️ Product repository - the datastore seam used by the reconciler
//
// The reconciler only needs two operations: list every product, and set one
// product's category. SQLite backs production; the in-memory store backs
// tests and dry experiments.

use rusqlite::Connection;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::db::{self, Product};
use crate::error::{StoreError, StoreResult};

pub trait ProductRepository {
    /// Every product, in datastore order
    fn list_products(&self) -> StoreResult<Vec<Product>>;

    /// Persist a new category for one product, touching nothing else
    fn update_category(&self, id: &str, category: &str) -> StoreResult<()>;
}

// ============================================================================
// SQLITE
// ============================================================================

pub struct SqliteProductRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteProductRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SqliteProductRepository { conn }
    }
}

impl ProductRepository for SqliteProductRepository<'_> {
    fn list_products(&self) -> StoreResult<Vec<Product>> {
        db::get_all_products(self.conn)
    }

    fn update_category(&self, id: &str, category: &str) -> StoreResult<()> {
        db::update_product_category(self.conn, id, category)
    }
}

// ============================================================================
// IN-MEMORY
// ============================================================================

/// Vec-backed repository with switchable failures
#[derive(Clone, Default)]
pub struct InMemoryProductRepository {
    products: Arc<RwLock<Vec<Product>>>,
    failing_writes: Arc<RwLock<HashSet<String>>>,
    fail_listing: Arc<RwLock<bool>>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: Vec<Product>) -> Self {
        let repo = Self::new();
        *repo.products.write().unwrap_or_else(|e| e.into_inner()) = products;
        repo
    }

    /// Make every `update_category` for `id` fail
    pub fn fail_writes_for(&self, id: &str) {
        self.failing_writes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string());
    }

    /// Make `list_products` fail
    pub fn fail_listing(&self) {
        *self.fail_listing.write().unwrap_or_else(|e| e.into_inner()) = true;
    }

    /// Snapshot of the current contents
    pub fn snapshot(&self) -> Vec<Product> {
        self.products
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Product> {
        self.snapshot().into_iter().find(|p| p.id == id)
    }
}

impl ProductRepository for InMemoryProductRepository {
    fn list_products(&self) -> StoreResult<Vec<Product>> {
        if *self.fail_listing.read().unwrap_or_else(|e| e.into_inner()) {
            return Err(StoreError::Unavailable("listing disabled".to_string()));
        }
        Ok(self.snapshot())
    }

    fn update_category(&self, id: &str, category: &str) -> StoreResult<()> {
        if self
            .failing_writes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
        {
            return Err(StoreError::Unavailable(format!("write to {} rejected", id)));
        }

        let mut products = self.products.write().unwrap_or_else(|e| e.into_inner());
        let product = products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        product.category = Some(category.to_string());
        product.updated_at = Some(chrono::Utc::now());
        Ok(())
    }
}
