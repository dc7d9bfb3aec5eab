// ⚠️ Error types for the product store, the taxonomy and the reconciler
//
// Loaders and binaries use anyhow; these are the typed failures callers
// need to match on.

use thiserror::Error;

/// Failure talking to the product datastore
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Product not found: {0}")]
    NotFound(String),

    #[error("Datastore unavailable: {0}")]
    Unavailable(String),
}

/// Invalid category mapping configuration
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Mapping for '{0}' has an empty target")]
    EmptyTarget(String),

    #[error("Mapping chain: '{from}' -> '{via}' -> '{to}' (targets must map to themselves)")]
    Chain { from: String, via: String, to: String },

    #[error("Default category must not be empty")]
    EmptyDefault,

    #[error("Default category '{default}' is remapped to '{to}'")]
    DefaultRemapped { default: String, to: String },

    #[error("Failed to read mapping file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse mapping JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure that aborts a reconciliation run before any write happens
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Failed to list products: {0}")]
    FatalRead(#[source] StoreError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
