// Merch Storefront - Admin API Server
// REST API over the product catalog plus the category reconciliation job

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use clap::Parser;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use merch_storefront::{
    category_distribution, delete_product, get_all_products, get_product,
    get_products_by_category, insert_products, logging, setup_database, update_product_category,
    CategoryMapping, CategoryReconciler, Product, Settings, SqliteProductRepository, StoreError,
};

#[derive(Parser)]
#[command(name = "storefront-server")]
#[command(about = "Admin API for the merch storefront catalog")]
struct ServerCli {
    #[command(flatten)]
    settings: Settings,

    /// Address to listen on
    #[arg(long, env = "STOREFRONT_ADDR", default_value = "0.0.0.0:3000")]
    addr: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    mapping: Arc<CategoryMapping>,
}

impl AppState {
    fn db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        }),
    )
        .into_response()
}

fn store_error(context: &str, e: StoreError) -> Response {
    match e {
        StoreError::NotFound(id) => {
            error_response(StatusCode::NOT_FOUND, format!("Product not found: {}", id))
        }
        other => {
            error!(error = %other, "{}", context);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

#[derive(Deserialize)]
struct NewProduct {
    name: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

#[derive(Deserialize)]
struct CategoryUpdate {
    category: String,
}

#[derive(Deserialize)]
struct ProductFilter {
    /// Exact category label; empty selects uncategorized products
    #[serde(default)]
    category: Option<String>,
}

#[derive(Deserialize)]
struct ReconcileParams {
    #[serde(default)]
    dry_run: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// GET /api/products[?category=label] - All products, or one category
async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> Response {
    let result = match filter.category.as_deref() {
        Some(label) => get_products_by_category(&state.db(), label),
        None => get_all_products(&state.db()),
    };

    match result {
        Ok(products) => ApiResponse::ok(products).into_response(),
        Err(e) => store_error("Error listing products", e),
    }
}

/// GET /api/products/:id - One product
async fn show_product(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match get_product(&state.db(), &id) {
        Ok(Some(product)) => ApiResponse::ok(product).into_response(),
        Ok(None) => store_error("Error loading product", StoreError::NotFound(id)),
        Err(e) => store_error("Error loading product", e),
    }
}

/// POST /api/products - Create a product
async fn create_product(State(state): State<AppState>, Json(body): Json<NewProduct>) -> Response {
    if body.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Product name is required".to_string());
    }

    let mut product = Product::new(&body.name, body.category.as_deref());
    product.description = body.description;
    product.brand = body.brand;
    product.image_url = body.image_url;
    product.init_identity();

    match insert_products(&state.db(), std::slice::from_ref(&product)) {
        Ok(_) => (StatusCode::CREATED, ApiResponse::ok(product)).into_response(),
        Err(e) => store_error("Error creating product", e),
    }
}

/// PUT /api/products/:id/category - Set a product's category
async fn set_product_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CategoryUpdate>,
) -> Response {
    let conn = state.db();

    if let Err(e) = update_product_category(&conn, &id, &body.category) {
        return store_error("Error updating category", e);
    }

    match get_product(&conn, &id) {
        Ok(Some(product)) => ApiResponse::ok(product).into_response(),
        Ok(None) => store_error("Error updating category", StoreError::NotFound(id)),
        Err(e) => store_error("Error updating category", e),
    }
}

/// DELETE /api/products/:id - Remove a product
async fn remove_product(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match delete_product(&state.db(), &id) {
        Ok(()) => ApiResponse::ok(id).into_response(),
        Err(e) => store_error("Error deleting product", e),
    }
}

/// GET /api/categories - Product count per category
async fn list_categories(State(state): State<AppState>) -> Response {
    match category_distribution(&state.db()) {
        Ok(counts) => ApiResponse::ok(counts).into_response(),
        Err(e) => store_error("Error computing category distribution", e),
    }
}

/// GET /api/categories/:label/products - Products in one category
async fn category_products(State(state): State<AppState>, Path(label): Path<String>) -> Response {
    match get_products_by_category(&state.db(), &label) {
        Ok(products) => ApiResponse::ok(products).into_response(),
        Err(e) => store_error("Error listing category products", e),
    }
}

/// GET /api/taxonomy - Category mapping in use
async fn show_taxonomy(State(state): State<AppState>) -> Response {
    ApiResponse::ok(state.mapping.as_ref().clone()).into_response()
}

/// POST /api/admin/reconcile-categories - Run (or preview) the reconciliation
async fn reconcile_categories(
    State(state): State<AppState>,
    Query(params): Query<ReconcileParams>,
) -> Response {
    let conn = state.db();
    let repo = SqliteProductRepository::new(&conn);
    let reconciler = CategoryReconciler::new(state.mapping.as_ref().clone());

    let result = if params.dry_run {
        reconciler.dry_run(&repo)
    } else {
        reconciler.reconcile(&repo)
    };

    match result {
        Ok(report) => {
            info!(summary = %report.summary(), "reconciliation requested via API");
            ApiResponse::ok(report).into_response()
        }
        Err(e) => {
            error!(error = %e, "reconciliation aborted");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", get(show_product).delete(remove_product))
        .route("/products/:id/category", put(set_product_category))
        .route("/categories", get(list_categories))
        .route("/categories/:label/products", get(category_products))
        .route("/taxonomy", get(show_taxonomy))
        .route("/admin/reconcile-categories", post(reconcile_categories))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = ServerCli::parse();
    logging::init(cli.settings.log_json);

    let mapping = cli.settings.category_mapping()?;

    let conn = Connection::open(&cli.settings.db)
        .with_context(|| format!("Failed to open database {:?}", cli.settings.db))?;
    setup_database(&conn)?;
    info!(db = ?cli.settings.db, "database opened");

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        mapping: Arc::new(mapping),
    };

    let listener = tokio::net::TcpListener::bind(&cli.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", cli.addr))?;

    println!("🚀 Storefront admin API running on http://{}", cli.addr);
    println!("   API: http://{}/api/products", cli.addr);

    axum::serve(listener, app(state))
        .await
        .context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state(products: &[Product]) -> AppState {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        insert_products(&conn, products).unwrap();
        AppState {
            db: Arc::new(Mutex::new(conn)),
            mapping: Arc::new(CategoryMapping::builtin()),
        }
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let state = test_state(&[]);
        let (status, body) = send(&state, get_request("/api/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_create_and_fetch_product() {
        let state = test_state(&[]);

        let (status, body) = send(
            &state,
            json_request("POST", "/api/products", serde_json::json!({"name": "Taza", "category": "Tazas"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(&state, get_request(&format!("/api/products/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["category"], "Tazas");

        let (status, _) = send(
            &state,
            json_request("POST", "/api/products", serde_json::json!({"name": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_product_is_404() {
        let state = test_state(&[]);

        let (status, body) = send(&state, get_request("/api/products/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = send(
            &state,
            json_request("PUT", "/api/products/nope/category", serde_json::json!({"category": "Moda"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reconcile_endpoint() {
        let products = vec![
            Product::new("Playera", Some("Ropa")),
            Product::new("Pluma", None),
            Product::new("Especial", Some("CustomLabel")),
        ];
        let state = test_state(&products);

        let (status, body) = send(
            &state,
            json_request("POST", "/api/admin/reconcile-categories?dry_run=true", serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["updated_count"], 2);
        assert_eq!(body["data"]["dry_run"], true);

        let (_, body) = send(
            &state,
            json_request("POST", "/api/admin/reconcile-categories", serde_json::json!({})),
        )
        .await;
        assert_eq!(body["data"]["updated_count"], 2);
        assert_eq!(body["data"]["unchanged_count"], 1);

        let (_, body) = send(&state, get_request("/api/categories/Moda/products")).await;
        assert_eq!(body["data"][0]["name"], "Playera");

        let (_, body) = send(
            &state,
            json_request("POST", "/api/admin/reconcile-categories", serde_json::json!({})),
        )
        .await;
        assert_eq!(body["data"]["updated_count"], 0);
    }

    #[tokio::test]
    async fn test_list_products_by_category_query() {
        let products = vec![
            Product::new("Playera", Some("Ropa")),
            Product::new("Pluma", None),
            Product::new("Lápiz", Some("")),
        ];
        let state = test_state(&products);

        let (status, body) = send(&state, get_request("/api/products?category=")).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Pluma", "Lápiz"], "empty label selects uncategorized products");

        let (_, body) = send(&state, get_request("/api/products?category=Ropa")).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (_, body) = send(&state, get_request("/api/products")).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_product() {
        let product = Product::new("Termo", Some("Termos"));
        let state = test_state(std::slice::from_ref(&product));

        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/api/products/{}", product.id))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&state, get_request("/api/categories")).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 0);
    }
}
