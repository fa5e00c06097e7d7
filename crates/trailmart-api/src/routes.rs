//! HTTP routes.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::info;

use trailmart_core::defaults::WEBHOOK_MAX_BODY_BYTES;
use trailmart_core::{ProductSnapshot, ProductUpsertRequest, ShoppingCart};

use crate::error::ApiError;
use crate::services::ProductResponse;
use crate::state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/products", get(list_products).post(create_product))
        .route("/products/search", get(search_products))
        .route("/products/semantic-search", get(semantic_search))
        .route("/products/support", post(support_chat))
        .route(
            "/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/products/:id/lookup", get(lookup_product))
        .route("/basket", post(update_basket))
        .route("/basket/:user_id", get(get_basket).delete(delete_basket))
        .route("/webhook/keycloak", post(keycloak_webhook))
        .layer(RequestBodyLimitLayer::new(WEBHOOK_MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// CATALOG
// =============================================================================

async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.catalog.list().await?;
    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .catalog
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {} not found", id)))?;
    Ok(Json(ProductResponse::from(product)))
}

async fn create_product(
    State(state): State<AppState>,
    Json(body): Json<ProductUpsertRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state.catalog.create(body).await?;
    Ok((StatusCode::CREATED, Json(ProductResponse::from(product))))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ProductUpsertRequest>,
) -> Result<StatusCode, ApiError> {
    match state.catalog.update(id, body).await? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError::NotFound(format!("Product {} not found", id))),
    }
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.catalog.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Product {} not found", id)))
    }
}

async fn lookup_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ProductSnapshot>, ApiError> {
    let snapshot = state
        .catalog
        .lookup(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {} not found", id)))?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

async fn search_products(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.catalog.search(&query.q).await?;
    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
struct SemanticSearchQuery {
    #[serde(default)]
    q: String,
    top_n: Option<usize>,
    threshold: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ScoredProductResponse {
    #[serde(flatten)]
    product: ProductResponse,
    score: f32,
}

async fn semantic_search(
    State(state): State<AppState>,
    Query(query): Query<SemanticSearchQuery>,
) -> Result<Json<Vec<ScoredProductResponse>>, ApiError> {
    let defaults = state.search.config();
    let results = state
        .search
        .search_with(
            &query.q,
            query.top_n.unwrap_or(defaults.top_n),
            query.threshold.unwrap_or(defaults.threshold),
        )
        .await?;

    Ok(Json(
        results
            .into_iter()
            .map(|r| ScoredProductResponse {
                product: ProductResponse::from(r.product),
                score: r.score,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
struct SupportRequest {
    question: String,
}

async fn support_chat(
    State(state): State<AppState>,
    Json(body): Json<SupportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let answer = state.enricher.support(&body.question).await?;
    Ok(Json(json!({ "answer": answer })))
}

// =============================================================================
// BASKET
// =============================================================================

async fn get_basket(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ShoppingCart>, ApiError> {
    let cart = state
        .baskets
        .get(&user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Basket for {} not found", user_id)))?;
    Ok(Json(cart))
}

async fn update_basket(
    State(state): State<AppState>,
    Json(cart): Json<ShoppingCart>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state.baskets.update(cart).await?;
    Ok((StatusCode::CREATED, Json(cart)))
}

async fn delete_basket(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.baskets.delete(&user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// WEBHOOKS
// =============================================================================

async fn keycloak_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let envelope = state.webhooks.handle(&headers, &body).await?;
    info!(
        subsystem = "api",
        event_type = %envelope.event_type,
        "Keycloak webhook accepted"
    );
    Ok(Json(json!({ "status": "accepted" })))
}
