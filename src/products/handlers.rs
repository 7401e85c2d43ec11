use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Redirect,
    routing::{get, put},
    Json, Router,
};
use bytes::Bytes;
use tracing::instrument;

use super::{
    dto::{NewProduct, Page, ProductListParams, ProductPatch, StatusRequest},
    repo::ProductFilter,
    repo_types::Product,
    services,
};
use crate::{
    auth::AuthUser,
    causes::handlers::content_type,
    error::AppResult,
    media::services::MAX_IMAGE_BYTES,
    state::AppState,
    store::Stored,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/products/:id/status", put(set_status))
        .route(
            "/products/:id/image",
            put(upload_image)
                .get(image_redirect)
                .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 1024)),
        )
        .route("/users/:id/products", get(list_user_products))
        .route("/causes/:id/products", get(list_cause_products))
}

#[instrument(skip(state, who, body), fields(caller = %who.id))]
pub async fn create_product(
    State(state): State<AppState>,
    AuthUser(who): AuthUser,
    Json(body): Json<NewProduct>,
) -> AppResult<(StatusCode, Json<Stored<Product>>)> {
    let product = services::create_product(&state.db, &who.id, body).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(p): Query<ProductListParams>,
) -> AppResult<Json<Vec<Stored<Product>>>> {
    Ok(Json(services::list_products(&state.db, &p.filter(), p.limit, p.offset).await?))
}

#[instrument(skip(state))]
pub async fn list_user_products(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(p): Query<Page>,
) -> AppResult<Json<Vec<Stored<Product>>>> {
    let filter = ProductFilter {
        creator_id: Some(user_id),
        ..Default::default()
    };
    Ok(Json(services::list_products(&state.db, &filter, p.limit, p.offset).await?))
}

#[instrument(skip(state))]
pub async fn list_cause_products(
    State(state): State<AppState>,
    Path(cause_id): Path<String>,
    Query(p): Query<Page>,
) -> AppResult<Json<Vec<Stored<Product>>>> {
    let filter = ProductFilter {
        cause_id: Some(cause_id),
        ..Default::default()
    };
    Ok(Json(services::list_products(&state.db, &filter, p.limit, p.offset).await?))
}

#[instrument(skip(state))]
pub async fn get_product(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Stored<Product>>> {
    Ok(Json(services::get_product(&state.db, &id).await?))
}

#[instrument(skip(state, who, patch), fields(caller = %who.id))]
pub async fn update_product(
    State(state): State<AppState>,
    AuthUser(who): AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<ProductPatch>,
) -> AppResult<Json<Stored<Product>>> {
    Ok(Json(services::update_product(&state.db, &who.id, &id, patch).await?))
}

#[instrument(skip(state, who, body), fields(caller = %who.id))]
pub async fn set_status(
    State(state): State<AppState>,
    AuthUser(who): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest>,
) -> AppResult<Json<Stored<Product>>> {
    Ok(Json(services::change_status(&state.db, &who.id, &id, body.status).await?))
}

#[instrument(skip(state, who), fields(caller = %who.id))]
pub async fn delete_product(
    State(state): State<AppState>,
    AuthUser(who): AuthUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    services::delete_product(&state.db, state.storage.as_ref(), &who.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, who, headers, body), fields(caller = %who.id, bytes = body.len()))]
pub async fn upload_image(
    State(state): State<AppState>,
    AuthUser(who): AuthUser,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Stored<Product>>> {
    let ct = content_type(&headers)?;
    let product = services::set_image(&state.db, state.storage.as_ref(), &who.id, &id, body, &ct).await?;
    Ok(Json(product))
}

#[instrument(skip(state))]
pub async fn image_redirect(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Redirect> {
    let ttl = Duration::from_secs(state.config.media.presign_ttl_secs);
    let url = services::image_url(&state.db, state.storage.as_ref(), &id, ttl).await?;
    Ok(Redirect::temporary(&url))
}
