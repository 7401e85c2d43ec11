use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::Redirect,
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use tracing::instrument;

use super::{
    dto::{CauseListParams, CausePatch, ContributionRequest, ContributionResponse, NewCause, Page, TextRequest},
    ledger,
    repo::CauseFilter,
    repo_types::{Cause, Comment},
    services,
};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    media::services::MAX_IMAGE_BYTES,
    state::AppState,
    store::Stored,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/causes", post(create_cause).get(list_causes))
        .route("/causes/:id", get(get_cause).put(update_cause).delete(delete_cause))
        .route("/causes/:id/contributions", post(contribute))
        .route("/causes/:id/like", post(like))
        .route("/causes/:id/unlike", post(unlike))
        .route("/causes/:id/updates", post(add_update))
        .route("/causes/:id/comments", post(add_comment).get(list_comments))
        .route(
            "/causes/:id/image",
            put(upload_image)
                .get(image_redirect)
                .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 1024)),
        )
        .route("/users/:id/causes", get(list_user_causes))
}

/// Content type of a raw upload, without parameters.
pub(crate) fn content_type(headers: &HeaderMap) -> AppResult<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_lowercase())
        .ok_or_else(|| AppError::validation("Content-Type header is required"))
}

#[instrument(skip(state, who, body), fields(caller = %who.id))]
pub async fn create_cause(
    State(state): State<AppState>,
    AuthUser(who): AuthUser,
    Json(body): Json<NewCause>,
) -> AppResult<(StatusCode, Json<Stored<Cause>>)> {
    let cause = services::create_cause(&state.db, &who.id, body).await?;
    Ok((StatusCode::CREATED, Json(cause)))
}

#[instrument(skip(state))]
pub async fn list_causes(
    State(state): State<AppState>,
    Query(p): Query<CauseListParams>,
) -> AppResult<Json<Vec<Stored<Cause>>>> {
    Ok(Json(services::list_causes(&state.db, &p.filter(), p.limit, p.offset).await?))
}

#[instrument(skip(state))]
pub async fn list_user_causes(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(p): Query<Page>,
) -> AppResult<Json<Vec<Stored<Cause>>>> {
    let filter = CauseFilter {
        creator_id: Some(user_id),
        ..Default::default()
    };
    Ok(Json(services::list_causes(&state.db, &filter, p.limit, p.offset).await?))
}

#[instrument(skip(state))]
pub async fn get_cause(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Stored<Cause>>> {
    Ok(Json(services::get_cause(&state.db, &id).await?))
}

#[instrument(skip(state, who, patch), fields(caller = %who.id))]
pub async fn update_cause(
    State(state): State<AppState>,
    AuthUser(who): AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<CausePatch>,
) -> AppResult<Json<Stored<Cause>>> {
    Ok(Json(services::update_cause(&state.db, &who.id, &id, patch).await?))
}

#[instrument(skip(state, who), fields(caller = %who.id))]
pub async fn delete_cause(
    State(state): State<AppState>,
    AuthUser(who): AuthUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    services::delete_cause(&state.db, state.storage.as_ref(), &who.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, who, body), fields(supporter = %who.id))]
pub async fn contribute(
    State(state): State<AppState>,
    AuthUser(who): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<ContributionRequest>,
) -> AppResult<Json<ContributionResponse>> {
    let (cause, applied) = ledger::record_contribution(&state.db, &id, &who.id, body.amount).await?;
    Ok(Json(ContributionResponse { cause, applied }))
}

#[instrument(skip(state, _who))]
pub async fn like(
    State(state): State<AppState>,
    AuthUser(_who): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Stored<Cause>>> {
    Ok(Json(services::like(&state.db, &id).await?))
}

#[instrument(skip(state, _who))]
pub async fn unlike(
    State(state): State<AppState>,
    AuthUser(_who): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Stored<Cause>>> {
    Ok(Json(services::unlike(&state.db, &id).await?))
}

#[instrument(skip(state, who, body), fields(caller = %who.id))]
pub async fn add_update(
    State(state): State<AppState>,
    AuthUser(who): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<TextRequest>,
) -> AppResult<(StatusCode, Json<Stored<Cause>>)> {
    let cause = services::add_update(&state.db, &who.id, &id, &body.content).await?;
    Ok((StatusCode::CREATED, Json(cause)))
}

#[instrument(skip(state, who, body), fields(caller = %who.id))]
pub async fn add_comment(
    State(state): State<AppState>,
    AuthUser(who): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<TextRequest>,
) -> AppResult<(StatusCode, Json<Stored<Comment>>)> {
    let comment = services::add_comment(&state.db, &who.id, &id, &body.content).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[instrument(skip(state))]
pub async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(p): Query<Page>,
) -> AppResult<Json<Vec<Stored<Comment>>>> {
    Ok(Json(services::list_comments(&state.db, &id, p.limit, p.offset).await?))
}

#[instrument(skip(state, who, headers, body), fields(caller = %who.id, bytes = body.len()))]
pub async fn upload_image(
    State(state): State<AppState>,
    AuthUser(who): AuthUser,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Stored<Cause>>> {
    let ct = content_type(&headers)?;
    let cause = services::set_image(&state.db, state.storage.as_ref(), &who.id, &id, body, &ct).await?;
    Ok(Json(cause))
}

/// 307 to a presigned url.
#[instrument(skip(state))]
pub async fn image_redirect(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Redirect> {
    let ttl = Duration::from_secs(state.config.media.presign_ttl_secs);
    let url = services::image_url(&state.db, state.storage.as_ref(), &id, ttl).await?;
    Ok(Redirect::temporary(&url))
}
