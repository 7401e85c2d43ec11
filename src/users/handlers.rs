use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{ProfileListParams, ProfilePatch, PublicProfile},
    repo_types::User,
    services,
};
use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    state::AppState,
    store::Stored,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user).put(update_user))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    Query(p): Query<ProfileListParams>,
) -> AppResult<Json<Vec<PublicProfile>>> {
    let users = services::list_profiles(&state.db, p.entrepreneur, p.limit, p.offset).await?;
    Ok(Json(users.into_iter().map(PublicProfile::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PublicProfile>> {
    Ok(Json(services::get_profile(&state.db, &id).await?.into()))
}

/// Only the owner may edit a profile; the response includes private fields.
#[instrument(skip(state, who, patch), fields(caller = %who.id))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(who): AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<ProfilePatch>,
) -> AppResult<Json<Stored<User>>> {
    if who.id != id {
        return Err(AppError::forbidden("cannot edit another user's profile"));
    }
    Ok(Json(services::update_profile(&state.db, &id, patch).await?))
}
