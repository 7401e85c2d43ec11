use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest, VerifyEmailRequest, VerifyEmailResponse},
    extractors::AuthUser,
    jwt::JwtKeys,
    services::{self, RegisterInput},
};
use crate::{error::AppResult, state::AppState, store::Stored, users::{repo_types::User, services as users}};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/verify-email", post(verify_email))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let keys = JwtKeys::from_ref(&state);
    let input = RegisterInput {
        email: payload.email,
        password: payload.password,
        confirm_password: payload.confirm_password,
        name: payload.name,
        bio: payload.bio,
        tags: payload.tags,
        is_entrepreneur: payload.is_entrepreneur,
    };
    let reg = services::register(&state.db, &keys, &state.identity, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token: reg.tokens.access_token,
            refresh_token: reg.tokens.refresh_token,
            verification_token: Some(reg.verification_token),
            user: reg.user,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let (tokens, user) =
        services::login(&state.db, &keys, &state.identity, &payload.email, &payload.password).await?;
    Ok(Json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        verification_token: None,
        user,
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let (tokens, user) =
        services::refresh(&state.db, &keys, &state.identity, &payload.refresh_token).await?;
    Ok(Json(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        verification_token: None,
        user,
    }))
}

#[instrument(skip(state, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> AppResult<Json<VerifyEmailResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let (user, bonus_awarded) =
        services::verify_email(&state.db, &keys, &state.identity, &payload.token).await?;
    Ok(Json(VerifyEmailResponse { user, bonus_awarded }))
}

#[instrument(skip(state, who), fields(user_id = %who.id))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(who): AuthUser,
) -> AppResult<Json<Stored<User>>> {
    Ok(Json(users::get_profile(&state.db, &who.id).await?))
}
