use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::Serialize;
use tracing::warn;

use super::jwt::{JwtKeys, TokenKind};
use crate::{
    error::AppError,
    state::AppState,
    store::StoreError,
    users::repo as users_repo,
};

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email_verified: bool,
}

/// Per-request view of the caller. Anonymous when no bearer token is sent.
#[derive(Debug, Clone, Default)]
pub struct Session {
    identity: Option<Identity>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn current_identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn require(&self) -> Result<&Identity, AppError> {
        self.current_identity()
            .ok_or_else(|| AppError::unauthorized("authentication required"))
    }
}

fn bearer(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(raw) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let auth = raw
        .to_str()
        .map_err(|_| AppError::unauthorized("invalid Authorization header"))?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(Some)
        .ok_or_else(|| AppError::unauthorized("invalid auth scheme"))
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer(parts)? else {
            return Ok(Session::anonymous());
        };

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify_kind(token, TokenKind::Access).map_err(|e| {
            warn!(error = %e, "rejected bearer token");
            AppError::unauthorized("invalid or expired token")
        })?;

        // Verification status comes from the profile, not the token.
        let user = match users_repo::find(&state.db, &claims.sub).await {
            Ok(u) => u,
            Err(StoreError::NotFound { .. }) => {
                warn!(user_id = %claims.sub, "token for unknown user");
                return Err(AppError::unauthorized("user not found"));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Session::signed_in(Identity {
            id: user.id,
            email_verified: user.record.email_verified,
        }))
    }
}

/// Requires a signed-in caller.
pub struct AuthUser(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        Ok(AuthUser(session.require()?.clone()))
    }
}
