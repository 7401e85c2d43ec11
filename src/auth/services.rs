use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    events::{ChangeReason, IdentityEvents},
    extractors::Identity,
    jwt::{JwtKeys, TokenKind},
    password::{check_new_password, hash_password, verify_password},
    repo,
    repo_types::Credential,
};
use crate::{
    db::Db,
    error::{AppError, AppResult},
    store::{StoreError, Stored},
    users::{
        repo_types::User,
        services::{self as users, NewProfile},
    },
    validate,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub name: String,
    pub bio: String,
    pub tags: Vec<String>,
    pub is_entrepreneur: bool,
}

#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug)]
pub struct Registered {
    pub tokens: TokenPair,
    pub verification_token: String,
    pub user: Stored<User>,
}

fn identity_of(user: &Stored<User>) -> Identity {
    Identity {
        id: user.id.clone(),
        email_verified: user.record.email_verified,
    }
}

fn issue_pair(keys: &JwtKeys, user_id: &str) -> AppResult<TokenPair> {
    Ok(TokenPair {
        access_token: keys.sign_access(user_id).map_err(AppError::remote)?,
        refresh_token: keys.sign_refresh(user_id).map_err(AppError::remote)?,
    })
}

#[instrument(name = "auth.service.register", skip(db, keys, events, input), fields(email = %input.email))]
pub async fn register(
    db: &Db,
    keys: &JwtKeys,
    events: &IdentityEvents,
    input: RegisterInput,
) -> AppResult<Registered> {
    let email = normalize_email(&input.email);
    if !is_valid_email(&email) {
        warn!("invalid email");
        return Err(AppError::validation("invalid email"));
    }
    check_new_password(&input.password, &input.confirm_password)?;
    validate::required_text("name", &input.name, validate::MAX_TITLE_LEN)?;

    let user_id = Uuid::new_v4().to_string();
    let password_hash = hash_password(&input.password).map_err(AppError::remote)?;
    let credential = Credential {
        user_id: user_id.clone(),
        password_hash,
    };
    match repo::create(db, &email, &credential).await {
        Ok(()) => {}
        Err(StoreError::AlreadyExists { .. }) => {
            warn!("email already registered");
            return Err(AppError::Conflict("email already registered".into()));
        }
        Err(e) => return Err(e.into()),
    }

    let profile = NewProfile {
        email: email.clone(),
        name: input.name,
        bio: input.bio,
        tags: input.tags,
        is_entrepreneur: input.is_entrepreneur,
    };
    let user = match users::create_profile(db, &user_id, profile).await {
        Ok(u) => u,
        Err(e) => {
            // Release the email so the user can try again.
            if let Err(rollback) = repo::delete(db, &email).await {
                warn!(error = %rollback, "failed to roll back credential");
            }
            return Err(e);
        }
    };

    let tokens = issue_pair(keys, &user_id)?;
    let verification_token = keys.sign_verification(&user_id).map_err(AppError::remote)?;
    debug!(%user_id, token = %verification_token, "email verification token issued");

    events.publish(identity_of(&user), ChangeReason::Registered);
    info!(%user_id, "user registered");
    Ok(Registered {
        tokens,
        verification_token,
        user,
    })
}

#[instrument(name = "auth.service.login", skip(db, keys, events, password))]
pub async fn login(
    db: &Db,
    keys: &JwtKeys,
    events: &IdentityEvents,
    email: &str,
    password: &str,
) -> AppResult<(TokenPair, Stored<User>)> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(AppError::validation("invalid email"));
    }

    let Some(credential) = repo::find_by_email(db, &email).await? else {
        warn!(%email, "login unknown email");
        return Err(AppError::unauthorized("invalid credentials"));
    };
    let ok = verify_password(password, &credential.record.password_hash).map_err(AppError::remote)?;
    if !ok {
        warn!(%email, user_id = %credential.record.user_id, "login invalid password");
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let user = users::get_profile(db, &credential.record.user_id).await?;
    let tokens = issue_pair(keys, &user.id)?;
    events.publish(identity_of(&user), ChangeReason::SignedIn);
    info!(user_id = %user.id, "user logged in");
    Ok((tokens, user))
}

#[instrument(name = "auth.service.refresh", skip_all)]
pub async fn refresh(
    db: &Db,
    keys: &JwtKeys,
    events: &IdentityEvents,
    refresh_token: &str,
) -> AppResult<(TokenPair, Stored<User>)> {
    let claims = keys
        .verify_kind(refresh_token, TokenKind::Refresh)
        .map_err(|_| AppError::unauthorized("invalid or expired refresh token"))?;
    let user = match users::get_profile(db, &claims.sub).await {
        Ok(u) => u,
        Err(AppError::NotFound(_)) => return Err(AppError::unauthorized("user not found")),
        Err(e) => return Err(e),
    };
    let tokens = issue_pair(keys, &user.id)?;
    events.publish(identity_of(&user), ChangeReason::Refreshed);
    Ok((tokens, user))
}

/// Consume an email-verification token. The welcome bonus is granted only
/// on the first successful verification.
#[instrument(name = "auth.service.verify_email", skip_all)]
pub async fn verify_email(
    db: &Db,
    keys: &JwtKeys,
    events: &IdentityEvents,
    token: &str,
) -> AppResult<(Stored<User>, bool)> {
    let claims = keys
        .verify_kind(token, TokenKind::EmailVerification)
        .map_err(|_| AppError::unauthorized("invalid or expired verification token"))?;
    let (user, newly) = users::mark_email_verified(db, &claims.sub).await?;
    if newly {
        events.publish(identity_of(&user), ChangeReason::EmailVerified);
    }
    Ok((user, newly))
}
