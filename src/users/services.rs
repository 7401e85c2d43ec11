use tracing::{debug, info, instrument, warn};

use super::{
    dto::ProfilePatch,
    repo,
    repo_types::{Counter, User},
};
use crate::{
    db::Db,
    error::{AppError, AppResult},
    store::{versioned::Change, Stored},
    timestamp, validate,
};

/// Points granted once, when the account's email is verified.
pub const VERIFICATION_BONUS_POINTS: i64 = 100;

const MAX_NAME_LEN: usize = 80;
const MAX_HANDLE_LEN: usize = 64;

pub struct NewProfile {
    pub email: String,
    pub name: String,
    pub bio: String,
    pub tags: Vec<String>,
    pub is_entrepreneur: bool,
}

#[instrument(name = "users.service.create_profile", skip(db, new), fields(user_id = %id))]
pub async fn create_profile(db: &Db, id: &str, new: NewProfile) -> AppResult<Stored<User>> {
    let now = timestamp::now();
    let user = User {
        email: new.email,
        name: validate::required_text("name", &new.name, MAX_NAME_LEN)?,
        bio: validate::optional_text("bio", &new.bio, validate::MAX_TEXT_LEN)?,
        email_verified: false,
        is_entrepreneur: new.is_entrepreneur,
        points: 0,
        tags: validate::tags(&new.tags)?,
        causes_created: 0,
        causes_supported: 0,
        products_created: 0,
        whats_app: None,
        instagram: None,
        created_at: now,
        updated_at: now,
    };
    repo::insert(db, id, &user).await?;
    info!("profile created");
    Ok(Stored {
        id: id.to_string(),
        version: 1,
        record: user,
    })
}

pub async fn get_profile(db: &Db, id: &str) -> AppResult<Stored<User>> {
    Ok(repo::find(db, id).await?)
}

pub async fn list_profiles(
    db: &Db,
    entrepreneurs_only: bool,
    limit: Option<i64>,
    offset: Option<i64>,
) -> AppResult<Vec<Stored<User>>> {
    let (limit, offset) = validate::page(limit, offset);
    Ok(repo::list(db, entrepreneurs_only, limit, offset).await?)
}

fn handle(field: &str, value: Option<String>) -> AppResult<Option<Option<String>>> {
    value
        .map(|v| -> AppResult<Option<String>> {
            let v = validate::optional_text(field, &v, MAX_HANDLE_LEN)?;
            Ok(if v.is_empty() { None } else { Some(v) })
        })
        .transpose()
}

#[instrument(name = "users.service.update_profile", skip(db, patch), fields(user_id = %id))]
pub async fn update_profile(db: &Db, id: &str, patch: ProfilePatch) -> AppResult<Stored<User>> {
    let name = patch
        .name
        .map(|n| validate::required_text("name", &n, MAX_NAME_LEN))
        .transpose()?;
    let bio = patch
        .bio
        .map(|b| validate::optional_text("bio", &b, validate::MAX_TEXT_LEN))
        .transpose()?;
    let tags = patch.tags.map(|t| validate::tags(&t)).transpose()?;
    let whats_app = handle("whatsApp", patch.whats_app)?;
    let instagram = handle("instagram", patch.instagram)?;

    let (user, ()) = repo::modify(db, id, |u| {
        if let Some(n) = &name {
            u.name = n.clone();
        }
        if let Some(b) = &bio {
            u.bio = b.clone();
        }
        if let Some(t) = &tags {
            u.tags = t.clone();
        }
        if let Some(w) = &whats_app {
            u.whats_app = w.clone();
        }
        if let Some(i) = &instagram {
            u.instagram = i.clone();
        }
        u.updated_at = timestamp::now();
        Change::Write(())
    })
    .await?;
    debug!("profile updated");
    Ok(user)
}

/// Flag the profile as verified and grant the welcome bonus. Returns whether
/// this call performed the transition; verifying twice is a no-op.
#[instrument(name = "users.service.mark_email_verified", skip(db), fields(user_id = %id))]
pub async fn mark_email_verified(db: &Db, id: &str) -> AppResult<(Stored<User>, bool)> {
    let (user, newly) = repo::modify(db, id, |u| {
        if u.email_verified {
            return Change::Keep(false);
        }
        u.email_verified = true;
        u.points += VERIFICATION_BONUS_POINTS;
        u.updated_at = timestamp::now();
        Change::Write(true)
    })
    .await?;
    if newly {
        info!(points = user.record.points, "email verified, bonus granted");
    }
    Ok((user, newly))
}

pub async fn bump_counter(db: &Db, id: &str, counter: Counter) -> AppResult<()> {
    repo::modify(db, id, |u| {
        *u.counter_mut(counter) += 1;
        u.updated_at = timestamp::now();
        Change::Write(())
    })
    .await?;
    Ok(())
}

/// Counter updates must not fail the operation that triggered them.
pub async fn bump_counter_best_effort(db: &Db, id: &str, counter: Counter) {
    if let Err(e) = bump_counter(db, id, counter).await {
        warn!(user_id = id, ?counter, error = %e, "failed to update user counter");
    }
}

pub fn require_entrepreneur(user: &User) -> AppResult<()> {
    if user.is_entrepreneur {
        Ok(())
    } else {
        Err(AppError::forbidden("only entrepreneurs can list products"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_profile(name: &str) -> NewProfile {
        NewProfile {
            email: format!("{}@example.com", name.to_lowercase()),
            name: name.into(),
            bio: "hello".into(),
            tags: vec!["Animals".into(), "animals".into()],
            is_entrepreneur: false,
        }
    }

    #[tokio::test]
    async fn verification_bonus_is_granted_once() {
        let db = Db::in_memory();
        create_profile(&db, "u1", new_profile("Ana")).await.unwrap();

        let (user, newly) = mark_email_verified(&db, "u1").await.unwrap();
        assert!(newly);
        assert!(user.record.email_verified);
        assert_eq!(user.record.points, VERIFICATION_BONUS_POINTS);

        let (user, newly) = mark_email_verified(&db, "u1").await.unwrap();
        assert!(!newly);
        assert_eq!(user.record.points, VERIFICATION_BONUS_POINTS);
    }

    #[tokio::test]
    async fn profile_patch_only_touches_given_fields() {
        let db = Db::in_memory();
        create_profile(&db, "u1", new_profile("Ana")).await.unwrap();

        let updated = update_profile(
            &db,
            "u1",
            ProfilePatch {
                bio: Some("new bio".into()),
                instagram: Some("@ana".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.record.name, "Ana");
        assert_eq!(updated.record.bio, "new bio");
        assert_eq!(updated.record.tags, vec!["animals"]);
        assert_eq!(updated.record.instagram.as_deref(), Some("@ana"));

        let cleared = update_profile(
            &db,
            "u1",
            ProfilePatch {
                instagram: Some("  ".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(cleared.record.instagram, None);
        assert_eq!(get_profile(&db, "u1").await.unwrap().record.instagram, None);
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let db = Db::in_memory();
        create_profile(&db, "u1", new_profile("Ana")).await.unwrap();
        let err = update_profile(
            &db,
            "u1",
            ProfilePatch {
                name: Some(" ".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn counters_increment_and_missing_users_are_not_found() {
        let db = Db::in_memory();
        create_profile(&db, "u1", new_profile("Ana")).await.unwrap();
        bump_counter(&db, "u1", Counter::CausesCreated).await.unwrap();
        bump_counter(&db, "u1", Counter::CausesCreated).await.unwrap();
        assert_eq!(get_profile(&db, "u1").await.unwrap().record.causes_created, 2);

        let err = bump_counter(&db, "ghost", Counter::ProductsCreated).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn listing_ranks_by_points() {
        let db = Db::in_memory();
        create_profile(&db, "u1", new_profile("Ana")).await.unwrap();
        create_profile(&db, "u2", new_profile("Ben")).await.unwrap();
        mark_email_verified(&db, "u2").await.unwrap();

        let all = list_profiles(&db, false, None, None).await.unwrap();
        assert_eq!(all[0].id, "u2");
        assert!(list_profiles(&db, true, None, None).await.unwrap().is_empty());
    }
}
