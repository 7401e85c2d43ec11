use std::time::Duration;

use bytes::Bytes;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{CausePatch, NewCause},
    repo::{self, CauseFilter},
    repo_types::{Cause, CauseStatus, CauseUpdate, Comment},
};
use crate::{
    db::Db,
    error::{AppError, AppResult},
    media::{services as media, ObjectStorage},
    store::{versioned::Change, Stored},
    timestamp,
    users::{repo_types::Counter, services as users},
    validate,
};

const MAX_COMMENT_LEN: usize = 1_000;

fn owned_by(cause: &Cause, caller: &str) -> AppResult<()> {
    if cause.creator_id == caller {
        Ok(())
    } else {
        Err(AppError::forbidden("only the cause owner can do this"))
    }
}

/// Reaching the goal always completes an active cause.
fn settle_status(cause: &mut Cause) {
    if cause.status == CauseStatus::Active && cause.current_amount >= cause.goal {
        cause.status = CauseStatus::Completed;
    }
}

#[instrument(name = "causes.service.create", skip(db, new), fields(creator_id = %creator_id))]
pub async fn create_cause(db: &Db, creator_id: &str, new: NewCause) -> AppResult<Stored<Cause>> {
    let title = validate::required_text("title", &new.title, validate::MAX_TITLE_LEN)?;
    let description = validate::optional_text("description", &new.description, validate::MAX_TEXT_LEN)?;
    let tags = validate::tags(&new.tags)?;
    let goal = validate::positive_amount("goal", new.goal)?;
    let creator = users::get_profile(db, creator_id).await?;

    let now = timestamp::now();
    let cause = Cause {
        title,
        description,
        creator_id: creator.id.clone(),
        creator_name: creator.record.name,
        image_key: None,
        tags,
        goal,
        current_amount: 0.0,
        supporters: Default::default(),
        status: CauseStatus::Active,
        likes: 0,
        updates: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    let id = repo::insert(db, &cause).await?;
    users::bump_counter_best_effort(db, creator_id, Counter::CausesCreated).await;
    info!(cause_id = %id, goal, "cause created");
    Ok(Stored {
        id,
        version: 1,
        record: cause,
    })
}

pub async fn get_cause(db: &Db, id: &str) -> AppResult<Stored<Cause>> {
    Ok(repo::find(db, id).await?)
}

pub async fn list_causes(
    db: &Db,
    filter: &CauseFilter,
    limit: Option<i64>,
    offset: Option<i64>,
) -> AppResult<Vec<Stored<Cause>>> {
    let (limit, offset) = validate::page(limit, offset);
    Ok(repo::list(db, filter, limit, offset).await?)
}

/// Owner edit. A completed cause cannot be reopened, and only a funded
/// cause can be marked completed.
#[instrument(name = "causes.service.update", skip(db, patch), fields(cause_id = %id))]
pub async fn update_cause(db: &Db, caller: &str, id: &str, patch: CausePatch) -> AppResult<Stored<Cause>> {
    let title = patch
        .title
        .map(|t| validate::required_text("title", &t, validate::MAX_TITLE_LEN))
        .transpose()?;
    let description = patch
        .description
        .map(|d| validate::optional_text("description", &d, validate::MAX_TEXT_LEN))
        .transpose()?;
    let tags = patch.tags.map(|t| validate::tags(&t)).transpose()?;
    let goal = patch.goal.map(|g| validate::positive_amount("goal", g)).transpose()?;

    let (cause, outcome) = repo::modify(db, id, |c| {
        if let Err(e) = owned_by(c, caller) {
            return Change::Keep(Err(e));
        }
        if c.status == CauseStatus::Completed && patch.status == Some(CauseStatus::Active) {
            return Change::Keep(Err(AppError::validation(
                "a completed cause cannot be reopened",
            )));
        }
        let goal_after = goal.unwrap_or(c.goal);
        if patch.status == Some(CauseStatus::Completed)
            && c.status != CauseStatus::Completed
            && c.current_amount < goal_after
        {
            return Change::Keep(Err(AppError::validation(
                "a cause completes only when its goal is reached",
            )));
        }
        if let Some(t) = &title {
            c.title = t.clone();
        }
        if let Some(d) = &description {
            c.description = d.clone();
        }
        if let Some(t) = &tags {
            c.tags = t.clone();
        }
        if let Some(g) = goal {
            c.goal = g;
        }
        if let Some(s) = patch.status {
            c.status = s;
        }
        settle_status(c);
        c.updated_at = timestamp::now();
        Change::Write(Ok(()))
    })
    .await?;
    outcome?;
    Ok(cause)
}

#[instrument(name = "causes.service.delete", skip(db, storage))]
pub async fn delete_cause(db: &Db, storage: &dyn ObjectStorage, caller: &str, id: &str) -> AppResult<()> {
    let cause = repo::find(db, id).await?;
    owned_by(&cause.record, caller)?;
    repo::delete(db, id).await?;
    if let Err(e) = repo::delete_comments(db, id).await {
        warn!(error = %e, cause_id = id, "failed to delete cause comments");
    }
    if let Some(key) = cause.record.image_key {
        media::discard_image(storage, &key).await;
    }
    info!(cause_id = id, "cause deleted");
    Ok(())
}

pub async fn like(db: &Db, id: &str) -> AppResult<Stored<Cause>> {
    let (cause, ()) = repo::modify(db, id, |c| {
        c.likes += 1;
        Change::Write(())
    })
    .await?;
    Ok(cause)
}

/// Never drops below zero.
pub async fn unlike(db: &Db, id: &str) -> AppResult<Stored<Cause>> {
    let (cause, ()) = repo::modify(db, id, |c| {
        if c.likes <= 0 {
            return Change::Keep(());
        }
        c.likes -= 1;
        Change::Write(())
    })
    .await?;
    Ok(cause)
}

#[instrument(name = "causes.service.add_update", skip(db, content))]
pub async fn add_update(db: &Db, caller: &str, id: &str, content: &str) -> AppResult<Stored<Cause>> {
    let content = validate::required_text("content", content, validate::MAX_TEXT_LEN)?;
    let update_id = Uuid::new_v4().to_string();
    let (cause, outcome) = repo::modify(db, id, |c| {
        if let Err(e) = owned_by(c, caller) {
            return Change::Keep(Err(e));
        }
        let now = timestamp::now();
        c.updates.push(CauseUpdate {
            id: update_id.clone(),
            content: content.clone(),
            created_at: now,
        });
        c.updated_at = now;
        Change::Write(Ok(()))
    })
    .await?;
    outcome?;
    Ok(cause)
}

#[instrument(name = "causes.service.add_comment", skip(db, content))]
pub async fn add_comment(db: &Db, author_id: &str, cause_id: &str, content: &str) -> AppResult<Stored<Comment>> {
    let content = validate::required_text("content", content, MAX_COMMENT_LEN)?;
    repo::find(db, cause_id).await?;
    let author = users::get_profile(db, author_id).await?;
    let comment = Comment {
        author_id: author.id,
        author_name: author.record.name,
        content,
        created_at: timestamp::now(),
    };
    let id = repo::insert_comment(db, cause_id, &comment).await?;
    Ok(Stored {
        id,
        version: 1,
        record: comment,
    })
}

pub async fn list_comments(
    db: &Db,
    cause_id: &str,
    limit: Option<i64>,
    offset: Option<i64>,
) -> AppResult<Vec<Stored<Comment>>> {
    repo::find(db, cause_id).await?;
    let (limit, offset) = validate::page(limit, offset);
    Ok(repo::list_comments(db, cause_id, limit, offset).await?)
}

#[instrument(name = "causes.service.set_image", skip(db, storage, body))]
pub async fn set_image(
    db: &Db,
    storage: &dyn ObjectStorage,
    caller: &str,
    id: &str,
    body: Bytes,
    content_type: &str,
) -> AppResult<Stored<Cause>> {
    let current = repo::find(db, id).await?;
    owned_by(&current.record, caller)?;
    let key = media::upload_image(storage, "causes", id, body, content_type).await?;
    let written = repo::modify(db, id, |c| {
        if let Err(e) = owned_by(c, caller) {
            return Change::Keep(Err(e));
        }
        let previous = c.image_key.replace(key.clone());
        c.updated_at = timestamp::now();
        Change::Write(Ok(previous))
    })
    .await
    .map_err(AppError::from)
    .and_then(|(cause, outcome)| outcome.map(|previous| (cause, previous)));

    let (cause, previous) = match written {
        Ok(done) => done,
        Err(e) => {
            media::discard_image(storage, &key).await;
            return Err(e);
        }
    };
    if let Some(old) = previous {
        media::discard_image(storage, &old).await;
    }
    Ok(cause)
}

pub async fn image_url(db: &Db, storage: &dyn ObjectStorage, id: &str, ttl: Duration) -> AppResult<String> {
    let cause = repo::find(db, id).await?;
    let key = cause
        .record
        .image_key
        .ok_or_else(|| AppError::NotFound(format!("cause {id} has no image")))?;
    media::image_url(storage, &key, ttl).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        causes::ledger::record_contribution,
        media::MemoryObjectStorage,
        store::{versioned::RetryPolicy, MemoryStore},
        users::services::{create_profile, NewProfile},
    };

    async fn user(db: &Db, id: &str) {
        create_profile(
            db,
            id,
            NewProfile {
                email: format!("{id}@example.com"),
                name: id.to_uppercase(),
                bio: String::new(),
                tags: vec![],
                is_entrepreneur: false,
            },
        )
        .await
        .unwrap();
    }

    fn new_cause(goal: f64) -> NewCause {
        NewCause {
            title: "School supplies".into(),
            description: "Notebooks for 200 kids".into(),
            tags: vec!["Education".into()],
            goal,
        }
    }

    #[tokio::test]
    async fn create_initialises_and_counts() {
        let db = Db::in_memory();
        user(&db, "owner").await;
        let c = create_cause(&db, "owner", new_cause(500.0)).await.unwrap();
        assert_eq!(c.record.status, CauseStatus::Active);
        assert_eq!(c.record.current_amount, 0.0);
        assert!(c.record.supporters.is_empty());
        assert_eq!(c.record.creator_name, "OWNER");
        assert_eq!(c.record.tags, vec!["education"]);
        assert_eq!(users::get_profile(&db, "owner").await.unwrap().record.causes_created, 1);

        let err = create_cause(&db, "owner", new_cause(0.0)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn only_owner_can_edit_and_completed_stays_completed() {
        let db = Db::in_memory();
        user(&db, "owner").await;
        let c = create_cause(&db, "owner", new_cause(100.0)).await.unwrap();

        let err = update_cause(
            &db,
            "intruder",
            &c.id,
            CausePatch {
                title: Some("Mine now".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        user(&db, "fan").await;
        record_contribution(&db, &c.id, "fan", 100.0).await.unwrap();
        let err = update_cause(
            &db,
            "owner",
            &c.id,
            CausePatch {
                status: Some(CauseStatus::Active),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // Raising the goal does not reopen it either.
        let c = update_cause(
            &db,
            "owner",
            &c.id,
            CausePatch {
                goal: Some(1_000.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(c.record.status, CauseStatus::Completed);
        assert_eq!(c.record.goal, 1_000.0);
    }

    #[tokio::test]
    async fn owner_cannot_complete_an_unfunded_cause() {
        let db = Db::in_memory();
        user(&db, "owner").await;
        let c = create_cause(&db, "owner", new_cause(1_000.0)).await.unwrap();
        let completed = || CausePatch {
            status: Some(CauseStatus::Completed),
            ..Default::default()
        };

        let err = update_cause(&db, "owner", &c.id, completed()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let stored = get_cause(&db, &c.id).await.unwrap();
        assert_eq!(stored.record.status, CauseStatus::Active);
        assert_eq!(stored.version, c.version);

        // Lowering the goal to the total in the same edit is enough.
        record_contribution(&db, &c.id, "owner", 600.0).await.unwrap();
        let c = update_cause(
            &db,
            "owner",
            &c.id,
            CausePatch {
                goal: Some(600.0),
                ..completed()
            },
        )
        .await
        .unwrap();
        assert_eq!(c.record.status, CauseStatus::Completed);
    }

    #[tokio::test]
    async fn lowering_the_goal_below_the_total_completes() {
        let db = Db::in_memory();
        user(&db, "owner").await;
        user(&db, "fan").await;
        let c = create_cause(&db, "owner", new_cause(100.0)).await.unwrap();
        record_contribution(&db, &c.id, "fan", 60.0).await.unwrap();
        let c = update_cause(
            &db,
            "owner",
            &c.id,
            CausePatch {
                goal: Some(50.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(c.record.status, CauseStatus::Completed);
    }

    #[tokio::test]
    async fn unlike_never_goes_negative() {
        let db = Db::in_memory();
        user(&db, "owner").await;
        let c = create_cause(&db, "owner", new_cause(100.0)).await.unwrap();
        assert_eq!(like(&db, &c.id).await.unwrap().record.likes, 1);
        assert_eq!(unlike(&db, &c.id).await.unwrap().record.likes, 0);
        assert_eq!(unlike(&db, &c.id).await.unwrap().record.likes, 0);
    }

    #[tokio::test]
    async fn progress_updates_and_comments() {
        let db = Db::in_memory();
        user(&db, "owner").await;
        user(&db, "fan").await;
        let c = create_cause(&db, "owner", new_cause(100.0)).await.unwrap();

        let err = add_update(&db, "fan", &c.id, "hi").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let with_update = add_update(&db, "owner", &c.id, "Bought 50 notebooks").await.unwrap();
        assert_eq!(with_update.record.updates.len(), 1);

        add_comment(&db, "fan", &c.id, "first!").await.unwrap();
        add_comment(&db, "owner", &c.id, "thanks").await.unwrap();
        let comments = list_comments(&db, &c.id, None, None).await.unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].record.author_name, "FAN");

        let err = add_comment(&db, "fan", "missing", "hello").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn listing_filters_by_status_tag_and_creator() {
        let db = Db::in_memory();
        user(&db, "a").await;
        user(&db, "b").await;
        let done = create_cause(&db, "a", new_cause(10.0)).await.unwrap();
        create_cause(&db, "b", new_cause(10.0)).await.unwrap();
        record_contribution(&db, &done.id, "b", 10.0).await.unwrap();

        let completed = CauseFilter {
            status: Some(CauseStatus::Completed),
            ..Default::default()
        };
        let found = list_causes(&db, &completed, None, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, done.id);

        let by_b = CauseFilter {
            creator_id: Some("b".into()),
            tag: Some("education".into()),
            ..Default::default()
        };
        assert_eq!(list_causes(&db, &by_b, None, None).await.unwrap().len(), 1);

        let supported_by_b = CauseFilter {
            supporter_id: Some("b".into()),
            ..Default::default()
        };
        assert_eq!(list_causes(&db, &supported_by_b, None, None).await.unwrap()[0].id, done.id);
    }

    #[tokio::test]
    async fn image_upload_and_delete() {
        let db = Db::in_memory();
        let storage = MemoryObjectStorage::new();
        user(&db, "owner").await;
        let c = create_cause(&db, "owner", new_cause(10.0)).await.unwrap();

        let err = image_url(&db, &storage, &c.id, Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = set_image(&db, &storage, "other", &c.id, Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let c = set_image(&db, &storage, "owner", &c.id, Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();
        let key = c.record.image_key.clone().unwrap();
        assert!(image_url(&db, &storage, &c.id, Duration::from_secs(60)).await.unwrap().contains(&key));

        let replaced = set_image(&db, &storage, "owner", &c.id, Bytes::from_static(b"y"), "image/jpeg")
            .await
            .unwrap();
        let new_key = replaced.record.image_key.clone().unwrap();
        assert!(storage.object(&key).await.is_none());
        assert_eq!(storage.keys_under(&format!("causes/{}/", c.id)).await, vec![new_key.clone()]);

        add_comment(&db, "owner", &c.id, "thanks all").await.unwrap();
        delete_cause(&db, &storage, "owner", &c.id).await.unwrap();
        assert!(storage.object(&new_key).await.is_none());
        assert!(matches!(get_cause(&db, &c.id).await.unwrap_err(), AppError::NotFound(_)));
        assert!(repo::list_comments(&db, &c.id, 100, 0).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_uploads_leave_only_the_recorded_image() {
        let policy = RetryPolicy {
            read_attempts: 3,
            read_base_delay: Duration::from_millis(1),
            write_attempts: 1_000,
        };
        let db = Db::new(std::sync::Arc::new(MemoryStore::new()), policy);
        let storage = std::sync::Arc::new(MemoryObjectStorage::new());
        user(&db, "owner").await;
        let c = create_cause(&db, "owner", new_cause(10.0)).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                let storage = storage.clone();
                let id = c.id.clone();
                tokio::spawn(async move {
                    set_image(&db, storage.as_ref(), "owner", &id, Bytes::from_static(b"img"), "image/png")
                        .await
                        .unwrap();
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }

        let recorded = get_cause(&db, &c.id).await.unwrap().record.image_key.unwrap();
        assert_eq!(storage.keys_under(&format!("causes/{}/", c.id)).await, vec![recorded]);
    }
}
