use super::repo_types::{Cause, CauseStatus, Comment, CAUSES, COMMENTS};
use crate::{
    db::Db,
    store::{sub_collection, versioned::Change, Direction, Query, StoreError, Stored},
};

#[derive(Debug, Default, Clone)]
pub struct CauseFilter {
    pub status: Option<CauseStatus>,
    pub tag: Option<String>,
    pub creator_id: Option<String>,
    pub supporter_id: Option<String>,
}

pub async fn find(db: &Db, id: &str) -> Result<Stored<Cause>, StoreError> {
    db.find(CAUSES, id).await
}

pub async fn insert(db: &Db, cause: &Cause) -> Result<String, StoreError> {
    db.insert(CAUSES, cause).await
}

/// Newest first.
pub async fn list(
    db: &Db,
    filter: &CauseFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<Stored<Cause>>, StoreError> {
    let mut q = Query::new();
    if let Some(s) = filter.status {
        q = q.eq("status", s.as_str());
    }
    if let Some(t) = &filter.tag {
        q = q.array_contains("tags", t.as_str());
    }
    if let Some(c) = &filter.creator_id {
        q = q.eq("creatorId", c.as_str());
    }
    if let Some(s) = &filter.supporter_id {
        q = q.array_contains("supporters", s.as_str());
    }
    let q = q
        .order_by("createdAt", Direction::Desc)
        .limit(limit)
        .offset(offset);
    db.list(CAUSES, &q).await
}

pub async fn modify<R, F>(db: &Db, id: &str, mutate: F) -> Result<(Stored<Cause>, R), StoreError>
where
    R: Send,
    F: FnMut(&mut Cause) -> Change<R> + Send,
{
    db.modify(CAUSES, id, mutate).await
}

pub async fn delete(db: &Db, id: &str) -> Result<(), StoreError> {
    db.remove(CAUSES, id).await
}

pub async fn insert_comment(db: &Db, cause_id: &str, comment: &Comment) -> Result<String, StoreError> {
    db.insert(&sub_collection(CAUSES, cause_id, COMMENTS), comment).await
}

/// Oldest first, like a conversation.
pub async fn list_comments(
    db: &Db,
    cause_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<Stored<Comment>>, StoreError> {
    let q = Query::new()
        .order_by("createdAt", Direction::Asc)
        .limit(limit)
        .offset(offset);
    db.list(&sub_collection(CAUSES, cause_id, COMMENTS), &q).await
}

/// Removes every comment under a cause. Stops at the first failure.
pub async fn delete_comments(db: &Db, cause_id: &str) -> Result<usize, StoreError> {
    let collection = sub_collection(CAUSES, cause_id, COMMENTS);
    let comments: Vec<Stored<Comment>> = db.list(&collection, &Query::new()).await?;
    for c in &comments {
        db.remove(&collection, &c.id).await?;
    }
    Ok(comments.len())
}
