use super::repo_types::{User, USERS};
use crate::{
    db::Db,
    store::{versioned::Change, Direction, Query, StoreError, Stored},
};

pub async fn find(db: &Db, id: &str) -> Result<Stored<User>, StoreError> {
    db.find(USERS, id).await
}

pub async fn insert(db: &Db, id: &str, user: &User) -> Result<(), StoreError> {
    db.insert_with_id(USERS, id, user).await
}

pub async fn list(
    db: &Db,
    entrepreneurs_only: bool,
    limit: i64,
    offset: i64,
) -> Result<Vec<Stored<User>>, StoreError> {
    let mut q = Query::new();
    if entrepreneurs_only {
        q = q.eq("isEntrepreneur", true);
    }
    let q = q.order_by("points", Direction::Desc).limit(limit).offset(offset);
    db.list(USERS, &q).await
}

pub async fn modify<R, F>(db: &Db, id: &str, mutate: F) -> Result<(Stored<User>, R), StoreError>
where
    R: Send,
    F: FnMut(&mut User) -> Change<R> + Send,
{
    db.modify(USERS, id, mutate).await
}
