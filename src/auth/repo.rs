use super::repo_types::{Credential, CREDENTIALS};
use crate::{
    db::Db,
    store::{StoreError, Stored},
};

/// Find the credential registered under an email.
pub async fn find_by_email(db: &Db, email: &str) -> Result<Option<Stored<Credential>>, StoreError> {
    match db.find(CREDENTIALS, email).await {
        Ok(c) => Ok(Some(c)),
        Err(StoreError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Create a credential; fails with `AlreadyExists` when the email is taken.
pub async fn create(db: &Db, email: &str, credential: &Credential) -> Result<(), StoreError> {
    db.insert_with_id(CREDENTIALS, email, credential).await
}

pub async fn delete(db: &Db, email: &str) -> Result<(), StoreError> {
    db.remove(CREDENTIALS, email).await
}
