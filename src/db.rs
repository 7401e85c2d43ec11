//! Shared handle over the configured document store.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::store::{
    self, to_fields,
    versioned::{self, Change, RetryPolicy},
    DocumentStore, Precondition, Query, StoreError, Stored,
};

#[derive(Clone)]
pub struct Db {
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
}

impl Db {
    pub fn new(store: Arc<dyn DocumentStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(store::MemoryStore::new()), RetryPolicy::default())
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub async fn find<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Stored<T>, StoreError> {
        versioned::get(self.store(), &self.policy, collection, id)
            .await?
            .decode(collection)
    }

    pub async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Stored<T>>, StoreError> {
        versioned::query(self.store(), &self.policy, collection, query)
            .await?
            .iter()
            .map(|d| d.decode(collection))
            .collect()
    }

    pub async fn insert<T: Serialize>(&self, collection: &str, record: &T) -> Result<String, StoreError> {
        self.store.create_document(collection, to_fields(record)?).await
    }

    pub async fn insert_with_id<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        record: &T,
    ) -> Result<(), StoreError> {
        self.store
            .create_document_with_id(collection, id, to_fields(record)?)
            .await
    }

    /// Unconditional partial update.
    pub async fn patch(&self, collection: &str, id: &str, fields: Value) -> Result<i64, StoreError> {
        self.store
            .update_document(collection, id, fields, Precondition::None)
            .await
    }

    pub async fn modify<T, R, F>(
        &self,
        collection: &str,
        id: &str,
        mutate: F,
    ) -> Result<(Stored<T>, R), StoreError>
    where
        T: Serialize + DeserializeOwned + Send,
        R: Send,
        F: FnMut(&mut T) -> Change<R> + Send,
    {
        versioned::update_versioned(self.store(), &self.policy, collection, id, mutate).await
    }

    pub async fn remove(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.store.delete_document(collection, id).await
    }
}
