//! Document store contract.
//!
//! Records are JSON objects grouped in named collections and addressed by
//! opaque string ids. Every document carries a store-managed version that
//! starts at 1 and grows by one on each successful update, which is what
//! callers use for compare-and-swap writes.

mod error;
pub mod memory;
pub mod postgres;
mod query;
pub mod versioned;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;
pub use query::{compare, Direction, FilterOp, Query};

/// A raw document as held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub version: i64,
    pub data: Value,
}

/// Write guard for [`DocumentStore::update_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Last writer wins.
    None,
    /// Apply only if the stored version still equals this one.
    Version(i64),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Document, StoreError>;

    /// Insert under a fresh store-assigned id and return it.
    async fn create_document(&self, collection: &str, fields: Value) -> Result<String, StoreError>;

    /// Insert under a caller-chosen id; fails with `AlreadyExists` on a clash.
    async fn create_document_with_id(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), StoreError>;

    /// Shallow-merge `fields` into the document and return the new version.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
        precondition: Precondition,
    ) -> Result<i64, StoreError>;

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    async fn query_documents(&self, collection: &str, query: &Query)
        -> Result<Vec<Document>, StoreError>;
}

/// A decoded record together with its identity in the store.
#[derive(Debug, Clone, Serialize)]
pub struct Stored<T> {
    pub id: String,
    #[serde(skip)]
    pub version: i64,
    #[serde(flatten)]
    pub record: T,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self, collection: &str) -> Result<Stored<T>, StoreError> {
        let record = T::deserialize(&self.data).map_err(|source| StoreError::Decode {
            collection: collection.to_string(),
            id: self.id.clone(),
            source,
        })?;
        Ok(Stored {
            id: self.id.clone(),
            version: self.version,
            record,
        })
    }
}

/// Serialize a record into the object form the store expects.
pub fn to_fields<T: Serialize>(record: &T) -> Result<Value, StoreError> {
    let value = serde_json::to_value(record)
        .map_err(|e| StoreError::Invalid(format!("serialize: {e}")))?;
    if !value.is_object() {
        return Err(StoreError::Invalid("document body must be a JSON object".into()));
    }
    Ok(value)
}

fn ensure_object(fields: &Value) -> Result<(), StoreError> {
    if fields.is_object() {
        Ok(())
    } else {
        Err(StoreError::Invalid("document body must be a JSON object".into()))
    }
}

/// Collection path for a sub-collection nested under a parent document.
pub fn sub_collection(parent: &str, parent_id: &str, child: &str) -> String {
    format!("{parent}/{parent_id}/{child}")
}
