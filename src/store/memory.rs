//! In-process document store used for local development and tests.

use std::{cmp::Ordering, collections::HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{compare, ensure_object, Direction, Document, DocumentStore, Precondition, Query, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    version: i64,
    data: Value,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|e| Document {
                id: id.to_string(),
                version: e.version,
                data: e.data.clone(),
            })
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn create_document(&self, collection: &str, fields: Value) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.create_document_with_id(collection, &id, fields).await?;
        Ok(id)
    }

    async fn create_document_with_id(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), StoreError> {
        ensure_object(&fields)?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(StoreError::already_exists(collection, id));
        }
        docs.insert(
            id.to_string(),
            Entry {
                version: 1,
                data: fields,
            },
        );
        Ok(())
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
        precondition: Precondition,
    ) -> Result<i64, StoreError> {
        let Value::Object(patch) = fields else {
            return Err(StoreError::Invalid("update must be a JSON object".into()));
        };
        let mut collections = self.collections.write().await;
        let entry = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        if let Precondition::Version(expected) = precondition {
            if entry.version != expected {
                return Err(StoreError::version_conflict(collection, id, expected, entry.version));
            }
        }

        if let Value::Object(body) = &mut entry.data {
            body.extend(patch);
        }
        entry.version += 1;
        Ok(entry.version)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn query_documents(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<Document> = docs
            .iter()
            .filter(|(_, e)| query.matches(&e.data))
            .map(|(id, e)| Document {
                id: id.clone(),
                version: e.version,
                data: e.data.clone(),
            })
            .collect();

        // Stable baseline so unordered queries are deterministic.
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(order) = &query.order {
            hits.sort_by(|a, b| {
                let ord = match (a.data.get(&order.field), b.data.get(&order.field)) {
                    (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }

        let offset = usize::try_from(query.offset).unwrap_or(0);
        let limit = query
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);
        Ok(hits.into_iter().skip(offset).take(limit).collect())
    }
}
